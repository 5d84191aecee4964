//! World and user persistence as length-prefixed binary streams of typed
//! primitives.
//!
//! `userdb::User::write_header`/`read_header` already round-trip everything
//! about an account except its inventory -- a bare `User` has no way to
//! resolve a class name back to an `Arc<dyn ObjectClass>` on its own, so
//! inventory (and a room's object contents) are serialized here instead,
//! once a `World` is available to resolve against.

use crate::server::{Server, World};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flux::logging::error;
use flux::persist::{atomic_write, PersistRead, PersistWrite};
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Write};
use std::path::Path;
use userdb::{User, UserDb};
use worldmodel::ObjectInstance;

/// Writes one flattened instance: its own identity (name, class, flags) plus
/// whatever bytes `ObjectClass::serialize` produces from its payload.
fn write_instance<W: Write>(writer: &mut W, instance: &ObjectInstance) -> io::Result<()> {
    writer.write_string(&instance.name)?;
    writer.write_string(instance.class.class_name())?;
    writer.write_bool_field(instance.default_article)?;
    writer.write_bool_field(instance.hidden)?;
    writer.write_bool_field(instance.list)?;

    let mut serialized = Vec::new();
    instance.class.serialize(&instance.payload, &mut serialized)?;
    writer.write_bytes(&serialized)
}

/// Reads one instance back, resolving its class name against `world`.
/// Returns `Ok(None)` for a class no longer supplied by the world module --
/// a registry that shrunk between runs is not itself an error, the
/// instance is simply dropped.
fn read_instance<R: Read>(reader: &mut R, world: &World) -> io::Result<Option<ObjectInstance>> {
    let name = reader.read_string()?;
    let class_name = reader.read_string()?;
    let default_article = reader.read_bool_field()?;
    let hidden = reader.read_bool_field()?;
    let list = reader.read_bool_field()?;
    let serialized = reader.read_bytes()?;

    let class = match world.object_classes.get(&class_name) {
        Some(class) => class.clone(),
        None => return Ok(None),
    };

    let mut cursor = Cursor::new(serialized);
    let payload = class.deserialize(&mut cursor)?;

    let mut instance = ObjectInstance::new(name, class);
    instance.default_article = default_article;
    instance.hidden = hidden;
    instance.list = list;
    instance.payload = payload;
    Ok(Some(instance))
}

fn write_instance_list<W: Write>(writer: &mut W, instances: &[&ObjectInstance]) -> io::Result<()> {
    writer.write_u32::<BigEndian>(instances.len() as u32)?;
    for instance in instances {
        write_instance(writer, instance)?;
    }
    Ok(())
}

fn read_instance_list<R: Read>(reader: &mut R, world: &World) -> io::Result<Vec<ObjectInstance>> {
    let count = reader.read_u32::<BigEndian>()?;
    let mut instances = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if let Some(instance) = read_instance(reader, world)? {
            instances.push(instance);
        }
    }
    Ok(instances)
}

/// Writes `WORLDFILE`: for every room, its live object contents (the room
/// graph itself comes from the world module's code, not this file).
pub fn save_world(path: &Path, world: &World) -> io::Result<()> {
    atomic_write(path, |file| {
        file.write_u32::<BigEndian>(world.rooms.len() as u32)?;
        for room in &world.rooms {
            file.write_u32::<BigEndian>(room.id)?;
            let instances: Vec<&ObjectInstance> = room.objects.keys().flat_map(|noun| room.objects.lookup(noun)).collect();
            write_instance_list(file, &instances)?;
        }
        Ok(())
    })
}

/// Loads `WORLDFILE` into the room graph `world` already has from its
/// module, replacing whatever starting objects the module seeded each room
/// with. Missing file means a first run -- the module's initial state
/// stands untouched.
pub fn load_world(path: &Path, world: &mut World) -> io::Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let room_count = reader.read_u32::<BigEndian>()?;

    for _ in 0..room_count {
        let room_id = reader.read_u32::<BigEndian>()?;
        let instances = read_instance_list(&mut reader, world)?;

        if let Some(room) = world.room_mut(room_id) {
            room.objects = worldmodel::ObjectMultimap::new();
            for instance in instances {
                room.objects.insert(instance);
            }
        }
    }

    Ok(())
}

/// Writes `USERFILE`: one account header (the credential/privilege
/// record) followed by its flattened inventory, per user.
pub fn save_users(path: &Path, userdb: &UserDb) -> io::Result<()> {
    atomic_write(path, |file| {
        file.write_u32::<BigEndian>(userdb.size() as u32)?;
        for user in userdb.iter() {
            user.write_header(file)?;
            let instances: Vec<&ObjectInstance> = user.inventory.keys().flat_map(|noun| user.inventory.lookup(noun)).collect();
            write_instance_list(file, &instances)?;
        }
        Ok(())
    })
}

/// Loads `USERFILE` into a fresh `UserDb`, resolving each account's
/// inventory against `world`. Missing file means a first run -- an empty
/// database, same as `UserDb::load`.
pub fn load_users(path: &Path, world: &World) -> io::Result<UserDb> {
    let mut db = UserDb::new(path);

    if !path.exists() {
        return Ok(db);
    }

    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let count = reader.read_u32::<BigEndian>()?;

    for _ in 0..count {
        let mut user = User::read_header(&mut reader)?;
        for instance in read_instance_list(&mut reader, world)? {
            user.inventory.insert(instance);
        }
        db.add(user);
    }

    Ok(db)
}

/// Bumps the mutation counter (`TAKE`/`DROP`/account edits each count as
/// one mutation) and saves both files once it reaches `save_interval`, or
/// immediately if `force` is set (account edits always force -- losing one
/// is a bigger deal than losing a dropped prop).
pub fn bump(server: &mut Server, force: bool) {
    server.mutation_count += 1;

    if force || server.mutation_count >= server.config.save_interval {
        save_all(server);
        server.mutation_count = 0;
    }
}

pub fn save_all(server: &Server) {
    if let Err(err) = save_world(&server.config.worldfile_path(), &server.world) {
        error!(server.log, "failed to save world file"; "error" => %err);
    }
    if let Err(err) = save_users(&server.config.userfile_path(), &server.userdb) {
        error!(server.log, "failed to save user file"; "error" => %err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ModuleSource;
    use std::path::PathBuf;
    use std::sync::Arc;
    use worldmodel::{ObjectClass, Room, VerbHandler, WorldModule};

    struct PlainClass;
    impl ObjectClass for PlainClass {
        fn class_name(&self) -> &str {
            "plain"
        }
    }

    struct TestModule;
    impl WorldModule for TestModule {
        fn world_name(&self) -> &str {
            "test"
        }
        fn object_classes(&self) -> Vec<Arc<dyn ObjectClass>> {
            vec![Arc::new(PlainClass)]
        }
        fn verb_classes(&self) -> Vec<(String, Arc<dyn VerbHandler>)> {
            Vec::new()
        }
        fn initial_rooms(&self) -> Vec<Room> {
            vec![Room::new(0, "Start", "An empty room.")]
        }
    }

    fn scratch_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gamecore-persist-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn world_roundtrips_room_objects() {
        let path = scratch_path("worldfile.dat");

        let mut world = World::new(ModuleSource::Static(Box::new(TestModule)));
        let class = world.object_classes.get("plain").unwrap().clone();
        world.room_mut(0).unwrap().objects.insert(ObjectInstance::new("lamp", class));
        save_world(&path, &world).unwrap();

        let mut reloaded = World::new(ModuleSource::Static(Box::new(TestModule)));
        load_world(&path, &mut reloaded).unwrap();
        assert_eq!(reloaded.room(0).unwrap().objects.count("lamp"), 1);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn users_roundtrip_inventory() {
        let path = scratch_path("userfile.dat");

        let world = World::new(ModuleSource::Static(Box::new(TestModule)));
        let class = world.object_classes.get("plain").unwrap().clone();

        let mut db = UserDb::new(&path);
        let mut user = User::new("alice", "hunter2", userdb::Privilege::User);
        user.inventory.insert(ObjectInstance::new("coin", class));
        db.add(user);
        save_users(&path, &db).unwrap();

        let reloaded = load_users(&path, &world).unwrap();
        assert_eq!(reloaded.lookup("alice").unwrap().inventory.count("coin"), 1);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn load_missing_world_file_leaves_module_defaults() {
        let path = scratch_path("missing-world.dat");
        std::fs::remove_file(&path).ok();

        let mut world = World::new(ModuleSource::Static(Box::new(TestModule)));
        load_world(&path, &mut world).unwrap();
        assert!(world.room(0).unwrap().objects.is_empty());
    }
}
