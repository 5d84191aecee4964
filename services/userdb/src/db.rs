use crate::user::{Privilege, User};
use flux::persist::{atomic_write, PersistRead, PersistWrite};
use hashbrown::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Username -> `User`, persisted as a flat sequence of length-prefixed
/// records behind an atomic rename. Holds every connected and disconnected
/// user's record for the lifetime of the process; `game/core` is the only
/// caller and already serializes access through the master loop, so this
/// type carries no internal locking.
pub struct UserDb {
    path: PathBuf,
    users: HashMap<String, User>,
}

impl UserDb {
    /// Starts from an empty database rooted at `path` without touching the
    /// filesystem. Use `load` to read an existing file.
    pub fn new(path: impl Into<PathBuf>) -> UserDb {
        UserDb { path: path.into(), users: HashMap::new() }
    }

    /// Loads a database from `path`, or starts an empty one if the file does
    /// not exist yet (first run).
    pub fn load(path: impl Into<PathBuf>) -> io::Result<UserDb> {
        let path = path.into();

        if !path.exists() {
            return Ok(UserDb::new(path));
        }

        let file = File::open(&path)?;
        let mut reader = BufReader::new(file);
        let count = reader.read_u32_count()?;

        let mut users = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let user = User::read_header(&mut reader)?;
            users.insert(user.username.clone(), user);
        }

        Ok(UserDb { path, users })
    }

    /// Writes every record to a fresh temp file and renames it over `path`
    /// so a reader never observes a partially written database.
    pub fn save(&self) -> io::Result<()> {
        atomic_write(&self.path, |file| {
            file.write_u32_count(self.users.len() as u32)?;
            for user in self.users.values() {
                user.write_header(file)?;
            }
            Ok(())
        })
    }

    pub fn lookup(&self, username: &str) -> Option<&User> {
        self.users.get(username)
    }

    pub fn lookup_mut(&mut self, username: &str) -> Option<&mut User> {
        self.users.get_mut(username)
    }

    /// Inserts or overwrites `user` under its own username. Overwriting an
    /// existing account (rather than rejecting the add) matches the boundary
    /// case the reference `userdb_add` leaves to the caller to guard against.
    pub fn add(&mut self, user: User) {
        self.users.insert(user.username.clone(), user);
    }

    pub fn remove(&mut self, username: &str) -> Option<User> {
        self.users.remove(username)
    }

    pub fn size(&self) -> usize {
        self.users.len()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    pub fn usernames(&self) -> impl Iterator<Item = &String> {
        self.users.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn create_user(&mut self, username: &str, password: &str, privilege: Privilege) -> bool {
        if self.users.contains_key(username) {
            return false;
        }
        self.add(User::new(username, password, privilege));
        true
    }
}

trait CountExt {
    fn read_u32_count(&mut self) -> io::Result<u32>;
}

impl<R: io::Read + ?Sized> CountExt for R {
    fn read_u32_count(&mut self) -> io::Result<u32> {
        use byteorder::{BigEndian, ReadBytesExt};
        ReadBytesExt::read_u32::<BigEndian>(self)
    }
}

trait WriteCountExt {
    fn write_u32_count(&mut self, value: u32) -> io::Result<()>;
}

impl<W: io::Write + ?Sized> WriteCountExt for W {
    fn write_u32_count(&mut self, value: u32) -> io::Result<()> {
        use byteorder::{BigEndian, WriteBytesExt};
        WriteBytesExt::write_u32::<BigEndian>(self, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("userdb-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn create_user_rejects_duplicate_username() {
        let mut db = UserDb::new(scratch_path("unused.dat"));
        assert!(db.create_user("alice", "hunter2", Privilege::User));
        assert!(!db.create_user("alice", "different", Privilege::User));
        assert_eq!(db.size(), 1);
    }

    #[test]
    fn remove_drops_the_record() {
        let mut db = UserDb::new(scratch_path("unused2.dat"));
        db.create_user("alice", "hunter2", Privilege::User);
        assert!(db.remove("alice").is_some());
        assert!(db.lookup("alice").is_none());
    }

    #[test]
    fn save_and_load_roundtrips_all_users() {
        let path = scratch_path("roundtrip.dat");

        let mut db = UserDb::new(&path);
        db.create_user("alice", "hunter2", Privilege::Admin);
        db.create_user("bob", "swordfish", Privilege::User);
        db.save().unwrap();

        let loaded = UserDb::load(&path).unwrap();
        assert_eq!(loaded.size(), 2);
        assert!(loaded.lookup("alice").unwrap().check_password("hunter2"));
        assert_eq!(loaded.lookup("alice").unwrap().privilege, Privilege::Admin);
        assert!(loaded.lookup("bob").unwrap().check_password("swordfish"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn load_missing_file_starts_empty() {
        let path = scratch_path("missing.dat");
        std::fs::remove_file(&path).ok();
        let db = UserDb::load(&path).unwrap();
        assert_eq!(db.size(), 0);
    }
}
