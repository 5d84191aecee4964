//! A small reference world module: three rooms, one object class, one
//! custom verb. Stands in for whatever pluggable world module gets loaded
//! at runtime (an external collaborator, §1) -- grounded loosely on
//! `original_source`'s bundled `dunnet`-style default world, reduced to
//! what exercises every hook in the §4.9 symbol contract.

use std::io;
use std::sync::Arc;
use worldmodel::object::ObjectClass;
use worldmodel::room::{Direction, Room, VerbContext, VerbHandler};
use worldmodel::WorldModule;

pub struct LampClass;

impl ObjectClass for LampClass {
    fn class_name(&self) -> &str {
        "lamp"
    }

    fn describe(&self, instance: &worldmodel::ObjectInstance, _user: &str) -> String {
        format!("a {}, unlit", instance.name)
    }
}

/// A pillar nobody can pick up -- exercises the `take` veto hook.
pub struct PillarClass;

impl ObjectClass for PillarClass {
    fn class_name(&self) -> &str {
        "pillar"
    }

    fn take(&self, _instance: &worldmodel::ObjectInstance, _user: &str) -> bool {
        false
    }

    fn describe(&self, instance: &worldmodel::ObjectInstance, _user: &str) -> String {
        format!("a heavy stone {}", instance.name)
    }
}

struct SmileVerb;

impl VerbHandler for SmileVerb {
    fn invoke(&self, ctx: &mut dyn VerbContext, _rest: &str) {
        ctx.send_line(&format!("{} smiles.", ctx.username()));
    }
}

pub struct BasicWorld;

impl WorldModule for BasicWorld {
    fn world_name(&self) -> &str {
        "basicworld"
    }

    fn object_classes(&self) -> Vec<Arc<dyn ObjectClass>> {
        vec![Arc::new(LampClass), Arc::new(PillarClass)]
    }

    fn verb_classes(&self) -> Vec<(String, Arc<dyn VerbHandler>)> {
        vec![("smile".to_string(), Arc::new(SmileVerb))]
    }

    fn initial_rooms(&self) -> Vec<Room> {
        let mut start = Room::new(0, "Clearing", "A sunlit clearing in the woods.");
        let mut hall = Room::new(1, "Hall", "A drafty stone hall.");
        let cellar = Room::new(2, "Cellar", "A damp, dark cellar.");

        start.set_adjacent(Direction::North, hall.id);
        hall.set_adjacent(Direction::South, start.id);
        hall.set_adjacent(Direction::Down, cellar.id);

        let mut lamp = worldmodel::ObjectInstance::new("lamp", Arc::new(LampClass));
        lamp.default_article = true;
        start.objects.insert(lamp);

        let mut pillar = worldmodel::ObjectInstance::new("pillar", Arc::new(PillarClass));
        pillar.default_article = true;
        hall.objects.insert(pillar);

        vec![start, hall, cellar]
    }

    fn serialize_user_payload(&self, payload: &[u8], writer: &mut dyn io::Write) -> io::Result<()> {
        writer.write_all(payload)
    }

    fn deserialize_user_payload(&self, reader: &mut dyn io::Read) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        io::Read::read_to_end(reader, &mut buf)?;
        Ok(buf)
    }
}

/// Fixed symbol contract a dynamically loaded world module exports (spec
/// §4.9, loader in `worldmodel::module::dylib`).
#[no_mangle]
pub extern "C" fn mud_world_module() -> Box<dyn WorldModule> {
    Box::new(BasicWorld)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_rooms_have_expected_adjacency() {
        let world = BasicWorld;
        let rooms = world.initial_rooms();
        assert_eq!(rooms.len(), 3);
        assert_eq!(rooms[0].adjacent(Direction::North), 1);
        assert_eq!(rooms[1].adjacent(Direction::South), 0);
        assert_eq!(rooms[1].adjacent(Direction::Down), 2);
    }

    #[test]
    fn pillar_class_vetoes_take() {
        let world = BasicWorld;
        let classes = world.object_classes();
        let pillar = classes.iter().find(|c| c.class_name() == "pillar").unwrap();
        let instance = worldmodel::ObjectInstance::new("pillar", pillar.clone());
        assert!(!instance.can_take("alice"));
    }
}
