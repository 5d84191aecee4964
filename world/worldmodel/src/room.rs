//! World graph: rooms, directions and the per-room/global verb maps.

use crate::multimap::ObjectMultimap;
use std::collections::HashMap;
use std::sync::Arc;

pub type RoomId = u32;

/// Sentinel meaning "no adjacency in that direction".
pub const ROOM_NONE: RoomId = RoomId::max_value();

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Direction {
    North,
    South,
    East,
    West,
    Up,
    Down,
}

impl Direction {
    pub const COUNT: usize = 6;

    pub const ALL: [Direction; Direction::COUNT] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::Up,
        Direction::Down,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn parse(word: &str) -> Option<Direction> {
        match word {
            "north" | "n" => Some(Direction::North),
            "south" | "s" => Some(Direction::South),
            "east" | "e" => Some(Direction::East),
            "west" | "w" => Some(Direction::West),
            "up" | "u" => Some(Direction::Up),
            "down" | "d" => Some(Direction::Down),
            _ => None,
        }
    }
}

/// Context handed to a verb or room hook when it runs. Owned by `gamecore`
/// (the master's dispatcher), implemented here only as a trait object so
/// `worldmodel` never depends back on the crate that drives it.
pub trait VerbContext {
    fn username(&self) -> &str;
    fn send_line(&mut self, text: &str);
    fn enter_raw_mode(&mut self);
}

pub trait VerbHandler: Send + Sync {
    fn invoke(&self, ctx: &mut dyn VerbContext, rest: &str);
}

/// Vetoable hooks a world module attaches to a room. A missing hook counts
/// as an implicit `true`.
pub trait RoomHooks: Send + Sync {
    fn on_enter(&self, _room: RoomId, _user: &str) -> bool {
        true
    }

    fn on_leave(&self, _room: RoomId, _user: &str) -> bool {
        true
    }
}

pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub description: String,
    adjacency: [RoomId; Direction::COUNT],
    pub objects: ObjectMultimap,
    pub verbs: HashMap<String, Arc<dyn VerbHandler>>,
    pub hooks: Option<Arc<dyn RoomHooks>>,
}

impl Room {
    pub fn new(id: RoomId, name: impl Into<String>, description: impl Into<String>) -> Room {
        Room {
            id,
            name: name.into(),
            description: description.into(),
            adjacency: [ROOM_NONE; Direction::COUNT],
            objects: ObjectMultimap::new(),
            verbs: HashMap::new(),
            hooks: None,
        }
    }

    /// Adjacency is indexed exhaustively by `Direction`, so there is no
    /// out-of-range lookup to guard against (spec §9 open question on
    /// direction bounds checking, resolved by construction).
    pub fn adjacent(&self, direction: Direction) -> RoomId {
        self.adjacency[direction.index()]
    }

    pub fn set_adjacent(&mut self, direction: Direction, room: RoomId) {
        self.adjacency[direction.index()] = room;
    }

    pub fn on_enter(&self, user: &str) -> bool {
        self.hooks.as_ref().map_or(true, |hooks| hooks.on_enter(self.id, user))
    }

    pub fn on_leave(&self, user: &str) -> bool {
        self.hooks.as_ref().map_or(true, |hooks| hooks.on_leave(self.id, user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_adjacency_is_room_none() {
        let room = Room::new(0, "Start", "An empty room.");
        assert_eq!(room.adjacent(Direction::North), ROOM_NONE);
    }

    #[test]
    fn set_adjacency_round_trips() {
        let mut room = Room::new(0, "Start", "An empty room.");
        room.set_adjacent(Direction::North, 1);
        assert_eq!(room.adjacent(Direction::North), 1);
        assert_eq!(room.adjacent(Direction::South), ROOM_NONE);
    }

    #[test]
    fn missing_hooks_default_permissive() {
        let room = Room::new(0, "Start", "An empty room.");
        assert!(room.on_enter("alice"));
        assert!(room.on_leave("alice"));
    }

    #[test]
    fn direction_parses_short_and_long_forms() {
        assert_eq!(Direction::parse("north"), Some(Direction::North));
        assert_eq!(Direction::parse("n"), Some(Direction::North));
        assert_eq!(Direction::parse("up"), Some(Direction::Up));
        assert_eq!(Direction::parse("sideways"), None);
    }
}
