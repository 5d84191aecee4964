pub mod module;
pub mod multimap;
pub mod object;
pub mod room;

pub use module::{SimulationCallback, SimulationContext, WorldModule};
pub use multimap::ObjectMultimap;
pub use object::{ObjectClass, ObjectInstance};
pub use room::{Direction, Room, RoomId, RoomHooks, VerbContext, VerbHandler, ROOM_NONE};
