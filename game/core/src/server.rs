//! The master's single owning value: world, user database, and the session
//! table, none of it behind a lock since only the master thread ever
//! touches it.

use crate::config::ServerConfig;
use crate::session::ClientSession;
use flux::logging::Logger;
use hashbrown::HashMap;
use mudnet::ipc::{Channel, MasterPacket};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use userdb::UserDb;
use worldmodel::module::dylib::WorldModuleHandle;
use worldmodel::{ObjectClass, Room, SimulationCallback, SimulationContext, VerbHandler, WorldModule};

/// Identifies a worker both as the master's session-table key and as the
/// `sender_id` it stamps on every `WorkerPacket`.
pub type WorkerId = u64;

/// Owns whichever concrete module supplies the world -- a statically linked
/// one or a `cdylib` loaded at startup. Boxed behind this enum so `World`
/// doesn't need to know which.
pub enum ModuleSource {
    Static(Box<dyn WorldModule>),
    Dynamic(WorldModuleHandle),
}

impl ModuleSource {
    pub fn module(&self) -> &dyn WorldModule {
        match self {
            ModuleSource::Static(module) => module.as_ref(),
            ModuleSource::Dynamic(handle) => handle.module(),
        }
    }

    /// # Safety
    /// See `WorldModuleHandle::load`: the library at `path` must export a
    /// conforming `mud_world_module` symbol.
    pub unsafe fn load_dynamic(path: &std::path::Path) -> Result<ModuleSource, libloading::Error> {
        Ok(ModuleSource::Dynamic(WorldModuleHandle::load(path)?))
    }
}

/// The room graph plus the resolved class/verb registries the world module
/// supplies by name at startup.
pub struct World {
    source: ModuleSource,
    pub rooms: Vec<Room>,
    pub object_classes: HashMap<String, Arc<dyn ObjectClass>>,
    pub verbs: HashMap<String, Arc<dyn VerbHandler>>,
}

impl World {
    pub fn new(source: ModuleSource) -> World {
        let module = source.module();

        let object_classes = module
            .object_classes()
            .into_iter()
            .map(|class| (class.class_name().to_string(), class))
            .collect();

        let verbs = module.verb_classes().into_iter().collect();
        let rooms = module.initial_rooms();

        World { source, rooms, object_classes, verbs }
    }

    pub fn module(&self) -> &dyn WorldModule {
        self.source.module()
    }

    pub fn room(&self, id: worldmodel::RoomId) -> Option<&Room> {
        self.rooms.iter().find(|room| room.id == id)
    }

    pub fn room_mut(&mut self, id: worldmodel::RoomId) -> Option<&mut Room> {
        self.rooms.iter_mut().find(|room| room.id == id)
    }
}

impl SimulationContext for World {
    fn rooms_mut(&mut self) -> &mut [Room] {
        &mut self.rooms
    }
}

/// Tracks a world module's optional simulation tick so the event loop can
/// drive it without knowing whether one was supplied.
struct SimState {
    interval: Duration,
    last_tick: Instant,
    callback: Arc<dyn SimulationCallback>,
}

/// Everything the master owns. Handlers in `dispatch` take `&mut Server`
/// plus the request's sender/child ids.
pub struct Server {
    pub config: ServerConfig,
    pub world: World,
    pub userdb: UserDb,
    pub sessions: HashMap<WorkerId, ClientSession>,
    pub mutation_count: u64,
    pub log: Logger,
    next_worker_id: WorkerId,
    sim: Option<SimState>,
}

impl Server {
    pub fn new(config: ServerConfig, world: World, userdb: UserDb, log: Logger) -> Server {
        let sim = world.module().simulation().map(|(interval, callback)| SimState { interval, last_tick: Instant::now(), callback });
        Server { config, world, userdb, sessions: HashMap::new(), mutation_count: 0, log, next_worker_id: 0, sim }
    }

    /// How long the event loop may block before it must check the
    /// simulation tick again -- the module's own interval if it has one,
    /// otherwise a timeout long enough not to busy-loop but short enough to
    /// stay responsive to a module installed later (there is none today,
    /// but `sim` is re-read only at construction).
    pub fn poll_timeout(&self) -> Duration {
        self.sim.as_ref().map_or(Duration::from_millis(250), |sim| sim.interval)
    }

    /// Runs the world module's simulation callback once per elapsed
    /// interval. A no-op when the module didn't supply one.
    pub fn tick_simulation_if_due(&mut self) {
        let due = match &self.sim {
            Some(sim) => sim.last_tick.elapsed() >= sim.interval,
            None => false,
        };
        if !due {
            return;
        }

        let callback = match &self.sim {
            Some(sim) => sim.callback.clone(),
            None => return,
        };
        callback.tick(&mut self.world);
        if let Some(sim) = &mut self.sim {
            sim.last_tick = Instant::now();
        }
    }

    pub fn next_worker_id(&mut self) -> WorkerId {
        let id = self.next_worker_id;
        self.next_worker_id += 1;
        id
    }

    pub fn session(&self, id: WorkerId) -> Option<&ClientSession> {
        self.sessions.get(&id)
    }

    pub fn session_mut(&mut self, id: WorkerId) -> Option<&mut ClientSession> {
        self.sessions.get_mut(&id)
    }

    /// `num_clients` equals the number of live session records, so it's a
    /// query rather than a separately tracked counter.
    pub fn num_clients(&self) -> usize {
        self.sessions.len()
    }

    /// Sends one master->worker packet to `target`, retrying on transient
    /// backpressure. The per-worker datagram socket is a kernel buffer, not
    /// a real stream, so `Wait` here only ever means "try again right away".
    pub fn send_packet(&self, target: WorkerId, packet: MasterPacket) {
        if let Some(session) = self.sessions.get(&target) {
            send_retrying(&session.channel, &packet);
        }
    }

    /// Broadcasts `text` to `target`, splitting oversized payloads per the
    /// `BCASTMSG` chunking rule.
    pub fn send_text(&self, target: WorkerId, text: &str) {
        for chunk in mudnet::ipc::split_broadcast(text.as_bytes()) {
            self.send_packet(target, MasterPacket::new(mudnet::ipc::BCASTMSG, chunk.to_vec()));
        }
    }

    pub fn send_alldone(&self, target: WorkerId) {
        self.send_packet(target, MasterPacket::new(mudnet::ipc::ALLDONE, Vec::new()));
    }
}

/// Retries a packet send until it is accepted by the kernel socket buffer.
/// Here `Wait` means "spin briefly", since the master must not block its
/// single-threaded loop on one worker.
fn send_retrying(channel: &Channel, packet: &MasterPacket) {
    loop {
        match channel.send_master_packet(packet) {
            Ok(()) => return,
            Err(flux::shared::NetworkError::Wait) => thread::sleep(Duration::from_micros(200)),
            Err(flux::shared::NetworkError::Fatal(_)) => return,
        }
    }
}
