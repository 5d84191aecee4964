//! Master-side per-connection record, and the `VerbContext` a verb/room
//! hook runs against.

use crate::protocol::SessionState;
use crate::server::WorkerId;
use mudnet::ipc::{Channel, MasterPacket};
use std::net::SocketAddr;
use std::sync::Arc;
use worldmodel::{RoomId, VerbContext, VerbHandler, ROOM_NONE};

/// Login is terminal after this many failed attempts.
pub const MAX_LOGIN_ATTEMPTS: u32 = 3;

pub struct ClientSession {
    pub worker_id: WorkerId,
    pub addr: SocketAddr,
    pub state: SessionState,
    pub username: Option<String>,
    pub room: RoomId,
    /// Bookkeeping mirror of the worker's own line/raw mode, kept in sync by
    /// every `RAWMODE` packet the master sends.
    pub raw_mode: bool,
    /// The verb handler that last flipped `raw_mode` on -- while raw, every
    /// subsequent `EXECVERB` is redelivered to this handler verbatim instead
    /// of being tokenized.
    pub raw_handler: Option<Arc<dyn VerbHandler>>,
    pub login_attempts: u32,
    pub channel: Channel,
}

impl ClientSession {
    pub fn new(worker_id: WorkerId, addr: SocketAddr, channel: Channel) -> ClientSession {
        ClientSession {
            worker_id,
            addr,
            state: SessionState::LoginScreen,
            username: None,
            room: ROOM_NONE,
            raw_mode: false,
            raw_handler: None,
            login_attempts: 0,
            channel,
        }
    }
}

/// Adapts one `ClientSession` to the `VerbContext` a world-module verb or
/// room hook is invoked against -- verb handlers run in the master on
/// behalf of a worker. Replies go out as `BCASTMSG` to the session's own
/// channel, the same reply path every request uses except `MOVE`/user-data
/// RPCs.
pub struct SessionVerbContext<'a> {
    pub session: &'a mut ClientSession,
}

impl<'a> VerbContext for SessionVerbContext<'a> {
    fn username(&self) -> &str {
        self.session.username.as_deref().unwrap_or("")
    }

    fn send_line(&mut self, text: &str) {
        let mut line = text.to_string();
        line.push('\n');
        for chunk in mudnet::ipc::split_broadcast(line.as_bytes()) {
            let _ = self
                .session
                .channel
                .send_master_packet(&MasterPacket::new(mudnet::ipc::BCASTMSG, chunk.to_vec()));
        }
    }

    /// Toggling is idempotent-free: every call just flips the current mode.
    fn enter_raw_mode(&mut self) {
        self.session.raw_mode = !self.session.raw_mode;
        let _ = self
            .session
            .channel
            .send_master_packet(&MasterPacket::new(crate::protocol::RAWMODE, Vec::new()));
    }
}
