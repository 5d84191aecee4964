//! The worker side of a session: owns the player's TCP socket and one end
//! of its IPC channel to the master, and is the only place user text turns
//! into protocol requests. Runs as its own `std::thread`, and never touches
//! `Server` state directly -- everything it needs comes back over the
//! channel.

use crate::protocol::{self, SessionState};
use flux::logging::{warn, Logger};
use mio::net::TcpStream;
use mio::{Events, Poll, PollOpt, Ready, Token};
use mudnet::ipc::{Channel, MasterPacket, WorkerPacket, ALLDONE, BCASTMSG};
use mudnet::reactor;
use mudnet::textio::LineChannel;
use std::thread;
use std::time::Duration;
use worldmodel::Direction;

const TCP_TOKEN: Token = Token(0);
const CHAN_TOKEN: Token = Token(1);

/// Login is terminal after this many failed attempts.
const MAX_LOGIN_ATTEMPTS: u32 = 3;

/// Outcome of one full request/ALLDONE round-trip: every non-`ALLDONE`
/// packet seen along the way, already filtered of the ones this function
/// renders itself (`BCASTMSG`, `RAWMODE`), plus whether a `KICK` ended the
/// session.
struct RequestOutcome {
    /// Packets whose `cmd` matches the request just sent -- the typed
    /// replies `GETUSERDATA`/`MOVE`/`ADDUSERDATA`/`DELUSERDATA` carry.
    replies: Vec<MasterPacket>,
    kicked: bool,
}

/// Entry point run on the worker's own thread. `worker_id` is the
/// `sender_id` the master already assigned this session before spawning it.
/// `stream` is the accepted connection handed off by the listener -- the
/// TCP socket itself lives in the worker thread, not the master.
pub fn run(worker_id: u64, stream: TcpStream, mut channel: Channel, log: Logger) {
    let mut line_channel = LineChannel::new(stream);

    let poll = match Poll::new() {
        Ok(poll) => poll,
        Err(err) => {
            warn!(log, "failed to create worker poll"; "error" => %err);
            return;
        }
    };

    if line_channel.register(TCP_TOKEN, &poll).is_err()
        || poll.register(channel.socket(), CHAN_TOKEN, Ready::readable(), PollOpt::edge()).is_err()
    {
        warn!(log, "failed to register worker poll sources");
        return;
    }

    let mut worker = Worker {
        worker_id,
        log,
        state: SessionState::LoginScreen,
        pending_username: None,
        login_attempts: 0,
        raw_mode: false,
        disconnected: false,
    };

    worker.prompt_username(&mut line_channel);
    let mut events = Events::with_capacity(16);

    while !worker.disconnected {
        if poll.poll(&mut events, Some(Duration::from_millis(200))).is_err() {
            break;
        }

        for event in &events {
            match event.token() {
                TCP_TOKEN => {
                    if line_channel.receive().is_err() {
                        worker.disconnected = true;
                    }
                }
                CHAN_TOKEN => {
                    worker.drain_async(&mut channel, &mut line_channel);
                }
                _ => {}
            }
        }

        if line_channel.send().is_err() {
            worker.disconnected = true;
        }

        while !worker.disconnected {
            let line = if worker.raw_mode { line_channel.take_raw() } else { line_channel.take_line() };
            let line = match line {
                Some(line) => line,
                None => break,
            };
            worker.handle_input_line(&line, &mut channel, &mut line_channel);
            let _ = line_channel.send();
        }
    }

    let _ = line_channel.deregister(&poll);
}

struct Worker {
    worker_id: u64,
    log: Logger,
    state: SessionState,
    pending_username: Option<String>,
    login_attempts: u32,
    raw_mode: bool,
    disconnected: bool,
}

impl Worker {
    fn prompt_username(&self, line_channel: &mut LineChannel) {
        line_channel.queue_write(b"Username: ");
    }

    /// Drains every packet currently waiting on the channel outside of an
    /// active request/`ALLDONE` round-trip -- broadcasts from other
    /// sessions, or an unsolicited `KICK`.
    fn drain_async(&mut self, channel: &mut Channel, line_channel: &mut LineChannel) {
        let _ = reactor::drain_while_ready(true, || {
            let packet = channel.recv_master_packet()?;
            self.render_async(packet, line_channel);
            Ok(())
        });
    }

    fn render_async(&mut self, packet: MasterPacket, line_channel: &mut LineChannel) {
        match packet.cmd {
            BCASTMSG => {
                line_channel.queue_write(&packet.payload);
            }
            cmd if cmd == protocol::RAWMODE => {
                self.raw_mode = !self.raw_mode;
            }
            cmd if cmd == protocol::KICK => {
                line_channel.queue_write(&packet.payload);
                line_channel.queue_write(b"\n");
                self.disconnected = true;
            }
            _ => {}
        }
    }

    /// Sends one worker->master request and blocks until the matching
    /// `ALLDONE` arrives, rendering anything else that shows up on the
    /// channel meanwhile exactly like [`Self::drain_async`] would.
    fn request(&mut self, channel: &mut Channel, line_channel: &mut LineChannel, cmd: u8, payload: Vec<u8>) -> RequestOutcome {
        let packet = WorkerPacket::new(self.worker_id, cmd, payload);
        loop {
            match channel.send_worker_packet(&packet) {
                Ok(()) => break,
                Err(flux::shared::NetworkError::Wait) => thread::sleep(Duration::from_micros(200)),
                Err(flux::shared::NetworkError::Fatal(_)) => {
                    self.disconnected = true;
                    return RequestOutcome { replies: Vec::new(), kicked: false };
                }
            }
        }

        // `BCASTMSG`/`RAWMODE`/`KICK` are always rendered through
        // `render_async`, even when `cmd` itself is one of them (e.g. a
        // `say` command's own `BCASTMSG` echoing back to its sender, or an
        // admin kicking themselves whose forwarded `KICK` packet arrives
        // inside their own `KICK` request's wait loop) -- only a reply
        // whose code is none of those three is collected as this request's
        // typed answer.
        let mut replies = Vec::new();
        loop {
            match channel.recv_master_packet() {
                Ok(packet) if packet.cmd == ALLDONE => break,
                Ok(packet) if packet.cmd == BCASTMSG || packet.cmd == protocol::RAWMODE || packet.cmd == protocol::KICK => {
                    self.render_async(packet, line_channel);
                }
                Ok(packet) if packet.cmd == cmd => replies.push(packet),
                Ok(_) => {}
                Err(flux::shared::NetworkError::Wait) => thread::sleep(Duration::from_micros(200)),
                Err(flux::shared::NetworkError::Fatal(_)) => {
                    self.disconnected = true;
                    break;
                }
            }
            if self.disconnected {
                break;
            }
        }

        RequestOutcome { replies, kicked: self.disconnected }
    }

    fn handle_input_line(&mut self, line: &[u8], channel: &mut Channel, line_channel: &mut LineChannel) {
        match self.state {
            SessionState::LoginScreen => self.handle_username(line, line_channel),
            SessionState::CheckingCredentials => self.handle_password(line, channel, line_channel),
            SessionState::LoggedInUser | SessionState::LoggedInAdmin => {
                self.handle_command(line, channel, line_channel)
            }
            _ => {}
        }
    }

    fn handle_username(&mut self, line: &[u8], line_channel: &mut LineChannel) {
        let username = String::from_utf8_lossy(line).trim().to_string();
        if username.is_empty() {
            self.prompt_username(line_channel);
            return;
        }
        self.pending_username = Some(username);
        self.state = SessionState::CheckingCredentials;
        line_channel.queue_write(b"Password: ");
    }

    fn handle_password(&mut self, line: &[u8], channel: &mut Channel, line_channel: &mut LineChannel) {
        let password = String::from_utf8_lossy(line).trim().to_string();
        let username = self.pending_username.clone().unwrap_or_default();

        let outcome = self.request(channel, line_channel, protocol::GETUSERDATA, protocol::encode_username_payload(&username));
        if outcome.kicked {
            return;
        }

        let record = outcome
            .replies
            .first()
            .and_then(|packet| protocol::decode_getuserdata_reply(&packet.payload).ok())
            .flatten();

        let matched = record.as_ref().map(|record| {
            let mut salt = [0u8; flux::auth::SALT_LEN];
            salt.copy_from_slice(&record.salt);
            let mut digest = [0u8; flux::auth::DIGEST_LEN];
            digest.copy_from_slice(&record.digest);
            (flux::auth::verify(&salt, &digest, &password), record.privilege)
        });

        match matched {
            Some((true, privilege)) => self.complete_login(privilege, channel, line_channel),
            _ => self.fail_login(line_channel),
        }
    }

    fn complete_login(&mut self, privilege: i32, channel: &mut Channel, line_channel: &mut LineChannel) {
        let username = self.pending_username.clone().unwrap_or_default();
        let new_state = if privilege == userdb::Privilege::Admin.to_raw() {
            SessionState::LoggedInAdmin
        } else {
            SessionState::LoggedInUser
        };

        self.request(channel, line_channel, protocol::CHANGEUSER, protocol::encode_changeuser(&username));
        self.request(channel, line_channel, protocol::CHANGESTATE, protocol::encode_changestate(new_state));
        self.state = new_state;

        line_channel.queue_write(format!("Welcome, {}.\n", username).as_bytes());

        self.request(channel, line_channel, protocol::SETROOM, protocol::encode_setroom(0));
        self.look(channel, line_channel);
    }

    fn fail_login(&mut self, line_channel: &mut LineChannel) {
        self.login_attempts += 1;
        if self.login_attempts >= MAX_LOGIN_ATTEMPTS {
            self.state = SessionState::AccessDenied;
            line_channel.queue_write(b"Access denied.\n");
            self.disconnected = true;
            return;
        }

        line_channel.queue_write(b"Login incorrect.\n");
        self.state = SessionState::LoginScreen;
        self.pending_username = None;
        self.prompt_username(line_channel);
    }

    fn look(&mut self, channel: &mut Channel, line_channel: &mut LineChannel) {
        let name = self.request(channel, line_channel, protocol::GETROOMNAME, Vec::new());
        for packet in name.replies {
            line_channel.queue_write(&packet.payload);
        }

        let desc = self.request(channel, line_channel, protocol::GETROOMDESC, Vec::new());
        for packet in desc.replies {
            line_channel.queue_write(&packet.payload);
        }
    }

    /// Tokenizes one command line into exactly one protocol request,
    /// falling back to `EXECVERB` for anything not recognized as a
    /// built-in.
    fn handle_command(&mut self, line: &[u8], channel: &mut Channel, line_channel: &mut LineChannel) {
        if self.raw_mode {
            self.request(channel, line_channel, protocol::EXECVERB, line.to_vec());
            return;
        }

        let text = String::from_utf8_lossy(line).into_owned();
        let mut parts = text.splitn(2, char::is_whitespace);
        let verb = parts.next().unwrap_or("").to_lowercase();
        let rest = parts.next().unwrap_or("").trim();

        if verb.is_empty() {
            return;
        }

        if let Some(direction) = Direction::parse(&verb) {
            let outcome = self.request(channel, line_channel, protocol::MOVE, protocol::encode_move(direction));
            for packet in &outcome.replies {
                if packet.cmd == protocol::MOVE {
                    let _ = protocol::decode_move_reply(&packet.payload);
                }
            }
            if !outcome.kicked {
                self.look(channel, line_channel);
            }
            return;
        }

        match verb.as_str() {
            "look" | "l" if rest.is_empty() => {
                self.look(channel, line_channel);
            }
            "look" | "examine" | "l" => {
                self.request(channel, line_channel, protocol::LOOKAT, protocol::encode_bare_string(rest));
            }
            "take" | "get" => {
                self.request(channel, line_channel, protocol::TAKE, protocol::encode_bare_string(rest));
            }
            "drop" => {
                self.request(channel, line_channel, protocol::DROP, protocol::encode_bare_string(rest));
            }
            "inventory" | "i" => {
                self.request(channel, line_channel, protocol::PRINTINVENTORY, Vec::new());
            }
            "say" => {
                let username = self.pending_username.clone().unwrap_or_default();
                let chat = format!("{}: {}\n", username, rest);
                self.request(channel, line_channel, BCASTMSG, chat.into_bytes());
            }
            "who" => {
                self.request(channel, line_channel, protocol::LISTCLIENTS, Vec::new());
            }
            "users" => {
                self.request(channel, line_channel, protocol::LISTUSERS, Vec::new());
            }
            "wait" => {
                self.request(channel, line_channel, protocol::WAIT, Vec::new());
            }
            "kick" if self.state == SessionState::LoggedInAdmin => {
                self.kick(rest, channel, line_channel);
            }
            "kickall" if self.state == SessionState::LoggedInAdmin => {
                self.request(channel, line_channel, protocol::KICKALL, protocol::encode_bare_string(rest));
            }
            "adduser" if self.state == SessionState::LoggedInAdmin => {
                self.adduser(rest, channel, line_channel);
            }
            "deluser" if self.state == SessionState::LoggedInAdmin => {
                let outcome =
                    self.request(channel, line_channel, protocol::DELUSERDATA, protocol::encode_username_payload(rest));
                self.render_bool_reply(&outcome.replies, line_channel);
            }
            _ => {
                self.request(channel, line_channel, protocol::EXECVERB, text.into_bytes());
            }
        }
    }

    /// `kick <id> <message...>` -- admin-only.
    fn kick(&mut self, rest: &str, channel: &mut Channel, line_channel: &mut LineChannel) {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let target = match parts.next().and_then(|id| id.parse::<u64>().ok()) {
            Some(target) => target,
            None => {
                line_channel.queue_write(b"Usage: kick <id> <message>\n");
                return;
            }
        };
        let message = parts.next().unwrap_or("").to_string();
        self.request(channel, line_channel, protocol::KICK, protocol::encode_kick(target, &message));
    }

    /// `adduser <username> <password> [admin]` -- admin-only.
    fn adduser(&mut self, rest: &str, channel: &mut Channel, line_channel: &mut LineChannel) {
        let mut parts = rest.split_whitespace();
        let (username, password) = match (parts.next(), parts.next()) {
            (Some(username), Some(password)) => (username, password),
            _ => {
                line_channel.queue_write(b"Usage: adduser <username> <password> [admin]\n");
                return;
            }
        };
        let privilege = if parts.next() == Some("admin") { userdb::Privilege::Admin } else { userdb::Privilege::User };

        let outcome = self.request(
            channel,
            line_channel,
            protocol::ADDUSERDATA,
            protocol::encode_adduserdata(username, password, privilege.to_raw()),
        );
        self.render_bool_reply(&outcome.replies, line_channel);
    }

    fn render_bool_reply(&self, replies: &[MasterPacket], line_channel: &mut LineChannel) {
        let ok = replies.first().map_or(false, |packet| protocol::decode_bool_reply(&packet.payload));
        line_channel.queue_write(if ok { b"Success.\n" } else { b"Failed.\n" });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_login_attempts_matches_session_bound() {
        assert_eq!(MAX_LOGIN_ATTEMPTS, crate::session::MAX_LOGIN_ATTEMPTS);
    }
}
