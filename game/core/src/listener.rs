//! Connection manager and the master's single-threaded event loop.
//!
//! A freshly accepted connection's worker-IPC channel is registered on the
//! very same `Poll` the listener uses, at lowest priority: the listener's
//! token is always drained first, so a burst of new connections is never
//! starved by chatty existing sessions.

use crate::dispatch;
use crate::server::{Server, WorkerId};
use crate::session::ClientSession;
use crate::worker;
use flux::logging::{info, warn};
use flux::shared::NetworkError;
use mio::net::TcpListener;
use mio::{Events, Poll, PollOpt, Ready, Token};
use mudnet::ipc::Channel;
use mudnet::reactor;
use std::io;
use std::thread;

const LISTENER_TOKEN: Token = Token(0);
/// Worker channel tokens start here; `Token(0)` is reserved for the listener,
/// so a live worker's token is always `Token(worker_id + WORKER_TOKEN_BASE)`.
const WORKER_TOKEN_BASE: usize = 1;

fn worker_token(id: WorkerId) -> Token {
    Token(id as usize + WORKER_TOKEN_BASE)
}

fn token_worker_id(token: Token) -> WorkerId {
    (token.0 - WORKER_TOKEN_BASE) as WorkerId
}

/// Runs the master's event loop until the process is killed or the listener
/// socket errors out fatally. Everything reachable from `server` is touched
/// only here and from `dispatch`, which this loop calls directly. Polls with
/// a bounded timeout (the world module's simulation interval, or a default
/// ceiling) rather than blocking forever, so a due simulation tick is never
/// stuck waiting on the next worker packet.
pub fn run(server: &mut Server) -> io::Result<()> {
    let addr = format!("0.0.0.0:{}", server.config.port).parse().expect("bind address is always well-formed");
    let listener = TcpListener::bind(&addr)?;

    let poll = Poll::new()?;
    poll.register(&listener, LISTENER_TOKEN, Ready::readable(), PollOpt::edge())?;

    let mut events = Events::with_capacity(1024);
    info!(server.log, "listening"; "port" => server.config.port);

    loop {
        poll.poll(&mut events, Some(server.poll_timeout()))?;
        server.tick_simulation_if_due();

        let mut listener_ready = false;
        let mut ready_workers = Vec::new();
        for event in &events {
            if event.token() == LISTENER_TOKEN {
                listener_ready = true;
            } else {
                ready_workers.push(token_worker_id(event.token()));
            }
        }

        if listener_ready {
            accept_all(server, &listener, &poll);
        }
        for worker_id in ready_workers {
            drain_worker(server, &poll, worker_id);
        }
    }
}

/// Drains the listener until it reports `WouldBlock`, since edge-triggered
/// readiness only fires once per burst of pending connections.
fn accept_all(server: &mut Server, listener: &TcpListener, poll: &Poll) {
    loop {
        match listener.accept() {
            Ok((stream, addr)) => spawn_worker(server, poll, stream, addr),
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
            Err(err) => {
                warn!(server.log, "accept failed"; "error" => %err);
                break;
            }
        }
    }
}

/// Allocates a session slot and its IPC channel (a plain `HashMap` entry,
/// since `WorkerId` is never reused while a session is live), registers the
/// master-side half on `poll`, and spawns the worker thread that owns the
/// other half plus the raw TCP socket.
fn spawn_worker(server: &mut Server, poll: &Poll, stream: mio::net::TcpStream, addr: std::net::SocketAddr) {
    let worker_id = server.next_worker_id();

    let (master_channel, worker_channel) = match Channel::pair() {
        Ok(pair) => pair,
        Err(err) => {
            warn!(server.log, "failed to create worker channel"; "error" => %err);
            return;
        }
    };

    if let Err(err) = poll.register(master_channel.socket(), worker_token(worker_id), Ready::readable(), PollOpt::edge()) {
        warn!(server.log, "failed to register worker channel"; "worker" => worker_id, "error" => %err);
        return;
    }

    server.sessions.insert(worker_id, ClientSession::new(worker_id, addr, master_channel));
    info!(server.log, "client connected"; "worker" => worker_id, "addr" => %addr);

    let log = server.log.clone();
    thread::spawn(move || worker::run(worker_id, stream, worker_channel, log));
}

/// Drains every packet currently waiting on `worker_id`'s channel, handing
/// each to [`dispatch::dispatch`], and reaps the session on a fatal channel
/// error -- a too-short datagram, or the worker thread's socket half
/// closing, both surface as `NetworkError::Fatal(EmptyPayload)` here.
fn drain_worker(server: &mut Server, poll: &Poll, worker_id: WorkerId) {
    let result = reactor::drain_while_ready(true, || {
        let packet = match server.sessions.get_mut(&worker_id) {
            Some(session) => session.channel.recv_worker_packet(),
            None => return Err(NetworkError::Wait),
        }?;
        dispatch::dispatch(server, worker_id, packet.cmd, &packet.payload);
        Ok(())
    });

    if result.is_err() {
        reap_session(server, poll, worker_id);
    }
}

fn reap_session(server: &mut Server, poll: &Poll, worker_id: WorkerId) {
    if let Some(session) = server.sessions.remove(&worker_id) {
        let _ = poll.deregister(session.channel.socket());
        info!(server.log, "client disconnected"; "worker" => worker_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_token_roundtrips_through_token_worker_id() {
        assert_eq!(token_worker_id(worker_token(0)), 0);
        assert_eq!(token_worker_id(worker_token(41)), 41);
    }

    #[test]
    fn listener_token_is_reserved() {
        assert_ne!(worker_token(0), LISTENER_TOKEN);
    }
}
