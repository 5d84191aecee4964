//! The master side of the MUD server: shared world/user state (`server`),
//! the wire protocol and request table (`protocol`/`dispatch`), the
//! connection manager and event loop (`listener`), persistence (`persist`),
//! first-run account setup (`firstrun`), and the worker side of a session
//! (`worker`).

pub mod config;
pub mod dispatch;
pub mod firstrun;
pub mod listener;
pub mod persist;
pub mod protocol;
pub mod server;
pub mod session;
pub mod worker;
