#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]
#![allow(clippy::new_without_default_derive)]

pub mod auth;
pub mod logging;
pub mod persist;
pub mod shared;
pub mod time;
