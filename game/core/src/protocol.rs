//! Request codes and wire payloads for the worker<->master protocol.
//! `mudnet::ipc` owns the two codes the transport itself reserves
//! (`BCASTMSG`, `ALLDONE`); every other code used by the request table lives
//! here, numbered starting right after them.
//!
//! Payloads are packed fields in sender byte order: fixed-width fields via
//! `byteorder`, with `flux::persist`'s length-prefixed helpers reused where a
//! field is a string. A payload that is *itself* a bare string (`CHANGEUSER`,
//! `TAKE`'s noun, `EXECVERB`'s line) is written unframed -- the packet
//! framing already gives the reader its exact length, so a second length
//! prefix would be redundant.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flux::persist::{PersistRead, PersistWrite};
use std::io::{self, Cursor};
use worldmodel::Direction;

pub const NOP: u8 = 2;
pub const CHANGESTATE: u8 = 3;
pub const CHANGEUSER: u8 = 4;
pub const KICK: u8 = 5;
pub const KICKALL: u8 = 6;
pub const LISTCLIENTS: u8 = 7;
pub const SETROOM: u8 = 8;
pub const MOVE: u8 = 9;
pub const GETUSERDATA: u8 = 10;
pub const ADDUSERDATA: u8 = 11;
pub const DELUSERDATA: u8 = 12;
pub const LOOKAT: u8 = 13;
pub const TAKE: u8 = 14;
pub const DROP: u8 = 15;
pub const EXECVERB: u8 = 16;
pub const PRINTINVENTORY: u8 = 17;
pub const LISTUSERS: u8 = 18;
pub const GETROOMDESC: u8 = 19;
pub const GETROOMNAME: u8 = 20;
pub const WAIT: u8 = 21;
/// Master->worker only: flips the worker's line/raw reading mode. Never
/// appears as a worker->master request, so it sits outside the request
/// dispatch table entirely.
pub const RAWMODE: u8 = 22;

/// Session state enum; `Init` is never observed by the master (the worker
/// moves past it before its first request), but keeping it makes the
/// encoding total.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SessionState {
    Init,
    LoginScreen,
    CheckingCredentials,
    LoggedInUser,
    LoggedInAdmin,
    AccessDenied,
}

impl SessionState {
    pub fn to_raw(self) -> i32 {
        match self {
            SessionState::Init => 0,
            SessionState::LoginScreen => 1,
            SessionState::CheckingCredentials => 2,
            SessionState::LoggedInUser => 3,
            SessionState::LoggedInAdmin => 4,
            SessionState::AccessDenied => 5,
        }
    }

    pub fn from_raw(raw: i32) -> Option<SessionState> {
        match raw {
            0 => Some(SessionState::Init),
            1 => Some(SessionState::LoginScreen),
            2 => Some(SessionState::CheckingCredentials),
            3 => Some(SessionState::LoggedInUser),
            4 => Some(SessionState::LoggedInAdmin),
            5 => Some(SessionState::AccessDenied),
            _ => None,
        }
    }
}

pub fn encode_changestate(state: SessionState) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4);
    buf.write_i32::<BigEndian>(state.to_raw()).expect("write to Vec never fails");
    buf
}

pub fn decode_changestate(payload: &[u8]) -> io::Result<SessionState> {
    let raw = Cursor::new(payload).read_i32::<BigEndian>()?;
    SessionState::from_raw(raw).ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unknown session state"))
}

/// Spec §9 open question: the payload is not guaranteed NUL-terminated, so
/// the copy is bounded to the packet's own length rather than scanned for a
/// terminator. Trailing NUL bytes (if a client does send one) are trimmed.
/// Shared by every request whose entire payload is one bare string --
/// `CHANGEUSER`, and `LOOKAT`/`TAKE`/`DROP`'s noun.
pub fn encode_bare_string(value: &str) -> Vec<u8> {
    value.as_bytes().to_vec()
}

pub fn decode_bare_string(payload: &[u8]) -> String {
    let trimmed = match payload.iter().position(|&b| b == 0) {
        Some(pos) => &payload[..pos],
        None => payload,
    };
    String::from_utf8_lossy(trimmed).into_owned()
}

pub fn encode_changeuser(username: &str) -> Vec<u8> {
    encode_bare_string(username)
}

pub fn decode_changeuser(payload: &[u8]) -> String {
    decode_bare_string(payload)
}

pub fn encode_kick(target: u64, message: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + message.len());
    buf.write_u64::<BigEndian>(target).expect("write to Vec never fails");
    buf.extend_from_slice(message.as_bytes());
    buf
}

pub fn decode_kick(payload: &[u8]) -> io::Result<(u64, String)> {
    let mut cursor = Cursor::new(payload);
    let target = cursor.read_u64::<BigEndian>()?;
    let message = String::from_utf8_lossy(&payload[8..]).into_owned();
    Ok((target, message))
}

pub fn encode_setroom(room: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4);
    buf.write_u32::<BigEndian>(room).expect("write to Vec never fails");
    buf
}

pub fn decode_setroom(payload: &[u8]) -> io::Result<u32> {
    Cursor::new(payload).read_u32::<BigEndian>()
}

pub fn encode_move(direction: Direction) -> Vec<u8> {
    vec![direction.index() as u8]
}

pub fn decode_move(payload: &[u8]) -> Option<Direction> {
    let index = *payload.first()? as usize;
    Direction::ALL.get(index).copied()
}

/// `MOVE`'s reply payload: a single status byte, 1 on success.
pub fn encode_move_reply(success: bool) -> Vec<u8> {
    vec![success as u8]
}

pub fn decode_move_reply(payload: &[u8]) -> bool {
    payload.first().map_or(false, |&b| b != 0)
}

pub fn encode_username_payload(username: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_string(username).expect("write to Vec never fails");
    buf
}

pub fn decode_username_payload(payload: &[u8]) -> io::Result<String> {
    Cursor::new(payload).read_string()
}

/// `ADDUSERDATA` request payload: username, password, privilege.
pub fn encode_adduserdata(username: &str, password: &str, privilege: i32) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_string(username).expect("write to Vec never fails");
    buf.write_string(password).expect("write to Vec never fails");
    buf.write_i32::<BigEndian>(privilege).expect("write to Vec never fails");
    buf
}

pub fn decode_adduserdata(payload: &[u8]) -> io::Result<(String, String, i32)> {
    let mut cursor = Cursor::new(payload);
    let username = cursor.read_string()?;
    let password = cursor.read_string()?;
    let privilege = cursor.read_i32::<BigEndian>()?;
    Ok((username, password, privilege))
}

/// `GETUSERDATA` reply payload: `found`, and if found the full credential
/// record the worker needs to verify a password locally. Workers never
/// resolve world-module symbols, but password hashing is a plain library
/// call, not a world-module hook.
pub fn encode_getuserdata_reply(found: Option<(&[u8], &[u8], i32, u64)>) -> Vec<u8> {
    let mut buf = Vec::new();
    match found {
        None => {
            buf.write_bool_field(false).expect("write to Vec never fails");
        }
        Some((salt, digest, privilege, last_login)) => {
            buf.write_bool_field(true).expect("write to Vec never fails");
            buf.write_bytes(salt).expect("write to Vec never fails");
            buf.write_bytes(digest).expect("write to Vec never fails");
            buf.write_i32::<BigEndian>(privilege).expect("write to Vec never fails");
            buf.write_u64::<BigEndian>(last_login).expect("write to Vec never fails");
        }
    }
    buf
}

pub struct UserRecordReply {
    pub salt: Vec<u8>,
    pub digest: Vec<u8>,
    pub privilege: i32,
    pub last_login: u64,
}

pub fn decode_getuserdata_reply(payload: &[u8]) -> io::Result<Option<UserRecordReply>> {
    let mut cursor = Cursor::new(payload);
    if !cursor.read_bool_field()? {
        return Ok(None);
    }
    let salt = cursor.read_bytes()?;
    let digest = cursor.read_bytes()?;
    let privilege = cursor.read_i32::<BigEndian>()?;
    let last_login = cursor.read_u64::<BigEndian>()?;
    Ok(Some(UserRecordReply { salt, digest, privilege, last_login }))
}

pub fn encode_bool_reply(value: bool) -> Vec<u8> {
    vec![value as u8]
}

pub fn decode_bool_reply(payload: &[u8]) -> bool {
    payload.first().map_or(false, |&b| b != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changestate_roundtrips() {
        let encoded = encode_changestate(SessionState::LoggedInAdmin);
        assert_eq!(decode_changestate(&encoded).unwrap(), SessionState::LoggedInAdmin);
    }

    #[test]
    fn changeuser_is_bounded_to_payload_length_without_nul_scan() {
        let payload = b"alice";
        assert_eq!(decode_changeuser(payload), "alice");
    }

    #[test]
    fn changeuser_trims_embedded_nul() {
        let mut payload = b"alice".to_vec();
        payload.push(0);
        payload.extend_from_slice(b"garbage");
        assert_eq!(decode_changeuser(&payload), "alice");
    }

    #[test]
    fn move_direction_roundtrips() {
        let encoded = encode_move(Direction::Up);
        assert_eq!(decode_move(&encoded), Some(Direction::Up));
    }

    #[test]
    fn move_reply_roundtrips() {
        assert_eq!(decode_move_reply(&encode_move_reply(true)), true);
        assert_eq!(decode_move_reply(&encode_move_reply(false)), false);
    }

    #[test]
    fn getuserdata_reply_roundtrips_found_and_absent() {
        assert!(decode_getuserdata_reply(&encode_getuserdata_reply(None)).unwrap().is_none());

        let salt = [1u8; 16];
        let digest = [2u8; 64];
        let encoded = encode_getuserdata_reply(Some((&salt, &digest, 1337, 42)));
        let decoded = decode_getuserdata_reply(&encoded).unwrap().unwrap();
        assert_eq!(decoded.salt, salt.to_vec());
        assert_eq!(decoded.digest, digest.to_vec());
        assert_eq!(decoded.privilege, 1337);
        assert_eq!(decoded.last_login, 42);
    }

    #[test]
    fn kick_payload_roundtrips() {
        let encoded = encode_kick(7, "bye");
        let (target, message) = decode_kick(&encoded).unwrap();
        assert_eq!(target, 7);
        assert_eq!(message, "bye");
    }
}
