//! A registered player account: credentials, privilege level, and the
//! inventory/world-state that survives across sessions.

use flux::auth::{self, Digest512, Salt};
use flux::persist::{PersistRead, PersistWrite};
use std::io;
use worldmodel::ObjectMultimap;

/// On-disk/wire encoding: `PRIV_NONE=-1, PRIV_USER=0, PRIV_ADMIN=1337`.
/// `None` is only reachable transiently (a session before login); it is
/// never the privilege of a persisted `User` record, but keeping the
/// variant lets `Privilege` double as both the wire/storage type and the
/// session's current-privilege field.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Privilege {
    None,
    User,
    Admin,
}

impl Privilege {
    /// Exposed so callers outside this crate (the `ADDUSERDATA`/`GETUSERDATA`
    /// wire protocol in `gamecore`) can use the exact same on-disk encoding.
    pub fn to_raw(self) -> i32 {
        match self {
            Privilege::None => -1,
            Privilege::User => 0,
            Privilege::Admin => 1337,
        }
    }

    pub fn from_raw(raw: i32) -> Privilege {
        match raw {
            1337 => Privilege::Admin,
            0 => Privilege::User,
            _ => Privilege::None,
        }
    }
}

pub struct User {
    pub username: String,
    pub salt: Salt,
    pub digest: Digest512,
    pub privilege: Privilege,
    pub last_login: u64,
    pub inventory: ObjectMultimap,
    /// Opaque blob round-tripped through the world module's
    /// serialize/deserialize-user-payload hooks.
    pub world_payload: Vec<u8>,
}

impl User {
    /// Creates a new user, computing `digest` from `password` with a freshly
    /// generated salt.
    pub fn new(username: impl Into<String>, password: &str, privilege: Privilege) -> User {
        let salt = auth::generate_salt();
        let digest = auth::digest(&salt, password);

        User {
            username: username.into(),
            salt,
            digest,
            privilege,
            last_login: 0,
            inventory: ObjectMultimap::new(),
            world_payload: Vec::new(),
        }
    }

    pub fn check_password(&self, password: &str) -> bool {
        auth::verify(&self.salt, &self.digest, password)
    }

    /// Writes everything but the inventory -- that's reattached by the
    /// caller after rooms/object classes are resolved, since a bare `User`
    /// record has no way to resolve a class name back to an
    /// `Arc<dyn ObjectClass>` on its own. `world_payload` is an opaque blob
    /// with no such resolution step, so it round-trips here directly.
    pub fn write_header<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_string(&self.username)?;
        writer.write_bytes(&self.salt)?;
        writer.write_bytes(&self.digest)?;
        writer.write_i32(self.privilege.to_raw())?;
        writer.write_u64(self.last_login)?;
        writer.write_bytes(&self.world_payload)
    }

    pub fn read_header<R: io::Read>(reader: &mut R) -> io::Result<User> {
        let username = reader.read_string()?;

        let salt_bytes = reader.read_bytes()?;
        let mut salt: Salt = [0u8; auth::SALT_LEN];
        salt.copy_from_slice(&salt_bytes);

        let digest_bytes = reader.read_bytes()?;
        let mut digest: Digest512 = [0u8; auth::DIGEST_LEN];
        digest.copy_from_slice(&digest_bytes);

        let privilege = Privilege::from_raw(reader.read_i32()?);
        let last_login = reader.read_u64()?;
        let world_payload = reader.read_bytes()?;

        Ok(User {
            username,
            salt,
            digest,
            privilege,
            last_login,
            inventory: ObjectMultimap::new(),
            world_payload,
        })
    }
}

trait IntExt: io::Write {
    fn write_i32(&mut self, value: i32) -> io::Result<()>;
    fn write_u64(&mut self, value: u64) -> io::Result<()>;
}

impl<W: io::Write + ?Sized> IntExt for W {
    fn write_i32(&mut self, value: i32) -> io::Result<()> {
        use byteorder::{BigEndian, WriteBytesExt};
        WriteBytesExt::write_i32::<BigEndian>(self, value)
    }

    fn write_u64(&mut self, value: u64) -> io::Result<()> {
        use byteorder::{BigEndian, WriteBytesExt};
        WriteBytesExt::write_u64::<BigEndian>(self, value)
    }
}

trait IntReadExt: io::Read {
    fn read_i32(&mut self) -> io::Result<i32>;
    fn read_u64(&mut self) -> io::Result<u64>;
}

impl<R: io::Read + ?Sized> IntReadExt for R {
    fn read_i32(&mut self) -> io::Result<i32> {
        use byteorder::{BigEndian, ReadBytesExt};
        ReadBytesExt::read_i32::<BigEndian>(self)
    }

    fn read_u64(&mut self) -> io::Result<u64> {
        use byteorder::{BigEndian, ReadBytesExt};
        ReadBytesExt::read_u64::<BigEndian>(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_password_checks_out() {
        let user = User::new("alice", "hunter2", Privilege::Admin);
        assert!(user.check_password("hunter2"));
        assert!(!user.check_password("wrong"));
        assert_eq!(user.privilege, Privilege::Admin);
    }

    #[test]
    fn header_roundtrips() {
        let user = User::new("alice", "hunter2", Privilege::Admin);
        let mut buf = Vec::new();
        user.write_header(&mut buf).unwrap();

        let mut cursor = io::Cursor::new(buf);
        let restored = User::read_header(&mut cursor).unwrap();

        assert_eq!(restored.username, "alice");
        assert_eq!(restored.salt, user.salt);
        assert_eq!(restored.digest, user.digest);
        assert_eq!(restored.privilege, Privilege::Admin);
        assert!(restored.check_password("hunter2"));
    }

    #[test]
    fn privilege_raw_values_match_reference_constants() {
        assert_eq!(Privilege::Admin.to_raw(), 1337);
        assert_eq!(Privilege::User.to_raw(), 0);
        assert_eq!(Privilege::None.to_raw(), -1);
    }
}
