//! First-run account setup: when the user database is empty at load time,
//! someone has to seed the first admin account before the server can
//! authenticate anyone.
//!
//! Only the non-interactive `-a USER PASS` path is implemented here; an
//! interactive setup prompt is a separate concern this crate doesn't own.
//! An empty database with no injected credentials is a fatal init error,
//! not a prompt loop.

use userdb::{Privilege, User, UserDb};

/// Injected non-interactive admin credentials (`-a USER PASS`).
pub struct AdminSetup<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug)]
pub struct EmptyUserDb;

impl std::fmt::Display for EmptyUserDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user database is empty and no -a USER PASS admin credentials were supplied")
    }
}

impl std::error::Error for EmptyUserDb {}

/// Creates the first admin account if `userdb` is empty and `admin` was
/// injected. Returns an error if the database is empty with nothing to seed
/// it with -- the interactive fallback the reference implementation offers
/// here is out of this crate's scope.
pub fn ensure_admin(userdb: &mut UserDb, admin: Option<AdminSetup<'_>>) -> Result<(), EmptyUserDb> {
    if userdb.size() > 0 {
        return Ok(());
    }

    match admin {
        Some(setup) => {
            userdb.add(User::new(setup.username, setup.password, Privilege::Admin));
            Ok(())
        }
        None => Err(EmptyUserDb),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_admin_on_empty_db() {
        let mut db = UserDb::new("unused.dat");
        ensure_admin(&mut db, Some(AdminSetup { username: "alice", password: "hunter2" })).unwrap();

        let user = db.lookup("alice").unwrap();
        assert_eq!(user.privilege, Privilege::Admin);
        assert!(user.check_password("hunter2"));
    }

    #[test]
    fn leaves_existing_db_untouched() {
        let mut db = UserDb::new("unused.dat");
        db.create_user("bob", "swordfish", Privilege::User);
        ensure_admin(&mut db, Some(AdminSetup { username: "alice", password: "hunter2" })).unwrap();

        assert_eq!(db.size(), 1);
        assert!(db.lookup("alice").is_none());
    }

    #[test]
    fn empty_db_without_injected_admin_is_an_error() {
        let mut db = UserDb::new("unused.dat");
        assert!(ensure_admin(&mut db, None).is_err());
    }
}
