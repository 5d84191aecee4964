//! Object instances and object classes (spec §3 "Object instance"/"Object
//! class", §9 "Dynamic dispatch over hooks").
//!
//! An object class is supplied by the world module and resolved at
//! load-time from a name to an `Arc<dyn ObjectClass>`; an instance keeps
//! that `Arc` plus its own small bit of state. Hooks follow the
//! null-means-default convention from spec §9 by being ordinary trait
//! methods with permissive default bodies -- a world module only overrides
//! the ones it actually needs to veto or customize.

use std::io;
use std::sync::Arc;

/// The capability set a world module attaches to a class of objects.
///
/// `take`/`drop` return `false` to veto the transfer; a class that doesn't
/// override them allows everything, matching the "null hook means default
/// permissive behavior" rule.
pub trait ObjectClass: Send + Sync {
    fn class_name(&self) -> &str;

    fn serialize(&self, _payload: &[u8], _writer: &mut dyn io::Write) -> io::Result<()> {
        Ok(())
    }

    fn deserialize(&self, _reader: &mut dyn io::Read) -> io::Result<Vec<u8>> {
        Ok(Vec::new())
    }

    /// Called before an instance moves from a room into a user's inventory.
    fn take(&self, _instance: &ObjectInstance, _user: &str) -> bool {
        true
    }

    /// Called before an instance moves from a user's inventory into a room.
    fn drop(&self, _instance: &ObjectInstance, _user: &str) -> bool {
        true
    }

    fn clone_payload(&self, payload: &[u8]) -> Vec<u8> {
        payload.to_vec()
    }

    fn destroy(&self, _instance: &mut ObjectInstance) {}

    /// Human-readable description shown by `LOOKAT`.
    fn describe(&self, instance: &ObjectInstance, _user: &str) -> String {
        instance.name.clone()
    }
}

/// A concrete object living in exactly one container (a room's multimap or
/// a user's inventory) at a time. Moving one is "clone then remove" (spec
/// §9 "Transfer semantics") -- identity does not survive a move.
#[derive(Clone)]
pub struct ObjectInstance {
    pub name: String,
    pub class: Arc<dyn ObjectClass>,
    pub default_article: bool,
    pub hidden: bool,
    pub list: bool,
    pub payload: Vec<u8>,
}

impl ObjectInstance {
    pub fn new(name: impl Into<String>, class: Arc<dyn ObjectClass>) -> ObjectInstance {
        ObjectInstance {
            name: name.into(),
            class,
            default_article: false,
            hidden: false,
            list: true,
            payload: Vec::new(),
        }
    }

    #[inline]
    pub fn can_take(&self, user: &str) -> bool {
        self.class.take(self, user)
    }

    #[inline]
    pub fn can_drop(&self, user: &str) -> bool {
        self.class.drop(self, user)
    }

    #[inline]
    pub fn describe(&self, user: &str) -> String {
        self.class.describe(self, user)
    }

    /// Produces a duplicate with its own cloned payload -- used by `TAKE`/`DROP`,
    /// which transfer by clone-then-remove rather than by pointer move.
    pub fn duplicate(&self) -> ObjectInstance {
        ObjectInstance {
            name: self.name.clone(),
            class: self.class.clone(),
            default_article: self.default_article,
            hidden: self.hidden,
            list: self.list,
            payload: self.class.clone_payload(&self.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PlainClass;
    impl ObjectClass for PlainClass {
        fn class_name(&self) -> &str {
            "plain"
        }
    }

    struct NoTakeClass;
    impl ObjectClass for NoTakeClass {
        fn class_name(&self) -> &str {
            "fixed"
        }
        fn take(&self, _instance: &ObjectInstance, _user: &str) -> bool {
            false
        }
    }

    #[test]
    fn default_hooks_are_permissive() {
        let obj = ObjectInstance::new("lamp", Arc::new(PlainClass));
        assert!(obj.can_take("alice"));
        assert!(obj.can_drop("alice"));
        assert_eq!(obj.describe("alice"), "lamp");
    }

    #[test]
    fn class_can_veto_take() {
        let obj = ObjectInstance::new("pillar", Arc::new(NoTakeClass));
        assert!(!obj.can_take("alice"));
    }

    #[test]
    fn duplicate_preserves_fields_but_not_identity() {
        let mut obj = ObjectInstance::new("lamp", Arc::new(PlainClass));
        obj.payload = vec![1, 2, 3];

        let dup = obj.duplicate();
        assert_eq!(dup.name, obj.name);
        assert_eq!(dup.payload, obj.payload);
    }
}
