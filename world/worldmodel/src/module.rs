//! World-module interface (C9): the symbol contract a pluggable world
//! supplies, either linked in directly (a `Box<dyn WorldModule>` built in
//! process) or loaded from a `cdylib` at a fixed symbol name.
//!
//! Grounded on `neutronium`'s own choice of `crate-type = ["dylib"]` for
//! pluggable engine code; `neutronium` itself is always a path dependency
//! rather than something resolved at runtime, so the loader below has no
//! direct precedent elsewhere in this workspace and is the one genuinely
//! new piece of machinery in this crate -- see DESIGN.md.

use crate::object::ObjectClass;
use crate::room::{Room, VerbHandler};
use std::io;
use std::sync::Arc;
use std::time::Duration;

pub trait SimulationContext {
    fn rooms_mut(&mut self) -> &mut [Room];
}

pub trait SimulationCallback: Send + Sync {
    fn tick(&self, ctx: &mut dyn SimulationContext);
}

/// Symbol contract a world module fulfils (spec §4.9).
pub trait WorldModule: Send + Sync {
    fn world_name(&self) -> &str;

    fn object_classes(&self) -> Vec<Arc<dyn ObjectClass>>;

    /// Global verb map: word -> handler, checked after a room's own map
    /// (spec §3 "Verb").
    fn verb_classes(&self) -> Vec<(String, Arc<dyn VerbHandler>)>;

    fn initial_rooms(&self) -> Vec<Room>;

    /// `Some((interval, callback))` if the module wants a simulation tick;
    /// the interval is only meaningful together with the callback, so
    /// they're bundled rather than two independently-optional fields.
    fn simulation(&self) -> Option<(Duration, Arc<dyn SimulationCallback>)> {
        None
    }

    fn serialize_user_payload(&self, _payload: &[u8], _writer: &mut dyn io::Write) -> io::Result<()> {
        Ok(())
    }

    fn deserialize_user_payload(&self, _reader: &mut dyn io::Read) -> io::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

#[cfg(feature = "dylib-loader")]
pub mod dylib {
    use super::WorldModule;
    use libloading::{Library, Symbol};
    use std::path::Path;

    /// Fixed symbol every dynamically loaded world module must export.
    pub const WORLD_MODULE_SYMBOL: &[u8] = b"mud_world_module";

    pub type WorldModuleConstructor = unsafe extern "C" fn() -> Box<dyn WorldModule>;

    /// Owns both the loaded module and the library it came from. `module`
    /// is declared before `_library` so it drops first -- the module must
    /// not outlive the code it points into.
    pub struct WorldModuleHandle {
        module: Box<dyn WorldModule>,
        _library: Library,
    }

    impl WorldModuleHandle {
        /// Loads a world module from a `cdylib` at `path` and invokes its
        /// `mud_world_module` constructor.
        ///
        /// # Safety
        /// The library must actually export a `mud_world_module` symbol with
        /// the exact signature above; a mismatched ABI is undefined behavior,
        /// same caveat as any `dlopen`-based plugin system.
        pub unsafe fn load(path: &Path) -> Result<WorldModuleHandle, libloading::Error> {
            let library = Library::new(path)?;
            let module = {
                let constructor: Symbol<WorldModuleConstructor> = library.get(WORLD_MODULE_SYMBOL)?;
                constructor()
            };

            Ok(WorldModuleHandle { module, _library: library })
        }

        pub fn module(&self) -> &dyn WorldModule {
            self.module.as_ref()
        }
    }
}
