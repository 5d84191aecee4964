//! Server configuration, loaded from a TOML file and overridable by CLI
//! flags.
//!
//! `-p`/`-d`/`-w`/`-a` CLI flags (parsed in `gamerunner`) take precedence
//! over whatever a `-c` config file supplies.

use serde_derive::{Deserialize, Serialize};
use std::path::Path;

/// Default listen port for line-based ASCII over a single TCP socket.
pub const DEFAULT_PORT: u16 = 1234;

/// Number of world-mutating operations between automatic saves.
pub const DEFAULT_SAVE_INTERVAL: u64 = 10;

const DEFAULT_MAX_CLIENTS: u16 = 256;
const DEFAULT_WORLDFILE: &str = "WORLDFILE";
const DEFAULT_USERFILE: &str = "USERFILE";

#[derive(Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Directory `-d` creates (if missing) and chdirs into before opening
    /// `WORLDFILE`/`USERFILE`.
    pub data_prefix: Option<String>,
    /// Path to a world module `cdylib`; `None` means the in-process default
    /// world (`basicworld`) is used instead.
    pub world_module: Option<String>,
    pub max_clients: u16,
    pub save_interval: u64,
    pub worldfile_name: String,
    pub userfile_name: String,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            port: DEFAULT_PORT,
            data_prefix: None,
            world_module: None,
            max_clients: DEFAULT_MAX_CLIENTS,
            save_interval: DEFAULT_SAVE_INTERVAL,
            worldfile_name: DEFAULT_WORLDFILE.to_string(),
            userfile_name: DEFAULT_USERFILE.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> ServerConfig {
        serdeconv::from_toml_file(path).expect("Error loading server configuration file")
    }

    pub fn worldfile_path(&self) -> std::path::PathBuf {
        self.data_dir().join(&self.worldfile_name)
    }

    pub fn userfile_path(&self) -> std::path::PathBuf {
        self.data_dir().join(&self.userfile_name)
    }

    fn data_dir(&self) -> std::path::PathBuf {
        match &self.data_prefix {
            Some(prefix) => std::path::PathBuf::from(prefix),
            None => std::path::PathBuf::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_1234() {
        assert_eq!(ServerConfig::default().port, 1234);
    }

    #[test]
    fn file_paths_are_relative_to_data_prefix() {
        let mut config = ServerConfig::default();
        config.data_prefix = Some("data".to_string());
        assert_eq!(config.worldfile_path(), Path::new("data/WORLDFILE"));
        assert_eq!(config.userfile_path(), Path::new("data/USERFILE"));
    }
}
