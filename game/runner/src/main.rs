//! CLI entry point: argument parsing, config/world/user-db loading, and
//! handing the assembled `Server` to the event loop.

use anyhow::{Context, Result};
use clap::{App, Arg};
use gamecore::config::ServerConfig;
use gamecore::firstrun::{self, AdminSetup};
use gamecore::persist;
use gamecore::server::{ModuleSource, Server, World};
use std::path::Path;

fn main() -> Result<()> {
    let matches = App::new("gamerunner")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Runs the MUD server.")
        .arg(Arg::with_name("CONFIG").short("c").long("config").takes_value(true).help("Path to a TOML config file"))
        .arg(Arg::with_name("PORT").short("p").long("port").takes_value(true).help("Listen port"))
        .arg(Arg::with_name("PREFIX").short("d").long("data-dir").takes_value(true).help("Create and chdir into this data directory before opening WORLDFILE/USERFILE"))
        .arg(Arg::with_name("MODULE").short("w").long("world-module").takes_value(true).help("Path to a dynamic world module"))
        .arg(Arg::with_name("ADMIN").short("a").long("admin").takes_value(true).number_of_values(2).value_names(&["USER", "PASS"]).help("Non-interactive first-run admin setup"))
        .get_matches();

    let mut config = match matches.value_of("CONFIG") {
        Some(path) => ServerConfig::load(path),
        None => ServerConfig::default(),
    };

    if let Some(port) = matches.value_of("PORT") {
        config.port = port.parse().context("-p PORT must be a valid port number")?;
    }
    if let Some(module) = matches.value_of("MODULE") {
        config.world_module = Some(module.to_string());
    }
    if let Some(prefix) = matches.value_of("PREFIX") {
        std::fs::create_dir_all(prefix).with_context(|| format!("creating data directory {}", prefix))?;
        std::env::set_current_dir(prefix).with_context(|| format!("entering data directory {}", prefix))?;
        config.data_prefix = None;
    }

    let log = flux::logging::init("info");

    let source = match &config.world_module {
        Some(path) => unsafe {
            ModuleSource::load_dynamic(Path::new(path)).with_context(|| format!("loading world module {}", path))?
        },
        None => ModuleSource::Static(Box::new(basicworld::BasicWorld)),
    };
    let mut world = World::new(source);

    persist::load_world(&config.worldfile_path(), &mut world).context("loading world file")?;
    let mut userdb = persist::load_users(&config.userfile_path(), &world).context("loading user database")?;

    let admin = match matches.values_of("ADMIN") {
        Some(mut values) => {
            let username = values.next().expect("number_of_values(2)");
            let password = values.next().expect("number_of_values(2)");
            Some(AdminSetup { username, password })
        }
        None => None,
    };
    firstrun::ensure_admin(&mut userdb, admin).context("first-run admin setup")?;

    let mut server = Server::new(config, world, userdb, log);
    gamecore::listener::run(&mut server).context("server event loop")?;

    Ok(())
}
