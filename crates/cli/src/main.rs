//! docbus CLI - runs a persistor on an in-process cluster and bus.
//!
//! Modes:
//! - **Pipe mode**: `docbus [flags]` - one JSON request per stdin line
//! - **Shell mode**: `docbus [flags] send '<json>'` - single request, exit
//! - **Setup**: `docbus setup` - write the default config file
//!
//! Logging goes to stderr and honours `RUST_LOG` (default `info`).

mod commands;
mod format;
mod pipe;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use tokio::io::BufReader;

use docbus_engine::{PersistorConfig, CONFIG_FILE_NAME};
use docbus_executor::{EventBus, Persistor};
use docbus_storage::MemoryCluster;

use commands::build_cli;
use format::{format_reply, is_ok, OutputMode};

#[tokio::main]
async fn main() {
    let ansi = std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let matches = build_cli().get_matches();
    match run(&matches).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("(error) {:#}", e);
            process::exit(1);
        }
    }
}

async fn run(matches: &clap::ArgMatches) -> anyhow::Result<i32> {
    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from);

    if matches.subcommand_name() == Some("setup") {
        let path = config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        PersistorConfig::write_default_if_missing(&path)?;
        eprintln!("Config ready at {}", path.display());
        return Ok(0);
    }

    let config = load_config(config_path.as_deref(), matches)?;
    let mode = if matches.get_flag("pretty") {
        OutputMode::Pretty
    } else {
        OutputMode::Line
    };

    let nodes = matches.get_one::<u32>("nodes").copied().unwrap_or(1);
    let mut cluster = MemoryCluster::new().with_nodes(nodes);
    if !config.init {
        // Without provisioning the bucket must already exist.
        cluster = cluster.with_bucket(config.bucket_descriptor());
    }

    let bus = EventBus::new();
    let persistor = Persistor::start(&config, &cluster, &bus)
        .await
        .context("failed to start persistor")?;

    let code = match matches.subcommand() {
        Some(("send", sub)) => {
            let line = sub
                .get_one::<String>("request")
                .map(String::as_str)
                .unwrap_or_default();
            let reply = pipe::send_line(&bus, persistor.address(), line).await;
            println!("{}", format_reply(&reply, mode));
            if is_ok(&reply) {
                0
            } else {
                1
            }
        }
        _ => {
            let stdin = BufReader::new(tokio::io::stdin());
            pipe::run_pipe(stdin, &bus, persistor.address(), mode).await
        }
    };

    persistor.stop().await;
    Ok(code)
}

/// Explicit `--config` must exist; otherwise `docbus.toml` is used when
/// present and built-in defaults when not. Flags override the file.
fn load_config(path: Option<&Path>, matches: &clap::ArgMatches) -> anyhow::Result<PersistorConfig> {
    let mut config = match path {
        Some(path) => PersistorConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None if Path::new(CONFIG_FILE_NAME).exists() => {
            PersistorConfig::from_file(Path::new(CONFIG_FILE_NAME))?
        }
        None => PersistorConfig::default(),
    };
    if let Some(address) = matches.get_one::<String>("address") {
        config.address = address.clone();
    }
    if matches.get_flag("init") {
        config.init = true;
    }
    config.validate()?;
    Ok(config)
}
