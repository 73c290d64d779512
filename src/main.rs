use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use tracing::info;

use solar_switch::config::Config;
use solar_switch::error::ConfigError;
use solar_switch::run_loop::RunLoop;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("solar_switch.json"));

    // A broken config is the only fatal error; everything past startup is
    // logged and survived.
    let config = Config::load(&config_path)?;
    init_logging(&config)?;

    info!(config = %config_path.display(), "starting solar threshold switch");
    let mut run_loop = RunLoop::new(&config)?;

    tokio::select! {
        _ = run_loop.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, exiting gracefully");
        }
    }
    Ok(())
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let level: tracing::Level = config
        .log_level
        .parse()
        .map_err(|_| ConfigError::LogLevel(config.log_level.clone()))?;

    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_max_level(level).init();
        }
    }
    Ok(())
}
