use std::ffi::OsString;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use super::config::{ConfigError, GameConfig};

const CONFIG_ENV_VAR: &str = "SKIRMISH_CONFIG";
const CONFIG_FLAG: &str = "--config";

pub(crate) struct AppWiring {
    pub(crate) config: GameConfig,
}

pub(crate) fn build_app() -> Result<AppWiring, ConfigError> {
    init_tracing();
    info!("=== Skirmish Startup ===");

    let path = resolve_config_path(std::env::args().skip(1), std::env::var_os(CONFIG_ENV_VAR));
    let config = match &path {
        Some(path) => GameConfig::load(path)?,
        None => GameConfig::default(),
    };
    info!(
        config = ?path,
        seed = config.seed,
        players = config.scenario.players,
        target_tps = config.run.target_tps,
        max_ticks = ?config.run.max_ticks,
        "config_loaded"
    );

    Ok(AppWiring { config })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// `--config <path>` or `--config=<path>` wins over the environment.
fn resolve_config_path(
    args: impl IntoIterator<Item = String>,
    env_value: Option<OsString>,
) -> Option<PathBuf> {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == CONFIG_FLAG {
            if let Some(path) = args.next() {
                return Some(PathBuf::from(path));
            }
        } else if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    env_value
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
