//! CLI command implementations.
//!
//! | Module  | Commands handled      |
//! |---------|-----------------------|
//! | `serve` | `Serve`               |
//! | `db`    | `InitDb`, `Promote`   |

pub mod db;
pub mod serve;

pub use db::{cmd_init_db, cmd_promote};
pub use serve::cmd_serve;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sportshub::config::{CliOverrides, ShopConfig};

/// Resolve settings through every layer: file, environment, then CLI.
pub(crate) fn resolve_config(config_path: Option<&Path>, cli: CliOverrides) -> Result<ShopConfig> {
    let cwd: PathBuf = std::env::current_dir().context("Failed to get current directory")?;
    let mut config = ShopConfig::load_or_default(config_path, &cwd)?;
    config.apply_env()?;
    config.apply_cli(cli);
    Ok(config)
}
