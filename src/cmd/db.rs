//! Database maintenance commands: `init-db` and `promote`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use sportshub::config::CliOverrides;
use sportshub::shop::server::open_database;
use sportshub_common::Role;

use super::resolve_config;

fn db_path(cli_path: Option<PathBuf>) -> Result<PathBuf> {
    let config = resolve_config(
        None,
        CliOverrides {
            db_path: cli_path,
            ..Default::default()
        },
    )?;
    Ok(config.server.db_path)
}

pub fn cmd_init_db(cli_path: Option<PathBuf>) -> Result<()> {
    let path = db_path(cli_path)?;
    open_database(&path)?;
    println!("Shop database initialized at {}", path.display());
    Ok(())
}

pub fn cmd_promote(email: &str, cli_path: Option<PathBuf>) -> Result<()> {
    let path = db_path(cli_path)?;
    if !path.exists() {
        anyhow::bail!(
            "No database at {}. Run 'sportshub init-db' first.",
            path.display()
        );
    }
    let db = open_database(&path)?;
    let user = db
        .set_role_by_email(email, Role::Admin)
        .with_context(|| format!("Failed to promote {}", email))?;
    println!("{} <{}> is now an admin", user.name, user.email);
    Ok(())
}
