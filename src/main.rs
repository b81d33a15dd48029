use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "sportshub")]
#[command(version, about = "SportsHub sporting-goods store back-end")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and store event socket
    Serve {
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
        /// Interface to bind
        #[arg(long)]
        host: Option<String>,
        /// SQLite database file
        #[arg(long)]
        db_path: Option<PathBuf>,
        /// Development mode (permissive CORS for a separately served frontend)
        #[arg(long)]
        dev: bool,
        /// Config file (defaults to ./sportshub.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Create or migrate the database, then exit
    InitDb {
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Grant the admin role to an existing account
    Promote {
        #[arg(long)]
        email: String,
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            db_path,
            dev,
            config,
        } => {
            cmd::cmd_serve(
                config.as_deref(),
                sportshub::config::CliOverrides {
                    host,
                    port,
                    db_path,
                    dev,
                },
            )
            .await?;
        }
        Commands::InitDb { db_path } => cmd::cmd_init_db(db_path)?,
        Commands::Promote { email, db_path } => cmd::cmd_promote(&email, db_path)?,
    }

    Ok(())
}
