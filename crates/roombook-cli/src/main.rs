//! Roombook - directory authentication check tool
//!
//! Loads the Roombook configuration and runs logins and identity lookups
//! against the configured LDAP servers.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use roombook_auth::{LdapAuthProvider, StaticDefaults};
use roombook_core::RoombookConfig;
use tracing::info;

#[derive(Parser)]
#[command(name = "roombook")]
#[command(author = "Roombook Team")]
#[command(version = roombook_core::VERSION)]
#[command(about = "Check Roombook LDAP authentication", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, env = "ROOMBOOK_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "ROOMBOOK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit LDAP debug lines
    #[arg(long, global = true)]
    ldap_debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a username and password, then print the identity
    Login {
        username: String,

        #[arg(long, env = "ROOMBOOK_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Print the identity of a user without logging in
    User { username: String },

    /// List the configured directory servers in lookup order
    Servers,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = RoombookConfig::load(cli.config.as_deref())?;

    // Override with CLI args
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.ldap_debug {
        config.ldap.debug = true;
        config.logging.level = "debug".to_string();
    }

    roombook_core::logging::init(&config.logging)?;

    if let Commands::Version = cli.command {
        println!("roombook {}", roombook_core::VERSION);
        return Ok(());
    }

    let defaults = Arc::new(StaticDefaults::new(&config.auth));
    let provider = LdapAuthProvider::new(&config.ldap, defaults)?;

    match cli.command {
        Commands::Login { username, password } => {
            let Some(valid) = provider.validate_user(&username, &password).await else {
                anyhow::bail!("Login rejected for {}", username);
            };
            info!("Login accepted for {}", valid);
            print_json(&provider.get_user(&valid).await)?;
        }
        Commands::User { username } => {
            print_json(&provider.get_user(&username).await)?;
        }
        Commands::Servers => {
            for server in provider.client().servers() {
                println!(
                    "{}\t{}\t{}",
                    server.index,
                    server.url(),
                    server.base_dn.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Version => {}
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
