//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod model_list;

use std::error::Error;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::auth::{interactive_auth, interactive_deauth, AuthManager};
use crate::cli::model_list::list_models;
use crate::core::config::Config;
use crate::platform::http::HttpPlatform;
use crate::platform::PlatformAuth;
use crate::ui::chat_loop::run_chat;

#[derive(Parser)]
#[command(name = "palabre")]
#[command(about = "A terminal chat client for AI platform gateways")]
#[command(
    long_about = "Palabre is a line-oriented terminal chat client that talks to an AI platform \
gateway. It streams responses word by word and keeps multiple conversations \
in a single session.\n\n\
Authentication:\n\
  Use 'palabre auth' to verify a gateway token and store it securely in your\n\
  system keyring.\n\n\
Environment Variables (fallback if no auth configured):\n\
  PALABRE_TOKEN      Gateway access token\n\
  PALABRE_BASE_URL   Gateway base URL (optional, defaults to\n\
                     https://gateway.permacommons.org/api)\n\n\
In a session:\n\
  Type               Enter your message at the prompt\n\
  /model <id>        Switch models mid-conversation\n\
  /help              List all session commands"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to chat with, or list available models if no model specified
    #[arg(
        short = 'm',
        long,
        global = true,
        value_name = "MODEL",
        num_args = 0..=1,
        default_missing_value = ""
    )]
    pub model: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Verify a gateway token and store it in the system keyring
    Auth,
    /// Sign out and remove the stored gateway token
    Deauth,
    /// Start an interactive chat session (default)
    Chat,
    /// List the built-in models
    Models,
    /// Show the account the stored token belongs to
    Whoami,
    /// Set a configuration value
    Set {
        /// Configuration key (default-model, base-url, words-per-chunk, chunk-interval-ms)
        key: String,
        /// Value to set
        value: String,
    },
    /// Remove a configuration value
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Auth => {
            let config = Config::load()?;
            let auth_manager = AuthManager::new();
            if let Err(e) = interactive_auth(&auth_manager, &config.effective_base_url()).await {
                eprintln!("❌ Authentication failed: {e}");
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Deauth => {
            let config = Config::load()?;
            let auth_manager = AuthManager::new();
            if let Err(e) = interactive_deauth(&auth_manager, &config.effective_base_url()).await {
                eprintln!("❌ Deauthentication failed: {e}");
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Models => {
            list_models();
            Ok(())
        }
        Commands::Whoami => whoami().await,
        Commands::Set { key, value } => {
            let mut config = Config::load()?;
            match config.set_value(&key, &value) {
                Ok(()) => {
                    config.save()?;
                    println!("✅ Set {key} to: {value}");
                }
                Err(message) => {
                    eprintln!("❌ {message}");
                    std::process::exit(1);
                }
            }
            Ok(())
        }
        Commands::Unset { key } => {
            let mut config = Config::load()?;
            match config.unset_value(&key) {
                Ok(()) => {
                    config.save()?;
                    println!("✅ Unset {key}");
                }
                Err(message) => {
                    eprintln!("❌ {message}");
                    std::process::exit(1);
                }
            }
            Ok(())
        }
        Commands::Chat => {
            let mut config = Config::load()?;
            match args.model.as_deref() {
                // Bare `-m` means "show me what I can pick from"
                Some("") => {
                    list_models();
                    Ok(())
                }
                Some(model) => {
                    config.default_model = Some(model.to_string());
                    run_chat(config).await
                }
                None => run_chat(config).await,
            }
        }
    }
}

async fn whoami() -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let auth_manager = AuthManager::new();

    let Some(token) = auth_manager.resolve_token() else {
        println!("Not signed in. Run 'palabre auth' first.");
        return Ok(());
    };

    let platform = HttpPlatform::new(&config.effective_base_url(), token);
    match platform.whoami().await? {
        Some(user) => match &user.email {
            Some(email) => println!("Signed in as {} <{}>.", user.username, email),
            None => println!("Signed in as {}.", user.username),
        },
        None => {
            println!("The gateway rejected the stored token. Run 'palabre auth' to sign in again.")
        }
    }
    Ok(())
}
