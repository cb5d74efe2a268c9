//! Main module for the Fin Chat service (finchat).
//!
//! Parses the command line, loads the configuration and dispatches to the
//! requested subcommand.
//!
//! # Examples
//!
//! ```sh
//! finchat init
//! finchat serve --port 5000
//! finchat token alice
//! ```

use clap::Parser;
use fin_chat::{
    auth::{SigningSecret, TokenService},
    commands::{Cli, Commands},
    config::{self, FinChatConfig},
    config_dir, init_tracing, server,
    template::{DEFAULT_TEMPLATE_NAME, PromptTemplate, template_path},
};
use std::{error::Error, fs, path::PathBuf};
use tracing::{debug, info};

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

/// Load configuration and execute the parsed command.
async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            debug!("Initializing configuration");
            init()
        }
        Commands::Serve {
            host,
            port,
            api_key,
        } => {
            let mut config = load(cli.config)?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(api_key) = api_key {
                config.api_key = api_key;
            }

            let state = fin_chat::build_state(&config).await?;
            let router = server::router(state, &config.allowed_origins);
            server::serve(router, &config.listen_addr()).await
        }
        Commands::Token { username } => {
            let config = load(cli.config)?;
            let secret = config
                .signing_secret
                .as_deref()
                .ok_or("`signing_secret` must be set in the config to mint tokens offline")?;
            let ttl = config.token_ttl()?;
            let tokens = TokenService::new(SigningSecret::from_config(secret), ttl);
            println!("{}", tokens.issue(&username)?);
            Ok(())
        }
    }
}

fn load(path: Option<PathBuf>) -> Result<FinChatConfig, Box<dyn Error>> {
    let path = match path {
        Some(path) => path,
        None => config_dir()?.join("config.yaml"),
    };
    debug!("Loading config from: {}", path.display());
    config::load_config(&path.to_string_lossy())
}

/// Write a default `config.yaml` and prompt template under the config directory.
///
/// Existing files are left untouched.
fn init() -> Result<(), Box<dyn Error>> {
    let config_dir = config_dir()?;
    let template_path = template_path(DEFAULT_TEMPLATE_NAME)?;
    if let Some(templates_dir) = template_path.parent() {
        info!("Creating template directory: {}", templates_dir.display());
        fs::create_dir_all(templates_dir)?;
    }

    if template_path.exists() {
        info!("Template already exists: {}", template_path.display());
    } else {
        info!("Creating template file: {}", template_path.display());
        fs::write(&template_path, serde_yaml::to_string(&PromptTemplate::default())?)?;
    }

    let config_path = config_dir.join("config.yaml");
    if config_path.exists() {
        info!("Config already exists: {}", config_path.display());
    } else {
        info!("Creating config file: {}", config_path.display());
        let mut config = FinChatConfig::with_api_key("CHANGEME");
        config.template = Some(template_path);
        fs::write(config_path, serde_yaml::to_string(&config)?)?;
    }

    Ok(())
}
