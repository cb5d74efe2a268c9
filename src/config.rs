//! This module provides functionality for loading and handling the service configuration.
//!
//! It defines the `FinChatConfig` struct, which holds the configuration parameters,
//! and a `load_config` function to load the configuration from a YAML file.
//!
//! Only the chat API fields are required; everything else falls back to the
//! defaults the service ships with.
//!
//! # Examples
//!
//! ```no_run
//! use fin_chat::config::{FinChatConfig, load_config};
//!
//! let config: FinChatConfig = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config.listen_addr());
//! ```

use serde::{Deserialize, Serialize};
use std::{error::Error, fs, path::PathBuf, time::Duration};

use tracing::*;

use crate::vector_store::DEFAULT_DOCUMENTS;

/// Longest accepted `token_ttl_secs`: ten years.
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Represents the service configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct FinChatConfig {
    /// The API key used to authenticate requests to the chat API.
    pub api_key: String,

    /// The base URL of the OpenAI-compatible chat API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// The name of the model to be used for generating responses.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed to call the service from a browser.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// HMAC secret for access tokens. A random one is generated at startup when unset.
    #[serde(default)]
    pub signing_secret: Option<String>,

    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,

    /// Upper bound on a single chat completion call. `None` waits indefinitely.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: Option<u64>,

    /// Hugging Face repository of the sentence embedding model.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Local directory holding `config.json`, `tokenizer.json` and `model.safetensors`.
    #[serde(default)]
    pub model_dir: Option<PathBuf>,

    /// Prompt template file; the built-in financial assistant prompt is used when unset.
    #[serde(default)]
    pub template: Option<PathBuf>,

    // Retrieval corpus, in index order
    #[serde(default = "default_documents")]
    pub documents: Vec<String>,
}

fn default_api_base() -> String {
    "https://api.mistral.ai/v1".to_string()
}

fn default_model() -> String {
    "mistral-large-latest".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_token_ttl_secs() -> u64 {
    3600
}

fn default_request_timeout_secs() -> Option<u64> {
    Some(60)
}

fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_documents() -> Vec<String> {
    DEFAULT_DOCUMENTS.iter().map(|d| d.to_string()).collect()
}

impl FinChatConfig {
    /// A configuration with every default applied and the given API key.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: default_api_base(),
            model: default_model(),
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
            signing_secret: None,
            token_ttl_secs: default_token_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            embedding_model: default_embedding_model(),
            model_dir: None,
            template: None,
            documents: default_documents(),
        }
    }

    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Lifetime of issued access tokens.
    ///
    /// # Errors
    /// Returns an error if `token_ttl_secs` is zero or above [`MAX_TOKEN_TTL_SECS`].
    pub fn token_ttl(&self) -> Result<chrono::Duration, Box<dyn Error>> {
        if self.token_ttl_secs == 0 || self.token_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(format!(
                "config: `token_ttl_secs` must be between 1 and {MAX_TOKEN_TTL_SECS}"
            )
            .into());
        }
        let secs = i64::try_from(self.token_ttl_secs)?;
        chrono::Duration::try_seconds(secs)
            .ok_or_else(|| "config: `token_ttl_secs` out of range".into())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Reject configurations the service cannot start with.
    pub fn validate(&self) -> Result<(), Box<dyn Error>> {
        if self.documents.is_empty() {
            return Err("config: `documents` must contain at least one entry".into());
        }
        self.token_ttl()?;
        if let Some(secret) = &self.signing_secret {
            if secret.is_empty() {
                return Err("config: `signing_secret` must not be empty when set".into());
            }
        }
        Ok(())
    }
}

/// Loads the service configuration from a YAML file.
///
/// # Errors
/// Returns an error if the file cannot be read, the YAML does not parse, or the
/// resulting configuration fails [`FinChatConfig::validate`].
pub fn load_config(file: &str) -> Result<FinChatConfig, Box<dyn Error>> {
    debug!("Loading config from: {}", file);
    let content = fs::read_to_string(file)?;
    let config: FinChatConfig = serde_yaml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
