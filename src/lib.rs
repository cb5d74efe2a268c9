//! # Fin Chat (library root)
//!
//! A small retrieval-augmented financial assistant:
//! - Short-lived bearer tokens for a username (`auth`).
//! - Sentence embeddings and nearest-document lookup over a fixed corpus
//!   (`embeddings`, `vector_store`).
//! - Request composition and the OpenAI-compatible chat client (`api`, `template`).
//! - One authenticated WebSocket session per connection (`session`, `server`).
//! - CLI parsing & configuration (`commands`, `config`).
//!
//! Everything a session needs is built once at startup by [`build_state`] and
//! shared read-only afterwards.
//!
//! ## Modules
//! - [`api`], [`auth`], [`commands`], [`config`], [`embeddings`], [`errors`],
//!   [`server`], [`session`], [`template`], [`vector_store`]

use directories::ProjectDirs;
use once_cell::sync::OnceCell;
use std::{error::Error, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

pub mod api;
pub mod auth;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod server;
pub mod session;
pub mod template;
pub mod vector_store;

#[cfg(test)]
pub(crate) mod testing;

use crate::{
    api::{OpenAiChat, ResponseGenerator},
    auth::{SigningSecret, TokenService},
    config::FinChatConfig,
    embeddings::SentenceEmbeddingsModel,
    server::AppState,
    template::{PromptTemplate, load_template},
    vector_store::KnowledgeBase,
};

static TRACING: OnceCell<()> = OnceCell::new();

/// Install the global `tracing` subscriber once. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,fin_chat=debug,tower_http=info"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

/// Return the per-platform configuration directory used by Fin Chat.
///
/// The directory is **not** created by this function.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be determined.
pub fn config_dir() -> Result<std::path::PathBuf, Box<dyn Error>> {
    let proj_dirs = ProjectDirs::from("com", "fin-chat", "finchat")
        .ok_or("Unable to determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}

/// Build the shared state: signing secret, embedding model, indexed corpus and chat client.
///
/// Loading the embedding model blocks, so it runs on the blocking pool.
pub async fn build_state(config: &FinChatConfig) -> Result<AppState, Box<dyn Error>> {
    config.validate()?;

    let secret = match &config.signing_secret {
        Some(secret) => SigningSecret::from_config(secret),
        None => {
            info!("No signing_secret configured, generated one for this process");
            SigningSecret::generate()
        }
    };
    let ttl = config.token_ttl()?;
    let tokens = Arc::new(TokenService::new(secret, ttl));

    let template = match &config.template {
        Some(path) => load_template(path)?,
        None => PromptTemplate::default(),
    };

    let model_id = config.embedding_model.clone();
    let model_dir = config.model_dir.clone();
    let documents = config.documents.clone();
    let knowledge = tokio::task::spawn_blocking(move || {
        let model = SentenceEmbeddingsModel::load(&model_id, model_dir.as_deref())?;
        KnowledgeBase::build(documents, Arc::new(model))
    })
    .await?
    .map_err(|e| -> Box<dyn Error> { e })?;
    info!("Indexed {} documents", knowledge.len());

    let generator = Arc::new(ResponseGenerator::new(
        Arc::new(knowledge),
        Arc::new(OpenAiChat::from_config(config)),
        template,
        config.request_timeout(),
    ));

    Ok(AppState { tokens, generator })
}
