//! # Prompt template
//!
//! A template is a small YAML document that decides how a retrieval-augmented
//! request is worded:
//! - a `system_prompt` establishing the assistant's persona,
//! - a `context_prefix` placed in front of the retrieved document in the second
//!   system message,
//! - a `fallback_response` sent to the client whenever generation fails.
//!
//! Templates live under the configuration directory by convention:
//!
//! ```text
//! <config_dir>/templates/<name>.yaml
//! ```
//!
//! ## Minimal YAML example
//!
//! ```yaml
//! system_prompt: "You are a financial assistant. Always provide accurate, professional responses."
//! context_prefix: "Relevant financial document: "
//! fallback_response: "I'm having trouble processing your request."
//! ```

use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
};

/// Name of the template written by `finchat init`.
pub const DEFAULT_TEMPLATE_NAME: &str = "financial_assistant";

/// Wording of every generation request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PromptTemplate {
    /// Persona instruction, always the first message.
    pub system_prompt: String,

    /// Text placed before the retrieved document in the context message.
    pub context_prefix: String,

    /// Reply sent when the chat backend fails or retrieval errors out.
    pub fallback_response: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system_prompt:
                "You are a financial assistant. Always provide accurate, professional responses."
                    .to_string(),
            context_prefix: "Relevant financial document: ".to_string(),
            fallback_response: "I'm having trouble processing your request.".to_string(),
        }
    }
}

impl PromptTemplate {
    /// Content of the second system message for a retrieved document.
    pub fn context_message(&self, document: &str) -> String {
        format!("{}{}", self.context_prefix, document)
    }
}

/// Path of a named template under the user's config directory.
pub fn template_path(name: &str) -> Result<PathBuf, Box<dyn Error>> {
    Ok(crate::config_dir()?.join(format!("templates/{name}.yaml")))
}

/// Load a prompt template from a YAML file.
///
/// ### Errors
/// Returns an error if the file does not exist or cannot be read, or if the YAML
/// content cannot be deserialized into a `PromptTemplate`, or if its
/// `fallback_response` is blank.
pub fn load_template(path: &Path) -> Result<PromptTemplate, Box<dyn Error>> {
    tracing::info!("Loading template: {}", path.display());

    let content = fs::read_to_string(path)?;
    let template: PromptTemplate = serde_yaml::from_str(&content)?;
    if template.fallback_response.trim().is_empty() {
        return Err("template: `fallback_response` must not be blank".into());
    }
    Ok(template)
}
