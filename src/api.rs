//! # API Module
//!
//! This module handles interactions with the OpenAI-compatible chat API (Mistral by
//! default) and the retrieval-augmented request built around it.
//!
//! Every request has the same three messages, in this order:
//! 1. the template's persona system prompt,
//! 2. a system message carrying the retrieved document,
//! 3. the user's raw text, last so the API treats it as the active turn.
//!
//! [`ResponseGenerator::generate`] never fails: any retrieval or backend error is
//! logged and replaced with the template's fallback reply.
use std::{sync::Arc, time::Duration};

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use tracing::{debug, error};

use crate::{
    config::FinChatConfig,
    errors::{BoxError, GenerationError},
    template::PromptTemplate,
    vector_store::KnowledgeBase,
};

/// An external chat-completion service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send an ordered list of role-tagged messages and return the generated text.
    async fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String, BoxError>;
}

/// [`ChatBackend`] over any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChat {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChat {
    pub fn new(api_key: &str, api_base: &str, model: &str) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);
        debug!("Chat client created for {} ({})", api_base, model);
        Self {
            client: Client::with_config(openai_config),
            model: model.to_string(),
        }
    }

    pub fn from_config(config: &FinChatConfig) -> Self {
        Self::new(&config.api_key, &config.api_base, &config.model)
    }
}

#[async_trait]
impl ChatBackend for OpenAiChat {
    async fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String, BoxError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(messages)
            .build()?;

        debug!("Sending request: {:?}", request);

        let response = self.client.chat().create(request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| "No assistant response".into())
    }
}

/// Retrieves context for a query and asks the chat backend to answer it.
pub struct ResponseGenerator {
    knowledge: Arc<KnowledgeBase>,
    backend: Arc<dyn ChatBackend>,
    template: PromptTemplate,
    timeout: Option<Duration>,
}

impl ResponseGenerator {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        backend: Arc<dyn ChatBackend>,
        template: PromptTemplate,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            knowledge,
            backend,
            template,
            timeout,
        }
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// The corpus document nearest to `user_query`.
    ///
    /// Embedding is CPU bound, so it runs on the blocking pool.
    pub async fn compose_context(&self, user_query: &str) -> Result<String, GenerationError> {
        let knowledge = Arc::clone(&self.knowledge);
        let query = user_query.to_string();

        let (id, document) = tokio::task::spawn_blocking(move || {
            knowledge
                .retrieve(&query)
                .map(|(id, document)| (id, document.to_string()))
        })
        .await
        .map_err(|e| GenerationError::Retrieval(Box::new(e)))?
        .map_err(GenerationError::Retrieval)?;

        debug!("Retrieved document {} for query", id);
        Ok(document)
    }

    /// Persona prompt, retrieved context, then the user's text.
    pub fn build_messages(&self, document: &str, user_query: &str) -> Vec<ChatCompletionRequestMessage> {
        vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(
                    self.template.system_prompt.clone(),
                ),
                name: None,
            }),
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(
                    self.template.context_message(document),
                ),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(user_query.to_string()),
                name: None,
            }),
        ]
    }

    /// Answer `user_query`, or return the fallback reply on any failure.
    pub async fn generate(&self, user_query: &str) -> String {
        match self.try_generate(user_query).await {
            Ok(text) => text,
            Err(e) => {
                error!("Error fetching chat response: {}", e);
                self.template.fallback_response.clone()
            }
        }
    }

    async fn try_generate(&self, user_query: &str) -> Result<String, GenerationError> {
        let document = self.compose_context(user_query).await?;
        let messages = self.build_messages(&document, user_query);

        let call = self.backend.complete(messages);
        let text = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| GenerationError::Timeout(limit))?,
            None => call.await,
        }
        .map_err(GenerationError::Backend)?;

        if text.trim().is_empty() {
            return Err(GenerationError::Backend("blank assistant response".into()));
        }
        Ok(text)
    }
}
