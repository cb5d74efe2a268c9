//! # Session handler
//!
//! One authenticated chat session per connection. The token is checked once,
//! right after the connection is accepted; afterwards every text frame from the
//! client gets exactly one text frame back, strictly in order and one at a time.
//!
//! ```text
//! Connecting ──accept──▶ Authenticating ──verify ok──▶ Active ─┐
//!                              │                          ▲    │ text in / reply out
//!                              │ missing/invalid token    └────┘
//!                              ▼                               │ disconnect / transport error
//!                            Closed ◀──────────────────────────┘
//! ```
//!
//! The handler is transport agnostic; [`Transport`] is implemented for the axum
//! WebSocket in [`crate::server`] and for an in-memory double in tests.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::{
    api::ResponseGenerator,
    auth::TokenService,
    errors::{AuthError, BoxError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Active,
    Closed,
}

/// What the transport handed us on a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Text(String),
    /// The client went away or sent a close frame.
    Disconnected,
}

/// A bidirectional text-frame connection.
#[async_trait]
pub trait Transport: Send {
    /// Next client text frame. Other frame kinds are skipped by implementations.
    async fn recv(&mut self) -> Result<Incoming, BoxError>;

    async fn send_text(&mut self, text: String) -> Result<(), BoxError>;

    async fn close(&mut self) -> Result<(), BoxError>;
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Authentication failed; the reason was sent to the client.
    Rejected(AuthError),
    Disconnected,
    TransportError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub username: Option<String>,
    pub replies: usize,
    pub end: SessionEnd,
}

pub struct Session<T> {
    transport: T,
    state: SessionState,
    tokens: Arc<TokenService>,
    generator: Arc<ResponseGenerator>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, tokens: Arc<TokenService>, generator: Arc<ResponseGenerator>) -> Self {
        Self {
            transport,
            state: SessionState::Connecting,
            tokens,
            generator,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session until it reaches [`SessionState::Closed`].
    ///
    /// `token` is the raw connection parameter; `None` and `""` both count as missing.
    pub async fn run(&mut self, token: Option<&str>) -> SessionSummary {
        self.state = SessionState::Authenticating;

        let username = match self.authenticate(token) {
            Ok(username) => username,
            Err(reason) => {
                info!("Session rejected: {}", reason);
                if let Err(e) = self.transport.send_text(format!("Error: {reason}")).await {
                    debug!("Could not deliver rejection: {}", e);
                }
                if let Err(e) = self.transport.close().await {
                    debug!("Could not close rejected connection: {}", e);
                }
                self.state = SessionState::Closed;
                return SessionSummary {
                    username: None,
                    replies: 0,
                    end: SessionEnd::Rejected(reason),
                };
            }
        };

        self.state = SessionState::Active;
        tracing::Span::current().record("user", username.as_str());
        info!("Session active for {}", username);

        let mut replies = 0;
        let end = loop {
            let query = match self.transport.recv().await {
                Ok(Incoming::Text(query)) => query,
                Ok(Incoming::Disconnected) => break SessionEnd::Disconnected,
                Err(e) => break SessionEnd::TransportError(e.to_string()),
            };

            debug!("Received message from {}", username);
            let reply = self.generator.generate(&query).await;

            if let Err(e) = self.transport.send_text(reply).await {
                break SessionEnd::TransportError(e.to_string());
            }
            replies += 1;
        };

        match &end {
            SessionEnd::TransportError(e) => warn!("Session for {} failed: {}", username, e),
            _ => info!("Session for {} closed by client after {} replies", username, replies),
        }
        self.state = SessionState::Closed;

        SessionSummary {
            username: Some(username),
            replies,
            end,
        }
    }

    fn authenticate(&self, token: Option<&str>) -> Result<String, AuthError> {
        match token {
            Some(token) if !token.is_empty() => self.tokens.verify(token),
            _ => Err(AuthError::MissingToken),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::SigningSecret,
        template::PromptTemplate,
        testing::{MemoryTransport, RecordingChat, reference_knowledge},
    };
    use chrono::{Duration, Utc};

    struct Fixture {
        tokens: Arc<TokenService>,
        backend: Arc<RecordingChat>,
        generator: Arc<ResponseGenerator>,
    }

    fn fixture(backend: RecordingChat) -> Fixture {
        let _ = tracing_subscriber::fmt::try_init();
        let tokens = Arc::new(TokenService::new(SigningSecret::generate(), Duration::hours(1)));
        let backend = Arc::new(backend);
        let generator = Arc::new(ResponseGenerator::new(
            Arc::new(reference_knowledge()),
            backend.clone(),
            PromptTemplate::default(),
            None,
        ));
        Fixture {
            tokens,
            backend,
            generator,
        }
    }

    #[tokio::test]
    async fn test_missing_token_sends_one_error_and_closes() {
        let fx = fixture(RecordingChat::default());

        for token in [None, Some("")] {
            let transport = MemoryTransport::new(&["is bitcoin volatile?"]);
            let mut session = Session::new(transport.clone(), fx.tokens.clone(), fx.generator.clone());
            let summary = session.run(token).await;

            assert_eq!(summary.end, SessionEnd::Rejected(AuthError::MissingToken));
            assert_eq!(session.state(), SessionState::Closed);
            assert_eq!(transport.sent(), vec!["Error: Authentication token required.".to_string()]);
            assert!(transport.is_closed());
        }
        assert!(fx.backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_token_sends_reason() {
        let fx = fixture(RecordingChat::default());
        let transport = MemoryTransport::new(&["hello"]);
        let mut session = Session::new(transport.clone(), fx.tokens.clone(), fx.generator.clone());

        let summary = session.run(Some("garbage")).await;

        assert_eq!(summary.end, SessionEnd::Rejected(AuthError::InvalidToken));
        assert_eq!(transport.sent(), vec!["Error: Invalid token".to_string()]);
        assert!(transport.is_closed());
        assert!(fx.backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_close_failure_after_rejection_still_ends_session() {
        let fx = fixture(RecordingChat::default());
        let transport = MemoryTransport::new(&["hello"]).failing_close();
        let mut session = Session::new(transport.clone(), fx.tokens.clone(), fx.generator.clone());

        let summary = session.run(None).await;

        assert_eq!(summary.end, SessionEnd::Rejected(AuthError::MissingToken));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(transport.sent(), vec!["Error: Authentication token required.".to_string()]);
        assert!(!transport.is_closed());
    }

    #[tokio::test]
    async fn test_expired_token_sends_reason() {
        let fx = fixture(RecordingChat::default());
        let token = fx
            .tokens
            .issue_at("testuser", Utc::now() - Duration::hours(2))
            .unwrap();
        let transport = MemoryTransport::new(&["hello"]);
        let mut session = Session::new(transport.clone(), fx.tokens.clone(), fx.generator.clone());

        let summary = session.run(Some(&token)).await;

        assert_eq!(summary.end, SessionEnd::Rejected(AuthError::ExpiredToken));
        assert_eq!(transport.sent(), vec!["Error: Token expired".to_string()]);
    }

    #[tokio::test]
    async fn test_valid_token_gets_one_reply_per_message_in_order() {
        let fx = fixture(RecordingChat::default());
        let token = fx.tokens.issue("testuser").unwrap();
        let questions = ["first question", "second question", "third question"];
        let transport = MemoryTransport::new(&questions);
        let mut session = Session::new(transport.clone(), fx.tokens.clone(), fx.generator.clone());

        let summary = session.run(Some(&token)).await;

        assert_eq!(summary.username.as_deref(), Some("testuser"));
        assert_eq!(summary.replies, 3);
        assert_eq!(summary.end, SessionEnd::Disconnected);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(
            transport.sent(),
            vec![
                "reply to: first question".to_string(),
                "reply to: second question".to_string(),
                "reply to: third question".to_string(),
            ]
        );
        assert_eq!(fx.backend.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_generation_failure_sends_fallback_and_stays_active() {
        let fx = fixture(RecordingChat::failing_on("explode"));
        let token = fx.tokens.issue("testuser").unwrap();
        let transport = MemoryTransport::new(&["before", "please explode", "after"]);
        let mut session = Session::new(transport.clone(), fx.tokens.clone(), fx.generator.clone());

        let summary = session.run(Some(&token)).await;

        assert_eq!(summary.replies, 3);
        assert_eq!(summary.end, SessionEnd::Disconnected);
        assert_eq!(
            transport.sent(),
            vec![
                "reply to: before".to_string(),
                "I'm having trouble processing your request.".to_string(),
                "reply to: after".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_send_failure_ends_session() {
        let fx = fixture(RecordingChat::default());
        let token = fx.tokens.issue("testuser").unwrap();
        let transport = MemoryTransport::new(&["one", "two", "three"]).failing_sends_after(1);
        let mut session = Session::new(transport.clone(), fx.tokens.clone(), fx.generator.clone());

        let summary = session.run(Some(&token)).await;

        assert_eq!(summary.replies, 1);
        assert!(matches!(summary.end, SessionEnd::TransportError(_)));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(transport.sent(), vec!["reply to: one".to_string()]);
    }

    #[tokio::test]
    async fn test_new_session_starts_connecting() {
        let fx = fixture(RecordingChat::default());
        let session = Session::new(MemoryTransport::new(&[]), fx.tokens, fx.generator);
        assert_eq!(session.state(), SessionState::Connecting);
    }
}
