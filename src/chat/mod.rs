// Terminal chat client
// Keeps an append-only transcript and forwards questions to the query service


use console::style;
use dialoguer::Input;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ClientConfig, Config};
use crate::service::{ChatRequest, ChatResponse};
use crate::{AssistantError, Result};

/// Shown in place of an answer whenever the query service cannot be used
pub const BACKEND_UNREACHABLE_MESSAGE: &str =
    "Backend not reachable. Please ensure the query service is running.";

const EXIT_COMMANDS: [&str; 2] = ["/quit", "/exit"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered conversation log. Messages can be appended but never edited or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    #[inline]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[inline]
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

/// Blocking HTTP client for the query service's `POST /chat`
#[derive(Debug, Clone)]
pub struct BackendClient {
    endpoint: Url,
    agent: ureq::Agent,
    timeout: Duration,
}

impl BackendClient {
    #[inline]
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let endpoint = config
            .chat_endpoint()
            .map_err(|e| AssistantError::Config(e.to_string()))?;
        Ok(Self::with_endpoint(endpoint, config.timeout()))
    }

    #[inline]
    pub fn with_endpoint(endpoint: Url, timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self {
            endpoint,
            agent,
            timeout,
        }
    }

    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send one question and return the service's answer.
    ///
    /// Transport failures, timeouts, non-success statuses and undecodable bodies
    /// are all [`AssistantError::BackendUnavailable`].
    #[inline]
    pub fn ask(&self, question: &str) -> Result<String> {
        let request = serde_json::to_string(&ChatRequest {
            question: question.to_string(),
        })
        .map_err(|e| AssistantError::BackendUnavailable(format!("invalid request: {e}")))?;

        debug!("Posting question to {}", self.endpoint);

        let body = self
            .agent
            .post(self.endpoint.as_str())
            .header("Content-Type", "application/json")
            .send(&request)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| {
                AssistantError::BackendUnavailable(format!("{}: {e}", self.endpoint))
            })?;

        let response: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            AssistantError::BackendUnavailable(format!("unexpected response body: {e}"))
        })?;

        Ok(response.answer)
    }
}

/// One conversation with the query service
#[derive(Debug, Clone)]
pub struct ChatSession {
    transcript: Transcript,
    backend: BackendClient,
}

impl ChatSession {
    #[inline]
    pub fn new(backend: BackendClient) -> Self {
        Self {
            transcript: Transcript::new(),
            backend,
        }
    }

    #[inline]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    #[inline]
    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    /// Record `input`, ask the backend and record the reply.
    ///
    /// `render` sees each message as it is appended. Blank input is ignored and
    /// returns `None`; otherwise the assistant message is returned, which is the
    /// fixed [`BACKEND_UNREACHABLE_MESSAGE`] when the request failed.
    #[inline]
    pub fn submit<F>(&mut self, input: &str, mut render: F) -> Option<&ChatMessage>
    where
        F: FnMut(&ChatMessage),
    {
        if input.trim().is_empty() {
            return None;
        }

        let question = ChatMessage::user(input);
        render(&question);
        self.transcript.push(question);

        let answer = match self.backend.ask(input) {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Chat request failed: {}", e);
                BACKEND_UNREACHABLE_MESSAGE.to_string()
            }
        };

        let reply = ChatMessage::assistant(answer);
        render(&reply);
        self.transcript.push(reply);
        self.transcript.last()
    }
}

/// Print one transcript entry with role styling
#[inline]
pub fn render_message(message: &ChatMessage) {
    match message.role {
        Role::User => println!("{} {}", style("You:").cyan().bold(), message.content),
        Role::Assistant => println!(
            "{} {}\n",
            style("Assistant:").green().bold(),
            message.content
        ),
    }
}

/// Interactive terminal loop. Ends on `/quit`, `/exit` or end of input.
#[inline]
pub fn run_chat(config: &Config) -> Result<()> {
    let backend = BackendClient::new(&config.client)?;

    println!("{}", style("Document Assistant").bold().underlined());
    println!(
        "Backend: {}  (timeout {}s)",
        style(backend.endpoint()).cyan(),
        backend.timeout().as_secs()
    );
    println!("Embedding model: {}", style(&config.ollama.model).cyan());
    println!(
        "{}\n",
        style("Ask a question about the document, or /quit to leave.").dim()
    );

    info!("Starting chat session against {}", backend.endpoint());
    let mut session = ChatSession::new(backend);

    loop {
        let input = match Input::<String>::new()
            .with_prompt("You")
            .allow_empty(true)
            .report(false)
            .interact_text()
        {
            Ok(input) => input,
            Err(e) => {
                debug!("Input closed: {}", e);
                break;
            }
        };

        if EXIT_COMMANDS.contains(&input.trim()) {
            break;
        }

        session.submit(&input, render_message);
    }

    info!(
        "Chat session ended after {} messages",
        session.transcript().len()
    );
    Ok(())
}
