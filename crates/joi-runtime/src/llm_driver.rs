//! [`LlmDriver`] – OpenAI-compatible completion client.
//!
//! Communicates with a model server that exposes an OpenAI-compatible
//! `/v1/chat/completions` endpoint, such as [Ollama](https://ollama.com)
//! (`http://localhost:11434`). Every request carries a client-side timeout;
//! a slow or unreachable server surfaces as a recoverable [`LlmError`], and
//! the caller decides how to apologize to the user.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use joi_runtime::llm_driver::{ChatMessage, LlmDriver, Role};
//!
//! let driver = LlmDriver::new("http://localhost:11434", "llama3", Duration::from_secs(30));
//!
//! let messages = vec![
//!     ChatMessage { role: Role::System, content: "Eres Joi.".into() },
//!     ChatMessage { role: Role::User, content: "Hola".into() },
//! ];
//! // Requires a running model server – skipped in unit tests.
//! // let reply = driver.complete(&messages).await.unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Command guidelines
// ─────────────────────────────────────────────────────────────────────────────

/// The command grammar taught to the model, automatically appended to every
/// system-role message. The literal prefixes here are the contract the
/// dispatcher matches against, so callers cannot accidentally send a system
/// prompt that forgets to explain them.
pub const COMMAND_GUIDELINES: &str = "\
## Comandos (tu respuesta debe ser SOLO el comando, sin texto adicional)
- Para guardar un hecho sobre el usuario: `HECHO: Entidad.relacion.atributo: valor`
  (anida siempre la información con puntos, p. ej. `HECHO: Juan.mascota.nombre: Bigotes`).
- Para un temporizador: `TEMPORIZADOR: <segundos>: <mensaje>`, p. ej. `TEMPORIZADOR: 60: Es hora de descansar`.
- Para un recordatorio a una hora del día: `RECORDATORIO: HH:MM: <mensaje>`, p. ej. `RECORDATORIO: 14:30: No olvides tu cita`.
- Para la lista de tareas: `TAREA_ADD: <descripción>`, `TAREA_SHOW`, `TAREA_COMPLETE: <id>`, `TAREA_DELETE: <id>`.
Si tu respuesta no es un comando, responde normalmente con tu personalidad.";

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from completion requests.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The HTTP request failed (includes client-side timeouts).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response from the model server could not be interpreted.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Message types (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

/// The role of a participant in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal request / response shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmDriver
// ─────────────────────────────────────────────────────────────────────────────

/// An async client for an OpenAI-compatible chat-completions endpoint.
///
/// Construct once and reuse across conversation turns.
pub struct LlmDriver {
    base_url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl LlmDriver {
    /// Create a new driver pointing at `base_url` (e.g.
    /// `"http://localhost:11434"`), using `model` (e.g. `"llama3"`), with a
    /// per-request `timeout`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    /// Send `messages` to the model and return the assistant's reply text.
    ///
    /// [`COMMAND_GUIDELINES`] are appended to every [`Role::System`] message
    /// so the model always knows the command grammar regardless of how the
    /// caller builds the conversation. If no system message is present, one
    /// containing only the guidelines is prepended.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Http`] if the request fails or times out, or
    /// [`LlmError::BadResponse`] if the response shape is unexpected.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let augmented = with_command_guidelines(messages);

        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: &augmented,
            stream: false,
        };

        let response: ChatResponse = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::BadResponse("empty choices array".into()))
    }
}

/// Append [`COMMAND_GUIDELINES`] to every system message, prepending a
/// guidelines-only system message when the caller supplied none.
fn with_command_guidelines(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut augmented: Vec<ChatMessage> = messages
        .iter()
        .map(|m| {
            if m.role == Role::System {
                ChatMessage {
                    role: Role::System,
                    content: format!("{}\n\n{}", m.content, COMMAND_GUIDELINES),
                }
            } else {
                m.clone()
            }
        })
        .collect();

    if !augmented.iter().any(|m| m.role == Role::System) {
        augmented.insert(
            0,
            ChatMessage {
                role: Role::System,
                content: COMMAND_GUIDELINES.to_string(),
            },
        );
    }

    augmented
}
