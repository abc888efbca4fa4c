//! `joi-runtime` – the conversation engine.
//!
//! Drives one assistant turn at a time: assemble the prompt from persisted
//! memory, ask the completion collaborator, classify the reply, perform the
//! side effect, answer the user.
//!
//! # Modules
//!
//! - [`assistant`] – [`Assistant`][assistant::Assistant]: the per-turn
//!   orchestrator and command dispatcher; owns the fact store, conversation
//!   log, task list, and scheduler for one session.
//! - [`llm_driver`] – [`LlmDriver`][llm_driver::LlmDriver]: an async client
//!   for an OpenAI-compatible chat-completions endpoint (Ollama by
//!   default), with a per-request timeout.
//!   [`COMMAND_GUIDELINES`][llm_driver::COMMAND_GUIDELINES] are injected
//!   into every system message so the model always knows the command
//!   grammar the dispatcher understands.
//! - [`scheduler`] – [`Scheduler`][scheduler::Scheduler]: cancellable
//!   timers and wall-clock reminders delivered over a notification channel.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: tracing
//!   subscriber setup with optional OTLP span export.

pub mod assistant;
pub mod llm_driver;
pub mod scheduler;
pub mod telemetry;

pub use assistant::{Assistant, AssistantConfig, DEFAULT_PERSONA};
pub use llm_driver::{COMMAND_GUIDELINES, ChatMessage, LlmDriver, LlmError, Role};
pub use scheduler::{Notification, ScheduledTask, Scheduler};
pub use telemetry::{TracerProviderGuard, init_tracing};
