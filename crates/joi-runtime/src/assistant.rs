//! [`Assistant`] – the per-turn conversation orchestrator.
//!
//! One call to [`Assistant::respond`] drives a full turn:
//!
//! 1. **Assemble** – persona, the rendered fact block (with its header only
//!    when the store is non-empty), the current date and time, and the
//!    recent history window are packed into an OpenAI-style message list.
//! 2. **Complete** – [`LlmDriver::complete`] produces the raw reply text.
//! 3. **Classify** – [`Command::parse`] turns the raw text into exactly one
//!    [`Command`] variant.
//! 4. **Dispatch** – an exhaustive match routes the command to the fact
//!    store, the scheduler, or the task list, synthesizing a confirmation;
//!    plain text passes through verbatim.
//! 5. **Record** – the user and assistant turns are appended to the
//!    conversation log (write-through).
//!
//! Each turn is isolated: no error class escapes `respond`. Malformed
//! command arguments become corrective messages, collaborator failures
//! become a logged apology with conversation state untouched.
//!
//! All state lives on this struct — the caller owns the session lifecycle
//! and there are no process-wide globals.

use std::time::Duration;

use chrono::Local;
use joi_memory::facts::{FactError, FactStore};
use joi_memory::history::ConversationLog;
use joi_memory::tasks::TaskList;
use joi_types::{Command, Speaker, Turn};
use serde_json::Value;
use tracing::{debug, warn};

use crate::llm_driver::{ChatMessage, LlmDriver, Role};
use crate::scheduler::{ScheduledTask, Scheduler};

// ─────────────────────────────────────────────────────────────────────────────
// Persona
// ─────────────────────────────────────────────────────────────────────────────

/// Default system persona. The command grammar itself is appended by the
/// driver (see [`crate::llm_driver::COMMAND_GUIDELINES`]), so this text only
/// carries the voice.
pub const DEFAULT_PERSONA: &str = "\
Eres Joi, una asistente personal empática y perspicaz.
Tu tono es cálido, comprensivo y ligeramente etéreo. Buscas mejorar el día
de tu usuario, ofreciendo ayuda de forma sutil y no invasiva.
Es crucial que recuerdes los detalles importantes que el usuario comparte:
fechas, nombres, eventos y preferencias. Cuando el usuario te pida recordar
algo, extráelo y guárdalo con el comando de hechos.";

/// Shown when the completion collaborator fails; the turn is abandoned and
/// the conversation log is left untouched.
const PROVIDER_APOLOGY: &str =
    "Lo siento, algo salió mal al generar mi respuesta. ¿Lo intentamos de nuevo?";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for one assistant session.
pub struct AssistantConfig {
    /// System persona injected at the top of every prompt.
    pub persona: String,
    /// Display name of the user, used in the fact-block header.
    pub user_name: String,
    /// Number of recent turns replayed into each prompt.
    pub prompt_window: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            persona: DEFAULT_PERSONA.to_string(),
            user_name: "Juan".to_string(),
            prompt_window: 30,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Assistant
// ─────────────────────────────────────────────────────────────────────────────

/// Session object owning the stores and collaborators for one user.
pub struct Assistant {
    llm: LlmDriver,
    facts: FactStore,
    log: ConversationLog,
    tasks: TaskList,
    scheduler: Scheduler,
    /// Handles for timers/reminders that have not fired yet.
    pending: Vec<ScheduledTask>,
    config: AssistantConfig,
}

impl Assistant {
    pub fn new(
        llm: LlmDriver,
        facts: FactStore,
        log: ConversationLog,
        tasks: TaskList,
        scheduler: Scheduler,
        config: AssistantConfig,
    ) -> Self {
        Self {
            llm,
            facts,
            log,
            tasks,
            scheduler,
            pending: Vec::new(),
            config,
        }
    }

    /// Run one full conversation turn and return the text to show the user.
    ///
    /// Never fails: collaborator errors are logged and answered with an
    /// apology, leaving the conversation log untouched.
    pub async fn respond(&mut self, user_input: &str) -> String {
        let messages = self.build_messages(user_input);

        let raw = match self.llm.complete(&messages).await {
            Ok(raw) => raw.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "completion request failed");
                return PROVIDER_APOLOGY.to_string();
            }
        };

        let command = Command::parse(&raw);
        debug!(?command, "classified completion");
        let response = self.dispatch(command);

        self.log.append(Turn::user(user_input));
        self.log.append(Turn::assistant(response.clone()));

        response
    }

    /// Route one parsed command to its collaborator and synthesize the
    /// user-facing reply. Exactly one branch fires per turn.
    fn dispatch(&mut self, command: Command) -> String {
        self.pending.retain(|task| !task.is_finished());

        match command {
            Command::Fact { path, value } => {
                match self.facts.upsert_path(&path, Value::String(value.clone())) {
                    Ok(()) => format!(
                        "¡Entendido! He guardado que '{}' es '{}' en tu red de recuerdos.",
                        path.replace('.', " "),
                        value
                    ),
                    Err(FactError::EmptyPath) => {
                        "Necesito una ruta válida (p. ej. 'Juan.mascota.nombre') para guardar ese hecho.".to_string()
                    }
                    Err(e) => {
                        debug!(error = %e, "rejected fact upsert");
                        "No pude guardar ese hecho; solo puedo recordar valores simples.".to_string()
                    }
                }
            }

            Command::Timer { seconds, message } => {
                let task = self
                    .scheduler
                    .after(Duration::from_secs(seconds), message.clone());
                self.pending.push(task);
                format!(
                    "¡He configurado un temporizador de {seconds} segundos para: '{message}'! Yo te avisaré."
                )
            }

            Command::Reminder { time, message } => {
                match self.scheduler.at(&time, message.clone()) {
                    Some(task) => {
                        self.pending.push(task);
                        format!(
                            "¡He configurado un recordatorio para las {time} para: '{message}'! Yo te avisaré."
                        )
                    }
                    None => format!(
                        "No pude configurar el recordatorio para las {time}. Asegúrate de que la hora sea válida (HH:MM)."
                    ),
                }
            }

            Command::TaskAdd { description } => {
                if description.is_empty() {
                    return "Necesito una descripción para añadir la tarea.".to_string();
                }
                match self.tasks.add(&description) {
                    Ok(task) => format!(
                        "¡Perfecto! He añadido '{}' a tu lista de tareas (ID: {}).",
                        task.description, task.id
                    ),
                    Err(e) => {
                        warn!(error = %e, "failed to add task");
                        "Tuve un problema al guardar la tarea. Inténtalo de nuevo en un momento."
                            .to_string()
                    }
                }
            }

            Command::TaskShow => self.tasks.render(),

            Command::TaskComplete { id } => match id.parse::<u64>() {
                Err(_) => "Para completar una tarea necesito un ID numérico válido. Ejemplo: 'TAREA_COMPLETE: 5'.".to_string(),
                Ok(id) => match self.tasks.complete(id) {
                    Ok(true) => format!("¡Tarea {id} marcada como completada! Bien hecho."),
                    Ok(false) => {
                        format!("No pude encontrar la tarea con ID {id}. ¿Podrías verificarlo?")
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to complete task");
                        "Tuve un problema al actualizar la tarea. Inténtalo de nuevo en un momento.".to_string()
                    }
                },
            },

            Command::TaskDelete { id } => match id.parse::<u64>() {
                Err(_) => "Para eliminar una tarea necesito un ID numérico válido. Ejemplo: 'TAREA_DELETE: 3'.".to_string(),
                Ok(id) => match self.tasks.delete(id) {
                    Ok(true) => format!("¡Tarea {id} eliminada de tu lista!"),
                    Ok(false) => format!(
                        "No pude encontrar la tarea con ID {id} para eliminarla. ¿Seguro que es correcta?"
                    ),
                    Err(e) => {
                        warn!(error = %e, "failed to delete task");
                        "Tuve un problema al actualizar la tarea. Inténtalo de nuevo en un momento.".to_string()
                    }
                },
            },

            Command::Plain(text) => text,
        }
    }

    /// Assemble the message list for one turn.
    fn build_messages(&self, user_input: &str) -> Vec<ChatMessage> {
        let mut system = self.config.persona.clone();
        let facts_block = self.facts_block();
        if !facts_block.is_empty() {
            system.push_str("\n\n");
            system.push_str(&facts_block);
        }
        system.push_str(&format!(
            "\n\nLa fecha y hora actuales son: {}.",
            Local::now().format("%Y-%m-%d %H:%M:%S (%A)")
        ));

        let mut messages = vec![ChatMessage {
            role: Role::System,
            content: system,
        }];
        for turn in self.log.recent(self.config.prompt_window) {
            messages.push(ChatMessage {
                role: match turn.speaker {
                    Speaker::User => Role::User,
                    Speaker::Assistant => Role::Assistant,
                },
                content: turn.text.clone(),
            });
        }
        messages.push(ChatMessage {
            role: Role::User,
            content: user_input.to_string(),
        });
        messages
    }

    /// The fact store flattened for prompt injection; empty string (no
    /// header) when nothing is stored.
    fn facts_block(&self) -> String {
        if self.facts.is_empty() {
            return String::new();
        }
        format!(
            "CONOCIMIENTO PROFUNDO DE {}:\n{}",
            self.config.user_name.to_uppercase(),
            self.facts.render()
        )
    }

    // -------------------------------------------------------------------------
    // Accessors (for the REPL's slash-commands and for tests)
    // -------------------------------------------------------------------------

    pub fn facts(&self) -> &FactStore {
        &self.facts
    }

    pub fn tasks(&self) -> &TaskList {
        &self.tasks
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Number of timers/reminders scheduled and not yet fired.
    pub fn pending_jobs(&self) -> usize {
        self.pending.iter().filter(|t| !t.is_finished()).count()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use joi_memory::document::SqliteDocumentStore;
    use tokio::sync::mpsc;

    use crate::scheduler::Notification;

    fn make_assistant(
        dir: &tempfile::TempDir,
    ) -> (Assistant, mpsc::UnboundedReceiver<Notification>) {
        let facts = FactStore::open(
            "juan",
            Box::new(SqliteDocumentStore::open_in_memory().unwrap()),
        );
        let log = ConversationLog::open(
            "historial",
            50,
            Box::new(SqliteDocumentStore::open_in_memory().unwrap()),
        );
        let tasks = TaskList::new(dir.path().join("tareas.json"));
        let (scheduler, rx) = Scheduler::new();
        // Unreachable endpoint: respond() tests exercise the failure path.
        let llm = LlmDriver::new("http://127.0.0.1:9", "llama3", Duration::from_secs(1));
        let assistant = Assistant::new(llm, facts, log, tasks, scheduler, AssistantConfig::default());
        (assistant, rx)
    }

    // ── dispatch: facts ──────────────────────────────────────────────────────

    #[test]
    fn fact_command_stores_and_confirms() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assistant, _rx) = make_assistant(&dir);

        let raw = "HECHO: Juan.color_favorito: azul";
        let response = assistant.dispatch(Command::parse(raw));

        assert_ne!(response, raw, "confirmation must not echo the command");
        assert!(response.contains("He guardado"));
        assert!(assistant.facts().render().contains("color_favorito: azul"));
    }

    #[test]
    fn fact_with_empty_path_is_corrected_without_state_change() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assistant, _rx) = make_assistant(&dir);

        let response = assistant.dispatch(Command::Fact {
            path: "".to_string(),
            value: "azul".to_string(),
        });

        assert!(response.contains("ruta válida"));
        assert!(assistant.facts().is_empty());
    }

    // ── dispatch: timers and reminders ───────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn timer_command_schedules_and_confirms() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assistant, mut rx) = make_assistant(&dir);

        let response = assistant.dispatch(Command::parse("TEMPORIZADOR: 60: Es hora de descansar"));
        assert!(response.contains("60 segundos"));
        assert_eq!(assistant.pending_jobs(), 1);

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.message, "Es hora de descansar");
    }

    #[tokio::test]
    async fn invalid_reminder_reports_failure_and_schedules_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assistant, mut rx) = make_assistant(&dir);

        let response = assistant.dispatch(Command::parse("RECORDATORIO: 99:99: test"));

        assert!(response.contains("No pude configurar el recordatorio"));
        assert_eq!(assistant.pending_jobs(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn valid_reminder_confirms_and_schedules() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assistant, _rx) = make_assistant(&dir);

        let response = assistant.dispatch(Command::parse("RECORDATORIO: 23:59: cita médica"));
        assert!(response.contains("23:59"));
        assert_eq!(assistant.pending_jobs(), 1);
    }

    // ── dispatch: tasks ──────────────────────────────────────────────────────

    #[test]
    fn task_add_show_complete_delete_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assistant, _rx) = make_assistant(&dir);

        let added = assistant.dispatch(Command::parse("TAREA_ADD: Comprar leche"));
        assert!(added.contains("Comprar leche"));
        assert!(added.contains("ID: 1"));

        let shown = assistant.dispatch(Command::parse("TAREA_SHOW"));
        assert!(shown.contains("[PENDIENTE] Comprar leche"));

        let completed = assistant.dispatch(Command::parse("TAREA_COMPLETE: 1"));
        assert!(completed.contains("completada"));

        let deleted = assistant.dispatch(Command::parse("TAREA_DELETE: 1"));
        assert!(deleted.contains("eliminada"));
    }

    #[test]
    fn non_numeric_task_id_is_corrected_without_state_change() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assistant, _rx) = make_assistant(&dir);
        assistant.dispatch(Command::parse("TAREA_ADD: Comprar leche"));

        let response = assistant.dispatch(Command::parse("TAREA_COMPLETE: abc"));

        assert!(response.contains("ID numérico válido"));
        let shown = assistant.dispatch(Command::parse("TAREA_SHOW"));
        assert!(shown.contains("[PENDIENTE] Comprar leche"));
    }

    #[test]
    fn unknown_task_id_gets_a_gentle_answer() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assistant, _rx) = make_assistant(&dir);
        let response = assistant.dispatch(Command::parse("TAREA_COMPLETE: 42"));
        assert!(response.contains("No pude encontrar la tarea con ID 42"));
    }

    // ── dispatch: plain text ─────────────────────────────────────────────────

    #[test]
    fn plain_text_passes_through_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assistant, _rx) = make_assistant(&dir);
        let text = "¡Hola! Hoy es un buen día para descansar.";
        assert_eq!(assistant.dispatch(Command::parse(text)), text);
    }

    // ── prompt assembly ──────────────────────────────────────────────────────

    #[test]
    fn facts_header_appears_only_when_store_is_non_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assistant, _rx) = make_assistant(&dir);

        let before = assistant.build_messages("hola");
        assert!(!before[0].content.contains("CONOCIMIENTO PROFUNDO"));

        assistant.dispatch(Command::parse("HECHO: Juan.mascota.nombre: Bigotes"));
        let after = assistant.build_messages("hola");
        assert!(after[0].content.contains("CONOCIMIENTO PROFUNDO DE JUAN"));
        assert!(after[0].content.contains("nombre: Bigotes"));
    }

    #[test]
    fn messages_end_with_the_current_user_input() {
        let dir = tempfile::tempdir().unwrap();
        let (assistant, _rx) = make_assistant(&dir);
        let messages = assistant.build_messages("¿me recuerdas algo?");
        let last = messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "¿me recuerdas algo?");
    }

    #[test]
    fn prompt_replays_only_the_recent_window() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assistant, _rx) = make_assistant(&dir);
        assistant.config.prompt_window = 2;
        for i in 0..5 {
            assistant.log.append(Turn::user(format!("turno {i}")));
        }
        let messages = assistant.build_messages("hola");
        // system + 2 history turns + current input
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "turno 3");
        assert_eq!(messages[2].content, "turno 4");
    }

    // ── respond: provider failure ────────────────────────────────────────────

    #[tokio::test]
    async fn provider_failure_yields_apology_and_leaves_log_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assistant, _rx) = make_assistant(&dir);

        let response = assistant.respond("hola Joi").await;

        assert_eq!(response, PROVIDER_APOLOGY);
        assert!(assistant.log().is_empty());
    }
}
