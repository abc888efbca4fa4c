//! `joi-cli` – the Joi console client.
//!
//! This binary is the entry point for a chat session with Joi.  It:
//!
//! 1. Checks for `~/.joi/config.toml`; runs a **first-run wizard** when the
//!    file is absent.
//! 2. Probes the local Ollama instance and reports available AI models.
//! 3. Opens the persisted memory (facts, conversation log, task list) for
//!    the configured user.
//! 4. Drops the user into an **interactive chat REPL** with slash-commands
//!    (`/hechos`, `/tareas`, `/historial`, `/modelos`, `/ayuda`).
//! 5. Intercepts **Ctrl-C** to leave the chat cleanly.

mod config;
mod ollama;
mod repl;

use colored::Colorize;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

use joi_memory::document::{DocumentStore, SqliteDocumentStore};
use joi_memory::facts::FactStore;
use joi_memory::history::ConversationLog;
use joi_memory::tasks::TaskList;
use joi_runtime::scheduler::{Notification, Scheduler};
use joi_runtime::{Assistant, AssistantConfig, LlmDriver};

fn main() {
    // Structured logging (and optional OTLP export) for the libraries; the
    // REPL's user-facing output stays on println! for UX consistency.
    let _guard = joi_runtime::init_tracing("joi");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "Ctrl-C recibido – cerrando Joi …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Configuration / first-run wizard ──────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Configuración cargada de {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Error de configuración".red(), e);
            println!("  Usando la configuración por defecto.");
            config::Config::default()
        }
    };

    // ── Ollama discovery ──────────────────────────────────────────────────
    if cfg.ai_provider == config::AiProvider::Ollama {
        print!("\n  Buscando Ollama en {} … ", cfg.ollama_url.dimmed());
        std::io::stdout().flush().ok();
        match ollama::fetch_models(&cfg.ollama_url) {
            Ok(models) => {
                println!("{} ({} modelo(s))", "en línea".green(), models.len());
                for m in &models {
                    println!("    • {}", m.name.bold());
                }
            }
            Err(_) => {
                println!("{}", "desconectado".yellow());
                println!(
                    "  {}  Ejecuta `{}` para arrancar una IA local.",
                    "No se detectó ninguna instancia de Ollama.".dimmed(),
                    "ollama serve".bold()
                );
            }
        }
    }

    // ── Session assembly ──────────────────────────────────────────────────
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "No se pudo crear el runtime".red(), e);
            return;
        }
    };

    let data_dir = config::joi_dir();
    let memory_db = data_dir.join("memoria.db");
    let (Some(facts_backing), Some(log_backing)) =
        (open_backing(&memory_db), open_backing(&memory_db))
    else {
        eprintln!("{}", "No se pudo abrir ningún almacén de memoria.".red());
        return;
    };

    let facts = FactStore::open(cfg.user_name.to_lowercase(), facts_backing);
    let log = ConversationLog::open("historial", cfg.history_retention, log_backing);
    let tasks = TaskList::new(data_dir.join("tareas.json"));

    let (scheduler, notifications) = Scheduler::new();
    // Timers and reminders print the moment they fire, even while the REPL
    // is blocked reading stdin.
    rt.spawn(print_notifications(notifications));

    let llm = LlmDriver::new(
        cfg.ollama_url.clone(),
        cfg.active_model.clone(),
        Duration::from_secs(cfg.request_timeout_secs),
    );
    let assistant_config = AssistantConfig {
        user_name: cfg.user_name.clone(),
        prompt_window: cfg.history_window,
        ..Default::default()
    };
    let mut assistant = Assistant::new(llm, facts, log, tasks, scheduler, assistant_config);

    println!();
    println!(
        "  Hola, {}. Escribe {} para ver los comandos.\n",
        cfg.user_name.bold(),
        "/ayuda".bold().cyan()
    );

    // ── Interactive chat ──────────────────────────────────────────────────
    repl::run(&rt, &mut assistant, shutdown);
}

/// Open the SQLite document backing at `path`, falling back to an
/// in-memory store (session-only memory) when the file cannot be opened.
fn open_backing(path: &Path) -> Option<Box<dyn DocumentStore>> {
    match SqliteDocumentStore::open(path) {
        Ok(store) => Some(Box::new(store)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "falling back to in-memory memory store");
            match SqliteDocumentStore::open_in_memory() {
                Ok(store) => Some(Box::new(store)),
                Err(e) => {
                    eprintln!("{}: {}", "Error abriendo la memoria".red(), e);
                    None
                }
            }
        }
    }
}

/// Print fired timers/reminders as they arrive and restore the prompt.
async fn print_notifications(mut rx: tokio::sync::mpsc::UnboundedReceiver<Notification>) {
    while let Some(notification) = rx.recv().await {
        println!();
        println!(
            "{} {}",
            "— ¡Ding, dong! Joi te recuerda:".bold().yellow(),
            notification.message
        );
        print!("{} ", "tú>".bold().cyan());
        std::io::stdout().flush().ok();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-run wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║     Primera ejecución de Joi         ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No hay configuración todavía.  Vamos a preparar a Joi.\n");

    let mut cfg = config::Config::default();

    println!("  ¿Qué proveedor de IA quieres usar?");
    println!("    1) IA local con Ollama  (por defecto, sin conexión)");
    println!("    2) IA en la nube con OpenAI");
    println!("    3) IA en la nube con Anthropic");
    let choice = repl::prompt_line("  Elige una opción [1]: ", "1");
    cfg.ai_provider = match choice.trim() {
        "2" => config::AiProvider::OpenAI,
        "3" => config::AiProvider::Anthropic,
        _ => config::AiProvider::Ollama,
    };

    cfg.active_model = repl::prompt_line(
        &format!("  Modelo activo [{}]: ", cfg.active_model),
        &cfg.active_model,
    );

    cfg.user_name = repl::prompt_line(
        &format!("  ¿Cómo te llamas? [{}]: ", cfg.user_name),
        &cfg.user_name,
    );

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Configuración guardada en {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error guardando configuración".red(), e),
    }

    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"       __      _ "#.bold().cyan());
    println!("{}", r#"      / /___  (_)"#.bold().cyan());
    println!("{}", r#" __  / / __ \/ / "#.bold().cyan());
    println!("{}", r#"/ /_/ / /_/ / /  "#.bold().cyan());
    println!("{}", r#"\____/\____/_/   "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Joi".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Asistente personal con memoria");
    println!();
}
