//! REPL – the interactive chat loop.
//!
//! Anything you type is sent to Joi as a conversation turn, except for the
//! slash-commands:
//!   /ayuda              – show this list
//!   /hechos             – print everything Joi remembers about you
//!   /relaciones <quién> – print the relations stored for an entity
//!   /tareas             – print the task list
//!   /historial          – print the recent conversation turns
//!   /modelos            – list / switch the active AI model
//!   /salir | /exit      – leave the chat

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use joi_runtime::Assistant;

use crate::{config, ollama};

/// Entry point for the interactive chat loop.
///
/// `shutdown` is polled each iteration; when set (e.g. by the Ctrl-C
/// handler) the REPL exits cleanly. Completion turns run on `rt`, so
/// background timers keep ticking while the loop waits on stdin.
pub fn run(rt: &tokio::runtime::Runtime, assistant: &mut Assistant, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "tú>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Error de lectura".red(), e);
                break;
            }
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(rest) = input.strip_prefix("/relaciones") {
            cmd_relaciones(assistant, rest.trim());
            continue;
        }

        match input {
            "/ayuda" | "/help" => cmd_ayuda(),
            "/hechos" => cmd_hechos(assistant),
            "/tareas" => println!("{}", assistant.tasks().render()),
            "/historial" => cmd_historial(assistant),
            "/modelos" => cmd_modelos(),
            "/salir" | "/quit" | "/exit" => {
                println!("{}", "Hasta pronto.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            other if other.starts_with('/') => {
                println!(
                    "{} '{}'. Escribe {} para ver los comandos.",
                    "Comando desconocido:".red(),
                    other.yellow(),
                    "/ayuda".bold()
                );
            }
            message => {
                let reply = rt.block_on(assistant.respond(message));
                println!("{} {}", "Joi:".bold().yellow(), reply);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_ayuda() {
    println!();
    println!("{}", "Comandos de Joi".bold().underline());
    println!("  {}              – lo que Joi recuerda de ti", "/hechos".bold().cyan());
    println!("  {}  – relaciones guardadas de una entidad", "/relaciones <quién>".bold().cyan());
    println!("  {}              – tu lista de tareas", "/tareas".bold().cyan());
    println!("  {}           – los últimos turnos de la conversación", "/historial".bold().cyan());
    println!("  {}             – listar y cambiar el modelo de IA", "/modelos".bold().cyan());
    println!("  {}        – salir del chat", "/salir  /exit".bold().cyan());
    println!();
    println!("  Cualquier otro texto se envía a Joi como conversación.");
    println!();
}

fn cmd_hechos(assistant: &Assistant) {
    let block = assistant.facts().render();
    if block.is_empty() {
        println!("{}", "Aún no sé nada de ti. Cuéntame algo y pídeme recordarlo.".dimmed());
    } else {
        println!("{block}");
    }
}

fn cmd_relaciones(assistant: &Assistant, entity: &str) {
    if entity.is_empty() {
        println!("Uso: {} — p. ej. {}", "/relaciones <quién>".bold(), "/relaciones Juan".dimmed());
        return;
    }
    let lines = assistant.facts().query(entity);
    if lines.is_empty() {
        println!("{}", format!("No tengo relaciones guardadas para '{entity}'.").dimmed());
    } else {
        for line in lines {
            println!("  - {line}");
        }
    }
}

fn cmd_historial(assistant: &Assistant) {
    let recent = assistant.log().recent(10);
    if recent.is_empty() {
        println!("{}", "El historial está vacío.".dimmed());
        return;
    }
    for turn in recent {
        println!("  {}", turn.prompt_line());
    }
}

fn cmd_modelos() {
    let cfg = match config::load() {
        Ok(Some(c)) => c,
        Ok(None) => config::Config::default(),
        Err(e) => {
            println!("{}: {} – usando valores por defecto", "Error de configuración".red(), e);
            config::Config::default()
        }
    };

    println!("{}", "Modelos de IA".bold().underline());
    println!("  Modelo activo : {}", cfg.active_model.yellow());

    if cfg.ai_provider != config::AiProvider::Ollama {
        println!("  Proveedor: {}", cfg.ai_provider.to_string().yellow());
        println!("  (La selección de modelos en la nube se gestiona con las claves de API.)");
        return;
    }

    print!("  Buscando Ollama en {} … ", cfg.ollama_url.dimmed());
    io::stdout().flush().ok();

    match ollama::fetch_models(&cfg.ollama_url) {
        Ok(models) if models.is_empty() => {
            println!("{}", "sin modelos".yellow());
            println!("  Ejecuta `ollama pull llama3` para descargar uno.");
        }
        Ok(models) => {
            println!("{}", "en línea".green());
            for m in &models {
                let marker = if m.name == cfg.active_model { "▶" } else { " " };
                println!("    {} {}", marker.green(), m.name.bold());
            }

            let new_model = prompt_line(
                &format!("  Cambiar a modelo [{}]: ", cfg.active_model),
                &cfg.active_model,
            );
            if new_model != cfg.active_model {
                if models.iter().any(|m| m.name == new_model) {
                    let mut new_cfg = cfg.clone();
                    new_cfg.active_model = new_model.clone();
                    match config::save(&new_cfg) {
                        Ok(()) => println!(
                            "{} {} (se aplicará la próxima vez que inicies Joi)",
                            "✓ Modelo activo:".green(),
                            new_model.bold()
                        ),
                        Err(e) => println!("{}: {}", "Error guardando configuración".red(), e),
                    }
                } else {
                    println!("{} '{}'", "Modelo desconocido:".red(), new_model.yellow());
                }
            }
        }
        Err(e) => {
            println!("{}", "desconectado".red());
            println!("  {}", e.dimmed());
            println!("  ¿Está Ollama en marcha?  Prueba: ollama serve");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Prompt for a line of input.  Returns `default` when the user presses
/// Enter.
pub(crate) fn prompt_line(msg: &str, default: &str) -> String {
    print!("{}", msg);
    io::stdout().flush().ok();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed
            }
        }
        Err(_) => default.to_string(),
    }
}
