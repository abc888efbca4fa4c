use serde::{Deserialize, Serialize};

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    /// Display tag used when replaying the turn into a prompt
    /// (`"Tú"` for the user, `"Joi"` for the assistant).
    pub fn tag(&self) -> &'static str {
        match self {
            Speaker::User => "Tú",
            Speaker::Assistant => "Joi",
        }
    }
}

/// One exchange unit in the conversation log.
///
/// Turns are append-only: once recorded they are never edited, only trimmed
/// from the head of the log when the retention window is exceeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
        }
    }

    /// Format this turn as a single prompt line, e.g. `Tú: hola`.
    pub fn prompt_line(&self) -> String {
        format!("{}: {}", self.speaker.tag(), self.text)
    }
}

/// A single entry on the user's task list.
///
/// Ids are assigned as `list length + 1` at insertion time, matching the
/// historical behavior of the task file. After deletions an id can be
/// reused; see the task-list documentation for the tradeoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub description: String,
    pub completed: bool,
}

/// Strict definition of the actions the model is allowed to request.
///
/// The completion collaborator signals a side effect by starting its reply
/// with one of a handful of literal, case-sensitive command prefixes.
/// [`Command::parse`] classifies a raw completion into exactly one variant;
/// anything that does not match a command shape is [`Command::Plain`] and is
/// shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `HECHO: <dotted.path>: <value>` – store a personal fact.
    Fact { path: String, value: String },
    /// `TEMPORIZADOR: <seconds>: <message>` – countdown timer.
    Timer { seconds: u64, message: String },
    /// `RECORDATORIO: <HH:MM>: <message>` – reminder at a wall-clock time.
    ///
    /// `time` is kept as raw text; range validation (`99:99` is shaped like
    /// a time but is not one) belongs to the reminder collaborator.
    Reminder { time: String, message: String },
    /// `TAREA_ADD: <description>` – append a task.
    TaskAdd { description: String },
    /// `TAREA_SHOW` – render the task list.
    TaskShow,
    /// `TAREA_COMPLETE: <id>` – mark a task done. The id is kept as raw
    /// text so the dispatcher can answer non-numeric input with a
    /// corrective message instead of failing the turn.
    TaskComplete { id: String },
    /// `TAREA_DELETE: <id>` – remove a task.
    TaskDelete { id: String },
    /// No command recognized; the text is the response.
    Plain(String),
}

impl Command {
    /// Classify a raw completion into exactly one [`Command`].
    ///
    /// Prefixes are matched top to bottom in the order listed on the enum;
    /// the first match wins. A prefix whose argument shape is malformed
    /// beyond repair (e.g. `TEMPORIZADOR:` with non-numeric seconds) does
    /// not match and the text falls through to [`Command::Plain`].
    pub fn parse(raw: &str) -> Command {
        if let Some(rest) = raw.strip_prefix("HECHO: ")
            && let Some((path, value)) = rest.split_once(": ")
            && !path.trim().is_empty()
            && !value.trim().is_empty()
        {
            return Command::Fact {
                path: path.trim().to_string(),
                value: value.trim().to_string(),
            };
        }

        if let Some(rest) = raw.strip_prefix("TEMPORIZADOR: ")
            && let Some((seconds, message)) = rest.split_once(": ")
            && let Ok(seconds) = seconds.trim().parse::<u64>()
            && !message.trim().is_empty()
        {
            return Command::Timer {
                seconds,
                message: message.trim().to_string(),
            };
        }

        if let Some(rest) = raw.strip_prefix("RECORDATORIO: ")
            && let Some((time, message)) = rest.split_once(": ")
            && is_time_shaped(time.trim())
            && !message.trim().is_empty()
        {
            return Command::Reminder {
                time: time.trim().to_string(),
                message: message.trim().to_string(),
            };
        }

        if let Some(rest) = raw.strip_prefix("TAREA_ADD:") {
            return Command::TaskAdd {
                description: rest.trim().to_string(),
            };
        }

        if raw.starts_with("TAREA_SHOW") {
            return Command::TaskShow;
        }

        if let Some(rest) = raw.strip_prefix("TAREA_COMPLETE:") {
            return Command::TaskComplete {
                id: rest.trim().to_string(),
            };
        }

        if let Some(rest) = raw.strip_prefix("TAREA_DELETE:") {
            return Command::TaskDelete {
                id: rest.trim().to_string(),
            };
        }

        Command::Plain(raw.to_string())
    }
}

/// `true` for `DD:DD` shapes (two digits, colon, two digits).
///
/// Shape only – `99:99` passes here and is rejected later by the reminder
/// collaborator, which reports the failure back to the user.
fn is_time_shaped(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 5
        && bytes[0].is_ascii_digit()
        && bytes[1].is_ascii_digit()
        && bytes[2] == b':'
        && bytes[3].is_ascii_digit()
        && bytes[4].is_ascii_digit()
}
