//! [`ConversationLog`] – the ordered, size-bounded turn history.
//!
//! An append-only sequence of [`Turn`]s replayed into each prompt. Order is
//! strictly chronological; a turn is never mutated after append, only
//! trimmed from the head once the retention window is exceeded. The window
//! used for prompt inclusion is chosen by the caller per [`recent`] call and
//! is independent of the on-disk retention.
//!
//! Persistence follows the same fail-soft contract as the fact store: a
//! missing or corrupt backing document yields an empty log, and a failed
//! write leaves the in-memory log authoritative.
//!
//! [`recent`]: ConversationLog::recent

use joi_types::Turn;
use tracing::warn;

use crate::document::DocumentStore;

/// Default number of turns kept on disk.
pub const DEFAULT_RETENTION: usize = 200;

/// Append-only conversation history for one user identity.
pub struct ConversationLog {
    key: String,
    turns: Vec<Turn>,
    retention: usize,
    backing: Box<dyn DocumentStore>,
}

impl ConversationLog {
    /// Open the log stored under `key`, keeping at most `retention` turns.
    ///
    /// Never fails; an unreadable or corrupt document starts an empty log.
    pub fn open(
        key: impl Into<String>,
        retention: usize,
        backing: Box<dyn DocumentStore>,
    ) -> Self {
        let mut log = Self {
            key: key.into(),
            turns: Vec::new(),
            retention: retention.max(1),
            backing,
        };
        log.load();
        log
    }

    /// Append a turn, trim to the retention window, and persist.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
        if self.turns.len() > self.retention {
            let excess = self.turns.len() - self.retention;
            self.turns.drain(..excess);
        }
        self.persist();
    }

    /// The last `min(n, len)` turns in chronological order.
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Reload the log from the backing store. Fail-soft.
    pub fn load(&mut self) {
        self.turns.clear();
        let bytes = match self.backing.get(&self.key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return,
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to load conversation log; starting empty");
                return;
            }
        };
        match serde_json::from_slice::<Vec<Turn>>(&bytes) {
            Ok(turns) => self.turns = turns,
            Err(e) => {
                warn!(key = %self.key, error = %e, "corrupt conversation log; starting empty");
            }
        }
    }

    /// Write the log to the backing store. Fail-soft.
    pub fn persist(&mut self) {
        let bytes = match serde_json::to_vec(&self.turns) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to serialize conversation log");
                return;
            }
        };
        if let Err(e) = self.backing.set(&self.key, &bytes) {
            warn!(key = %self.key, error = %e, "failed to persist conversation log; keeping in-memory state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SqliteDocumentStore;
    use joi_types::Speaker;

    fn make_log(retention: usize) -> ConversationLog {
        let backing = SqliteDocumentStore::open_in_memory().unwrap();
        ConversationLog::open("historial", retention, Box::new(backing))
    }

    #[test]
    fn recent_returns_chronological_tail() {
        let mut log = make_log(10);
        log.append(Turn::user("uno"));
        log.append(Turn::assistant("dos"));
        log.append(Turn::user("tres"));

        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "dos");
        assert_eq!(recent[1].text, "tres");
    }

    #[test]
    fn recent_with_n_beyond_len_returns_whole_log() {
        let mut log = make_log(10);
        log.append(Turn::user("hola"));
        assert_eq!(log.recent(30).len(), 1);
    }

    #[test]
    fn recent_on_empty_log_is_empty() {
        let log = make_log(10);
        assert!(log.recent(5).is_empty());
    }

    #[test]
    fn append_trims_from_the_head() {
        let mut log = make_log(3);
        for i in 0..5 {
            log.append(Turn::user(format!("turno {i}")));
        }
        assert_eq!(log.len(), 3);
        // The oldest turns were dropped; order is preserved.
        assert_eq!(log.recent(3)[0].text, "turno 2");
        assert_eq!(log.recent(3)[2].text, "turno 4");
    }

    #[test]
    fn log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backing = crate::document::FileDocumentStore::new(dir.path());
            let mut log = ConversationLog::open("historial", 10, Box::new(backing));
            log.append(Turn::user("hola Joi"));
            log.append(Turn::assistant("hola Juan"));
        }
        let backing = crate::document::FileDocumentStore::new(dir.path());
        let log = ConversationLog::open("historial", 10, Box::new(backing));
        assert_eq!(log.len(), 2);
        assert_eq!(log.recent(1)[0].speaker, Speaker::Assistant);
    }

    #[test]
    fn corrupt_log_starts_empty() {
        let mut backing = SqliteDocumentStore::open_in_memory().unwrap();
        backing.set("historial", b"not json at all").unwrap();
        let log = ConversationLog::open("historial", 10, Box::new(backing));
        assert!(log.is_empty());
    }
}
