//! Persistent notes and script files on the host.

use std::path::Path;

use crate::client::Client;
use crate::error::ClientError;
use crate::script::ScriptReply;

/// Prefix that makes the host run a script without blocking its UI thread.
pub const BACKGROUND_PREFIX: &str = "// $BACKGROUND$\n\n";

#[derive(Debug, Clone, PartialEq)]
pub enum NoteValue {
    Number(f64),
    Text(String),
}

impl From<f64> for NoteValue {
    fn from(v: f64) -> Self {
        NoteValue::Number(v)
    }
}

impl From<i64> for NoteValue {
    fn from(v: i64) -> Self {
        NoteValue::Number(v as f64)
    }
}

impl From<&str> for NoteValue {
    fn from(v: &str) -> Self {
        NoteValue::Text(v.to_string())
    }
}

impl From<String> for NoteValue {
    fn from(v: String) -> Self {
        NoteValue::Text(v)
    }
}

/// Quote `text` as a script string literal.
fn literal(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

pub fn set_note_script(key: &str, value: &NoteValue) -> String {
    match value {
        NoteValue::Number(n) => format!("SetPersistentNumberNote({}, {n})", literal(key)),
        NoteValue::Text(t) => format!("SetPersistentStringNote({}, {})", literal(key), literal(t)),
    }
}

pub fn get_note_script(key: &str) -> String {
    format!(
        "number value\nGetPersistentNumberNote({}, value)\nExit(value)",
        literal(key)
    )
}

pub fn delete_note_script(key: &str) -> String {
    format!("DeletePersistentNote({})", literal(key))
}

impl Client {
    pub fn set_note(&mut self, key: &str, value: impl Into<NoteValue>) -> Result<ScriptReply, ClientError> {
        self.execute_script(&set_note_script(key, &value.into()))
    }

    /// Numeric note `key`. The host yields 0.0 for a missing note.
    pub fn get_note(&mut self, key: &str) -> Result<f64, ClientError> {
        self.execute_for_double(&get_note_script(key))
    }

    pub fn delete_note(&mut self, key: &str) -> Result<ScriptReply, ClientError> {
        self.execute_script(&delete_note_script(key))
    }

    /// Read `key` and remove it.
    pub fn take_note(&mut self, key: &str) -> Result<f64, ClientError> {
        let value = self.get_note(key)?;
        self.delete_note(key)?;
        Ok(value)
    }

    /// Run the script in `path`. With `background` set the host returns
    /// immediately and the script keeps running.
    pub fn run_script_file(&mut self, path: &Path, background: bool) -> Result<ScriptReply, ClientError> {
        let body = std::fs::read_to_string(path)?;
        let script = if background {
            format!("{BACKGROUND_PREFIX}{body}")
        } else {
            body
        };
        tracing::debug!(path = %path.display(), background, "running script file");
        self.execute_script(&script)
    }
}
