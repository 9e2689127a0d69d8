//! Per-message hooks for inspecting traffic.
//!
//! A [`Channel`](crate::Channel) reports every record it sends and every read
//! it completes to a [`MessageLog`]. The default is [`NoLog`], whose methods
//! are empty.

use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use dmlink_core::config::DebugConfig;
use dmlink_core::Message;

/// Observer for the bytes crossing one channel.
pub trait MessageLog: Send {
    /// A complete request was written.
    fn sent(&mut self, _request: &Message, _bytes: &[u8]) {}

    /// One read returned `bytes`. Responses and pixel chunks may arrive in
    /// several reads.
    fn received(&mut self, _bytes: &[u8]) {}

    /// A request/response pair completed.
    fn exchanged(&mut self, _request: &Message, _response: &Message) {}

    /// The transport failed.
    fn failed(&mut self, _error: &io::Error) {}
}

/// Logs nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLog;

impl MessageLog for NoLog {}

/// Forwards traffic to `tracing`. Summaries go out at debug; hex dumps of
/// every record and read go out at trace only when `raw_bytes` is set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TracingLog {
    pub raw_bytes: bool,
}

impl TracingLog {
    /// The log for a `[debug]` level: none at 0, summaries at 1, raw bytes
    /// from 2 up.
    pub fn for_level(level: u8) -> Option<Self> {
        match level {
            0 => None,
            1 => Some(Self { raw_bytes: false }),
            _ => Some(Self { raw_bytes: true }),
        }
    }
}

impl MessageLog for TracingLog {
    fn sent(&mut self, request: &Message, bytes: &[u8]) {
        if self.raw_bytes {
            tracing::trace!(
                function = request.head(),
                len = bytes.len(),
                data = %hex::encode(bytes),
                "sent"
            );
        } else {
            tracing::debug!(function = request.head(), len = bytes.len(), "sent");
        }
    }

    fn received(&mut self, bytes: &[u8]) {
        if self.raw_bytes {
            tracing::trace!(len = bytes.len(), data = %hex::encode(bytes), "received");
        }
    }

    fn exchanged(&mut self, request: &Message, response: &Message) {
        tracing::debug!(function = request.head(), status = response.head(), "exchange complete");
    }

    fn failed(&mut self, error: &io::Error) {
        tracing::debug!(error = %error, "transport failed");
    }
}

/// Appends one tab-separated line per event: `<unix seconds>\t<direction>\t<hex>`.
pub struct FileLog {
    out: LineWriter<File>,
}

impl FileLog {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: LineWriter::new(file),
        })
    }

    fn line(&mut self, direction: &str, body: &str) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        if let Err(e) = writeln!(self.out, "{now:.6}\t{direction}\t{body}") {
            tracing::warn!(error = %e, "message log write failed");
        }
    }
}

impl MessageLog for FileLog {
    fn sent(&mut self, _request: &Message, bytes: &[u8]) {
        self.line("send", &hex::encode(bytes));
    }

    fn received(&mut self, bytes: &[u8]) {
        self.line("recv", &hex::encode(bytes));
    }

    fn failed(&mut self, error: &io::Error) {
        self.line("fail", &error.to_string());
    }
}

/// Fans every event out to several logs.
#[derive(Default)]
pub struct MultiLog(pub Vec<Box<dyn MessageLog>>);

impl MessageLog for MultiLog {
    fn sent(&mut self, request: &Message, bytes: &[u8]) {
        self.0.iter_mut().for_each(|l| l.sent(request, bytes));
    }

    fn received(&mut self, bytes: &[u8]) {
        self.0.iter_mut().for_each(|l| l.received(bytes));
    }

    fn exchanged(&mut self, request: &Message, response: &Message) {
        self.0.iter_mut().for_each(|l| l.exchanged(request, response));
    }

    fn failed(&mut self, error: &io::Error) {
        self.0.iter_mut().for_each(|l| l.failed(error));
    }
}

/// Build the log selected by the `[debug]` config section.
///
/// Level 0 with no path yields [`NoLog`]. A non-zero level adds a
/// [`TracingLog`] (see [`TracingLog::for_level`]); a `log_path` adds a
/// [`FileLog`].
pub fn from_config(debug: &DebugConfig) -> io::Result<Box<dyn MessageLog>> {
    let mut logs: Vec<Box<dyn MessageLog>> = Vec::new();
    if let Some(tracing_log) = TracingLog::for_level(debug.level) {
        logs.push(Box::new(tracing_log));
    }
    if let Some(path) = &debug.log_path {
        logs.push(Box::new(FileLog::open(path)?));
    }
    Ok(match logs.len() {
        0 => Box::new(NoLog),
        1 => logs.remove(0),
        _ => Box::new(MultiLog(logs)),
    })
}
