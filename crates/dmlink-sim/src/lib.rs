//! dmlink-sim: a stand-in acquisition host.
//!
//! Speaks the plugin's socket protocol over loopback: the fixed-shape
//! functions, script execution with a tiny interpreter, and chunked image
//! transfer with a deterministic pixel pattern. Fault knobs let tests force
//! the failure paths a real host only produces occasionally.

pub mod host;
pub mod script;
mod session;

use std::collections::{BTreeMap, BTreeSet};

use dmlink_core::{FunctionCode, Message, WireLayout};

pub use host::{SimHandle, SimHost};
pub use script::ScriptEngine;

/// Script functions a default host claims to have: the `IF*` filter API.
pub const DEFAULT_SCRIPT_FUNCTIONS: [&str; 7] = [
    "IFGetSlitIn",
    "IFSetSlitIn",
    "IFGetSlitWidth",
    "IFSetSlitWidth",
    "IFGetEnergyLoss",
    "IFSetEnergyLoss",
    "IFWaitForFilter",
];

#[derive(Debug, Clone)]
pub struct SimOptions {
    pub layout: WireLayout,
    pub dm_version: i64,
    pub plugin_version: i64,
    pub cameras: i64,
    /// Names `DoesFunctionExist` reports as defined.
    pub script_functions: BTreeSet<String>,
    /// Pieces each image is split into.
    pub chunks: usize,
    /// Largest single write while streaming pixels.
    pub fragment: usize,
    /// Answer every image request with this status and send no pixels.
    pub image_status: Option<i64>,
    /// Status returned with every script result.
    pub script_status: Option<i64>,
    /// Announce these dimensions (and stream that many pixels) instead of the requested ones.
    pub reported_size: Option<(i64, i64)>,
    /// Close the connection after this many payload bytes.
    pub truncate_after: Option<usize>,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            layout: WireLayout::default(),
            dm_version: 40300,
            plugin_version: 107,
            cameras: 1,
            script_functions: DEFAULT_SCRIPT_FUNCTIONS.iter().map(|s| s.to_string()).collect(),
            chunks: 1,
            fragment: 16 * 1024,
            image_status: None,
            script_status: None,
            reported_size: None,
            truncate_after: None,
        }
    }
}

impl SimOptions {
    pub fn with_layout(mut self, layout: WireLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_chunks(mut self, chunks: usize) -> Self {
        self.chunks = chunks;
        self
    }

    pub fn with_fragment(mut self, bytes: usize) -> Self {
        self.fragment = bytes.max(1);
        self
    }

    pub fn with_script_functions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script_functions = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_image_status(mut self, status: i64) -> Self {
        self.image_status = Some(status);
        self
    }

    pub fn with_script_status(mut self, status: i64) -> Self {
        self.script_status = Some(status);
        self
    }

    pub fn with_reported_size(mut self, width: i64, height: i64) -> Self {
        self.reported_size = Some((width, height));
        self
    }

    pub fn with_truncation(mut self, after_bytes: usize) -> Self {
        self.truncate_after = Some(after_bytes);
        self
    }
}

/// What the simulated host has seen so far.
#[derive(Debug, Clone, Default)]
pub struct SimStats {
    pub connections: usize,
    /// Requests by function code, handshakes included.
    pub requests: BTreeMap<i64, usize>,
    pub handshakes: usize,
    /// Chunks whose transfer began, a truncated one included.
    pub chunks_sent: usize,
    pub scripts: Vec<String>,
    /// Most recent request other than a handshake.
    pub last_request: Option<Message>,
}

impl SimStats {
    pub fn count(&self, function: FunctionCode) -> usize {
        self.requests.get(&function.code()).copied().unwrap_or_default()
    }
}

/// Pixel `index` of every simulated image, row-major.
pub fn pattern_pixel(index: usize) -> u16 {
    (index.wrapping_mul(31).wrapping_add(index / 1024) & 0xFFFF) as u16
}

/// The first `count` pixels of the simulated pattern.
pub fn pattern(count: usize) -> Vec<u16> {
    (0..count).map(pattern_pixel).collect()
}
