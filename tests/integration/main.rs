//! dmlink integration test harness.
//!
//! Every test starts its own simulated host on a loopback port, so tests are
//! independent and run in parallel:
//!
//!   cargo test --test integration
//!
//! The simulated host stops when its handle drops at the end of each test.

use std::sync::{Arc, Mutex};

use dmlink_client::{Channel, Client, MessageLog};
use dmlink_core::{FunctionCode, Message};
use dmlink_sim::{SimHandle, SimHost, SimOptions};

// ── Harness ───────────────────────────────────────────────────────────────────

/// Start a simulated host with `options`.
pub fn sim(options: SimOptions) -> SimHandle {
    SimHost::spawn(options).expect("simulated host should start")
}

/// Connect a client to `host` using the host's wire layout.
pub fn connect(host: &SimHandle) -> Client {
    let mut channel = Channel::new("127.0.0.1", host.port(), host.options().layout);
    channel.connect().expect("client should connect to the simulated host");
    Client::new(channel)
}

/// Like [`connect`], but every request the client sends is recorded.
pub fn connect_recorded(host: &SimHandle) -> (Client, Recorder) {
    let recorder = Recorder::default();
    let mut client = connect(host);
    client.channel().set_log(Box::new(recorder.clone()));
    (client, recorder)
}

/// Function codes of the requests a channel sent, in order.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<i64>>>);

impl Recorder {
    pub fn codes(&self) -> Vec<i64> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, function: FunctionCode) -> usize {
        self.codes().iter().filter(|&&c| c == function.code()).count()
    }
}

impl MessageLog for Recorder {
    fn sent(&mut self, request: &Message, _bytes: &[u8]) {
        self.0.lock().unwrap().push(request.head());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

mod acquisition;
mod codec;
mod functions;
mod scripts;
mod transport;
mod worker;
