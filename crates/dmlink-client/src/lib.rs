//! dmlink-client: drives a camera through the host's socket plugin.
//!
//! One [`Client`] owns one [`Channel`] (one TCP connection). Calls are
//! synchronous and strictly ordered: each request is answered before the next
//! is sent. To use a client from async code, move it onto a
//! [`CameraWorker`] and talk to it through the returned [`CameraHandle`].

pub mod camera;
pub mod chunk;
pub mod client;
pub mod error;
pub mod filter;
pub mod functions;
pub mod log;
pub mod notes;
pub mod script;
pub mod transport;
pub mod worker;

pub use camera::Acquisition;
pub use chunk::{Image, TransferStats};
pub use client::Client;
pub use error::{AcquisitionFailure, ClientError};
pub use filter::EnergyFilter;
pub use log::MessageLog;
pub use script::{ReturnKind, ScriptReply, ScriptValue, UNSUPPORTED_DOUBLE, UNSUPPORTED_LONG};
pub use transport::Channel;
pub use worker::{CameraHandle, CameraWorker};
