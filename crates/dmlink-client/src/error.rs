use std::io;
use std::time::Duration;

use dmlink_core::function::RegistryError;
use dmlink_core::geometry::GeometryError;
use dmlink_core::wire::WireError;
use dmlink_core::{CameraGeometry, FunctionCode};

/// Every failure a client call can surface. Nothing is retried internally.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    #[error("not connected to the host")]
    NotConnected,

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("invalid geometry: {0}")]
    Geometry(#[from] GeometryError),

    #[error("{function} returned status {status}")]
    Status { function: FunctionCode, status: i64 },

    #[error("{function} failed for {geometry}: {reason}")]
    AcquisitionFailed {
        function: FunctionCode,
        geometry: CameraGeometry,
        reason: AcquisitionFailure,
    },

    #[error("image transfer ended after {received} of {expected} bytes")]
    IncompleteImage { expected: usize, received: usize },

    #[error("camera worker has stopped")]
    WorkerGone,

    #[error("no reply within {0:?}; the connection will be re-established before the next call")]
    Timeout(Duration),
}

/// Why the host's answer to an image request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquisitionFailure {
    #[error("host reported status {0}")]
    Status(i64),

    #[error("host returned {width}x{height}")]
    Dimensions { width: i64, height: i64 },

    #[error("host announced {reported} pixels, expected {expected}")]
    PixelCount { reported: i64, expected: i64 },

    #[error("host announced {0} chunks")]
    ChunkCount(i64),
}

impl ClientError {
    /// True when the connection can no longer be trusted to be in step with the host.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::NotConnected
                | ClientError::IncompleteImage { .. }
                | ClientError::Timeout(_)
        )
    }
}
