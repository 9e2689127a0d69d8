//! Camera geometry and processing mode for one acquisition request.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::function::FunctionCode;
use crate::wire::BYTES_PER_PIXEL;

/// How the host processes a frame before returning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// A dark reference, read with the shutter closed.
    Dark,
    Unprocessed,
    DarkSubtracted,
    GainNormalized,
}

impl ProcessingMode {
    /// Function that serves this mode.
    pub const fn function(self) -> FunctionCode {
        match self {
            ProcessingMode::Dark => FunctionCode::GetDarkReference,
            _ => FunctionCode::GetAcquiredImage,
        }
    }

    /// Processing flag sent with an acquired-image request. Dark references carry none.
    pub const fn flag(self) -> Option<i64> {
        match self {
            ProcessingMode::Dark => None,
            ProcessingMode::Unprocessed => Some(0),
            ProcessingMode::DarkSubtracted => Some(1),
            ProcessingMode::GainNormalized => Some(2),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ProcessingMode::Dark => "dark",
            ProcessingMode::Unprocessed => "unprocessed",
            ProcessingMode::DarkSubtracted => "dark subtracted",
            ProcessingMode::GainNormalized => "gain normalized",
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingMode {
    type Err = GeometryError;

    /// Accepts `gain normalized`, `gain_normalized` and `gain-normalized` alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', '-'], " ").as_str() {
            "dark" => Ok(ProcessingMode::Dark),
            "unprocessed" => Ok(ProcessingMode::Unprocessed),
            "dark subtracted" => Ok(ProcessingMode::DarkSubtracted),
            "gain normalized" => Ok(ProcessingMode::GainNormalized),
            _ => Err(GeometryError::UnknownProcessing(s.to_string())),
        }
    }
}

/// Readout region, binning and exposure for one frame.
///
/// `top`/`left`/`bottom`/`right` are unbinned sensor coordinates.
/// `width`/`height` are the dimensions of the returned image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraGeometry {
    pub width: i64,
    pub height: i64,
    pub binning: i64,
    pub top: i64,
    pub left: i64,
    pub bottom: i64,
    pub right: i64,
    pub processing: ProcessingMode,
    /// Seconds.
    pub exposure: f64,
    /// Milliseconds. Not sent for dark references.
    pub shutter_delay_ms: i64,
    /// Seconds.
    pub settling: f64,
    pub shutter: i64,
    pub divide_by_2: bool,
    pub corrections: i64,
}

impl CameraGeometry {
    /// Read the whole sensor at `binning`.
    pub fn full_frame(sensor_width: i64, sensor_height: i64, binning: i64) -> Self {
        let div = binning.max(1);
        Self {
            width: sensor_width / div,
            height: sensor_height / div,
            binning,
            top: 0,
            left: 0,
            bottom: sensor_height,
            right: sensor_width,
            processing: ProcessingMode::GainNormalized,
            exposure: 0.4,
            shutter_delay_ms: 0,
            settling: 0.0,
            shutter: 0,
            divide_by_2: false,
            corrections: 0,
        }
    }

    pub fn with_exposure(mut self, seconds: f64) -> Self {
        self.exposure = seconds;
        self
    }

    pub fn with_processing(mut self, processing: ProcessingMode) -> Self {
        self.processing = processing;
        self
    }

    pub fn with_shutter_delay_ms(mut self, ms: i64) -> Self {
        self.shutter_delay_ms = ms;
        self
    }

    /// Pixels in the returned image.
    pub fn pixel_count(&self) -> i64 {
        self.width.saturating_mul(self.height)
    }

    /// Bytes of the returned pixel payload.
    pub fn payload_len(&self) -> i64 {
        self.pixel_count().saturating_mul(BYTES_PER_PIXEL as i64)
    }

    /// Reject geometries that imply empty or negative extents.
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.binning < 1 {
            return Err(GeometryError::Binning(self.binning));
        }
        if self.width <= 0 || self.height <= 0 {
            return Err(GeometryError::EmptyImage {
                width: self.width,
                height: self.height,
            });
        }
        if self.top < 0 || self.left < 0 || self.bottom <= self.top || self.right <= self.left {
            return Err(GeometryError::EmptyRegion {
                top: self.top,
                left: self.left,
                bottom: self.bottom,
                right: self.right,
            });
        }
        if !self.exposure.is_finite() || self.exposure < 0.0 {
            return Err(GeometryError::Exposure(self.exposure));
        }
        if !self.settling.is_finite() || self.settling < 0.0 {
            return Err(GeometryError::Settling(self.settling));
        }
        if self.shutter_delay_ms < 0 {
            return Err(GeometryError::ShutterDelay(self.shutter_delay_ms));
        }
        if self.width.checked_mul(self.height).is_none() {
            return Err(GeometryError::TooLarge {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

impl fmt::Display for CameraGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} bin {} region [{}, {}, {}, {}] {} {}s",
            self.width,
            self.height,
            self.binning,
            self.top,
            self.left,
            self.bottom,
            self.right,
            self.processing,
            self.exposure
        )
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("binning must be at least 1, got {0}")]
    Binning(i64),

    #[error("image dimensions {width}x{height} are empty")]
    EmptyImage { width: i64, height: i64 },

    #[error("readout region [{top}, {left}, {bottom}, {right}] is empty or negative")]
    EmptyRegion {
        top: i64,
        left: i64,
        bottom: i64,
        right: i64,
    },

    #[error("exposure must be a non-negative number of seconds, got {0}")]
    Exposure(f64),

    #[error("settling must be a non-negative number of seconds, got {0}")]
    Settling(f64),

    #[error("shutter delay must be non-negative, got {0} ms")]
    ShutterDelay(i64),

    #[error("image {width}x{height} is too large")]
    TooLarge { width: i64, height: i64 },

    #[error("unknown processing mode: {0}")]
    UnknownProcessing(String),
}
