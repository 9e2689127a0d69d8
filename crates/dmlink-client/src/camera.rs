//! Image acquisition.
//!
//! An image request carries the geometry in its long arguments and exposure
//! and settling time in its doubles. The host answers with five longs
//! (status, pixel count, width, height, chunk count) and then streams the
//! pixels as described in [`chunk`](crate::chunk).

use dmlink_core::{CameraGeometry, FunctionCode, Message, MessageShape, ProcessingMode};

use crate::chunk::{self, Image, TransferStats};
use crate::client::Client;
use crate::error::{AcquisitionFailure, ClientError};

const IMAGE_RESPONSE: MessageShape = MessageShape::new(5, 0, 0);

/// A received frame and how it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    pub function: FunctionCode,
    pub image: Image,
    pub stats: TransferStats,
}

/// Build the request for `geometry`.
///
/// Acquired images send the processing flag after the dimensions and the
/// shutter delay after the shutter; dark references send neither.
pub fn acquisition_request(geometry: &CameraGeometry) -> Message {
    let g = geometry;
    let function = g.processing.function();
    let mut longs = vec![g.pixel_count(), g.width, g.height];
    if let Some(flag) = g.processing.flag() {
        longs.push(flag);
    }
    longs.extend([g.binning, g.top, g.left, g.bottom, g.right, g.shutter]);
    if g.processing != ProcessingMode::Dark {
        longs.push(g.shutter_delay_ms);
    }
    longs.extend([i64::from(g.divide_by_2), g.corrections]);

    Message::call(function)
        .longs(longs)
        .doubles([g.exposure, g.settling])
}

impl Client {
    /// Acquire one frame as described by `geometry`.
    pub fn acquire(&mut self, geometry: &CameraGeometry) -> Result<Image, ClientError> {
        Ok(self.acquire_detailed(geometry)?.image)
    }

    /// Acquire a dark reference with the region and binning of `geometry`.
    pub fn dark_reference(&mut self, geometry: &CameraGeometry) -> Result<Image, ClientError> {
        self.acquire(&geometry.with_processing(ProcessingMode::Dark))
    }

    pub fn acquire_detailed(&mut self, geometry: &CameraGeometry) -> Result<Acquisition, ClientError> {
        geometry.validate()?;
        let function = geometry.processing.function();
        let failed = |reason| ClientError::AcquisitionFailed {
            function,
            geometry: *geometry,
            reason,
        };

        let request = acquisition_request(geometry);
        let response = self.channel.exchange(&request, IMAGE_RESPONSE)?;
        let status = response.head();
        if status < 0 {
            tracing::warn!(%function, status, %geometry, "acquisition refused");
            return Err(failed(AcquisitionFailure::Status(status)));
        }

        let header = |i| response.long(i).unwrap_or_default();
        let (pixels, width, height, chunks) = (header(1), header(2), header(3), header(4));

        // Past this point the host is already streaming pixels, so any
        // disagreement leaves the connection out of step.
        let reason = if (width, height) != (geometry.width, geometry.height) {
            Some(AcquisitionFailure::Dimensions { width, height })
        } else if pixels != geometry.pixel_count() {
            Some(AcquisitionFailure::PixelCount {
                reported: pixels,
                expected: geometry.pixel_count(),
            })
        } else if chunks < 1 {
            Some(AcquisitionFailure::ChunkCount(chunks))
        } else {
            None
        };
        if let Some(reason) = reason {
            tracing::warn!(%function, %geometry, %reason, "host announced an unexpected image; dropping connection");
            self.channel.disconnect();
            return Err(failed(reason));
        }

        // Validated geometry, so both are positive and their product fits.
        let (w, h) = (width as usize, height as usize);
        let (image, stats) = match chunk::receive_image(&mut self.channel, w, h, chunks as usize) {
            Ok(received) => received,
            Err(e) => {
                self.channel.disconnect();
                return Err(e);
            }
        };
        tracing::debug!(
            %function,
            width,
            height,
            chunks = stats.chunks,
            handshakes = stats.handshakes,
            "image received"
        );
        Ok(Acquisition {
            function,
            image,
            stats,
        })
    }
}
