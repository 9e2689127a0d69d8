//! Chunked receipt of an image payload.
//!
//! After announcing an image the host streams its pixels in `chunks` pieces.
//! Every piece except the first waits for a handshake request from the
//! client, which the host does not answer. Pieces are `ceil(total / chunks)`
//! bytes, the last one holding the remainder.

use dmlink_core::wire::{read_pixels, ByteOrder, BYTES_PER_PIXEL};
use dmlink_core::{FunctionCode, Message};

use crate::error::ClientError;
use crate::transport::Channel;

/// A received frame: `height` rows of `width` unsigned 16-bit pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: usize,
    height: usize,
    pixels: Vec<u16>,
}

impl Image {
    /// Build from a raw row-major payload of `width * height * 2` bytes.
    pub fn from_raw(width: usize, height: usize, raw: &[u8], order: ByteOrder) -> Self {
        let mut pixels = vec![0u16; width * height];
        read_pixels(&raw[..pixels.len() * BYTES_PER_PIXEL], order, &mut pixels);
        Self { width, height, pixels }
    }

    /// `None` unless `pixels.len() == width * height`.
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<u16>) -> Option<Self> {
        (pixels.len() == width * height).then_some(Self { width, height, pixels })
    }

    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u16> {
        self.pixels
    }

    pub fn get(&self, row: usize, col: usize) -> Option<u16> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.pixels.get(row * self.width + col).copied()
    }

    pub fn row(&self, row: usize) -> Option<&[u16]> {
        let start = row.checked_mul(self.width)?;
        self.pixels.get(start..start + self.width)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u16]> {
        self.pixels.chunks_exact(self.width.max(1))
    }

    /// Serialize the pixels, row-major, in `order`.
    pub fn to_bytes(&self, order: ByteOrder) -> Vec<u8> {
        let mut out = vec![0u8; self.pixels.len() * BYTES_PER_PIXEL];
        dmlink_core::wire::write_pixels(&self.pixels, order, &mut out);
        out
    }
}

/// Progress of one chunked transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkTransferState {
    pub total_bytes: usize,
    pub chunks: usize,
    pub received: usize,
}

impl ChunkTransferState {
    pub fn new(total_bytes: usize, chunks: usize) -> Self {
        Self {
            total_bytes,
            chunks,
            received: 0,
        }
    }

    /// Nominal bytes per chunk.
    pub fn chunk_len(&self) -> usize {
        chunk_len(self.total_bytes, self.chunks)
    }

    /// Bytes of chunk `index`. Trailing chunks past the end of the payload are empty.
    pub fn len_of(&self, index: usize) -> usize {
        let start = index.saturating_mul(self.chunk_len()).min(self.total_bytes);
        let end = start.saturating_add(self.chunk_len()).min(self.total_bytes);
        end - start
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.total_bytes
    }
}

/// `ceil(total / chunks)`. Zero chunks carry nothing.
pub fn chunk_len(total: usize, chunks: usize) -> usize {
    if chunks == 0 {
        0
    } else {
        total.div_ceil(chunks)
    }
}

/// Counters for one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferStats {
    pub chunks: usize,
    pub handshakes: usize,
    pub bytes: usize,
}

/// Receive a `width` x `height` image announced in `chunks` pieces.
///
/// Fails with [`ClientError::IncompleteImage`] if the host closes the stream
/// before every byte arrives.
pub fn receive_image(
    channel: &mut Channel,
    width: usize,
    height: usize,
    chunks: usize,
) -> Result<(Image, TransferStats), ClientError> {
    let total = width * height * BYTES_PER_PIXEL;
    let mut state = ChunkTransferState::new(total, chunks);
    let mut stats = TransferStats::default();
    let mut raw = vec![0u8; total];

    if chunks == 0 && total > 0 {
        return Err(ClientError::IncompleteImage {
            expected: total,
            received: 0,
        });
    }

    let handshake = Message::call(FunctionCode::ChunkHandshake);
    for index in 0..chunks {
        if index > 0 {
            channel.send(&handshake)?;
            stats.handshakes += 1;
        }
        let end = state.received + state.len_of(index);
        while state.received < end {
            let n = channel.read_raw(&mut raw[state.received..end])?;
            if n == 0 {
                tracing::warn!(chunk = index, received = state.received, expected = total, "image stream ended early");
                return Err(ClientError::IncompleteImage {
                    expected: total,
                    received: state.received,
                });
            }
            state.received += n;
        }
        stats.chunks += 1;
        tracing::trace!(chunk = index, of = chunks, received = state.received, "chunk complete");
    }

    if !state.is_complete() {
        return Err(ClientError::IncompleteImage {
            expected: total,
            received: state.received,
        });
    }
    stats.bytes = state.received;

    let image = Image::from_raw(width, height, &raw, channel.layout().byte_order);
    Ok((image, stats))
}
