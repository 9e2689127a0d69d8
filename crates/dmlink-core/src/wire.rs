//! dmlink wire format: the single record type exchanged with the host plugin.
//!
//! Every request and every response is one flat record, blocks back to back
//! with no padding:
//!
//! ```text
//! [size: i32][long_args: N x long][bool_args: M x i32][double_args: K x f64][trailing: L x long]
//! ```
//!
//! `size` is the byte length of the whole record. The block counts are NOT on
//! the wire: both ends agree on them per function code, so decoding always
//! needs the expected [`MessageShape`]. Changing a shape for an existing
//! function code breaks compatibility with the host.
//!
//! Byte order and the width of a `long` are fixed per connection by
//! [`WireLayout`]. The host plugin runs on Windows, where a C `long` is
//! 4 bytes, and that is the default. There is no unsafe code in this module.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use zerocopy::byteorder::{ByteOrder as Endian, LittleEndian, NativeEndian};

use crate::function::FunctionCode;

// ── Limits ────────────────────────────────────────────────────────────────────

/// Maximum serialized record size, header included.
/// The host reads every message into a buffer of exactly this size.
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Capacity of the host's long argument block.
pub const MAX_LONG_ARGS: usize = 16;

/// Capacity of the host's bool argument block.
pub const MAX_BOOL_ARGS: usize = 8;

/// Capacity of the host's double argument block.
pub const MAX_DOUBLE_ARGS: usize = 8;

const SIZE_FIELD_BYTES: usize = 4;
const BOOL_BYTES: usize = 4;
const DOUBLE_BYTES: usize = 8;

// A maximal argument set with 8-byte longs must still leave room for a payload.
const_assert!(
    SIZE_FIELD_BYTES + MAX_LONG_ARGS * 8 + MAX_BOOL_ARGS * BOOL_BYTES + MAX_DOUBLE_ARGS * DOUBLE_BYTES
        < MAX_MESSAGE_SIZE
);

// ── Layout ────────────────────────────────────────────────────────────────────

/// Byte order of every multi-byte field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// Explicit little-endian. Identical to the host's layout on x86.
    #[default]
    Little,
    /// Whatever this machine uses. Only meaningful when client and host share an architecture.
    Native,
}

/// Width of a `long` argument on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LongWidth {
    /// 4 bytes, a C `long` on Windows.
    #[default]
    Four,
    /// 8 bytes, a C `long` on LP64 platforms.
    Eight,
}

impl LongWidth {
    pub const fn bytes(self) -> usize {
        match self {
            LongWidth::Four => 4,
            LongWidth::Eight => 8,
        }
    }
}

impl TryFrom<u8> for LongWidth {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(LongWidth::Four),
            8 => Ok(LongWidth::Eight),
            other => Err(WireError::UnsupportedLongWidth(other)),
        }
    }
}

impl From<LongWidth> for u8 {
    fn from(w: LongWidth) -> u8 {
        w.bytes() as u8
    }
}

/// How logical fields map to bytes for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WireLayout {
    pub byte_order: ByteOrder,
    pub long_width: LongWidth,
}

impl WireLayout {
    pub const fn new(byte_order: ByteOrder, long_width: LongWidth) -> Self {
        Self {
            byte_order,
            long_width,
        }
    }
}

// ── Message ───────────────────────────────────────────────────────────────────

/// Block counts of a message. Not self-describing on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageShape {
    pub longs: usize,
    pub bools: usize,
    pub doubles: usize,
    pub trailing: usize,
}

impl MessageShape {
    pub const fn new(longs: usize, bools: usize, doubles: usize) -> Self {
        Self {
            longs,
            bools,
            doubles,
            trailing: 0,
        }
    }

    pub const fn with_trailing(mut self, trailing: usize) -> Self {
        self.trailing = trailing;
        self
    }

    /// Serialized size of a record with this shape, header included.
    pub const fn byte_len(&self, layout: WireLayout) -> usize {
        SIZE_FIELD_BYTES
            + (self.longs + self.trailing) * layout.long_width.bytes()
            + self.bools * BOOL_BYTES
            + self.doubles * DOUBLE_BYTES
    }
}

/// One request or response record.
///
/// For requests `long_args[0]` is the function code. For responses it is the
/// status reported by the host.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    pub long_args: Vec<i64>,
    pub bool_args: Vec<bool>,
    pub double_args: Vec<f64>,
    pub trailing: Vec<i64>,
}

impl Message {
    /// Start a request for `function`.
    pub fn call(function: FunctionCode) -> Self {
        Self {
            long_args: vec![function.code()],
            ..Self::default()
        }
    }

    pub fn longs(mut self, args: impl IntoIterator<Item = i64>) -> Self {
        self.long_args.extend(args);
        self
    }

    pub fn bools(mut self, args: impl IntoIterator<Item = bool>) -> Self {
        self.bool_args.extend(args);
        self
    }

    pub fn doubles(mut self, args: impl IntoIterator<Item = f64>) -> Self {
        self.double_args.extend(args);
        self
    }

    /// Attach a trailing array. The host finds its length in the last long
    /// argument, so a non-empty array also appends its element count there.
    /// Call this last, after all other long arguments.
    pub fn trailing(mut self, array: Vec<i64>) -> Self {
        if !array.is_empty() {
            self.long_args.push(array.len() as i64);
        }
        self.trailing = array;
        self
    }

    pub fn shape(&self) -> MessageShape {
        MessageShape::new(
            self.long_args.len(),
            self.bool_args.len(),
            self.double_args.len(),
        )
        .with_trailing(self.trailing.len())
    }

    /// First long argument: function code of a request, status of a response.
    pub fn head(&self) -> i64 {
        self.long_args.first().copied().unwrap_or_default()
    }

    pub fn long(&self, index: usize) -> Option<i64> {
        self.long_args.get(index).copied()
    }

    pub fn bool(&self, index: usize) -> Option<bool> {
        self.bool_args.get(index).copied()
    }

    pub fn double(&self, index: usize) -> Option<f64> {
        self.double_args.get(index).copied()
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Serialize `message` into a new buffer.
pub fn encode(message: &Message, layout: WireLayout) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::with_capacity(MAX_MESSAGE_SIZE);
    encode_into(message, layout, &mut buf)?;
    Ok(buf)
}

/// Serialize `message` into `buf`, replacing its contents.
///
/// All limits are checked before a byte is written. On error `buf` is left
/// empty, never holding a partial record.
pub fn encode_into(message: &Message, layout: WireLayout, buf: &mut Vec<u8>) -> Result<(), WireError> {
    buf.clear();
    check_arg_counts(message)?;

    let size = message.shape().byte_len(layout);
    if size > MAX_MESSAGE_SIZE {
        return Err(WireError::MessageTooLarge {
            size,
            max: MAX_MESSAGE_SIZE,
        });
    }
    if layout.long_width == LongWidth::Four {
        if let Some(&v) = message
            .long_args
            .iter()
            .chain(&message.trailing)
            .find(|v| i32::try_from(**v).is_err())
        {
            return Err(WireError::LongOutOfRange(v));
        }
    }

    buf.resize(size, 0);
    match layout.byte_order {
        ByteOrder::Little => write_fields::<LittleEndian>(message, layout.long_width, buf),
        ByteOrder::Native => write_fields::<NativeEndian>(message, layout.long_width, buf),
    }
    Ok(())
}

/// Reinterpret the first `shape.byte_len(layout)` bytes of `bytes` as a message.
pub fn decode(bytes: &[u8], shape: MessageShape, layout: WireLayout) -> Result<Message, WireError> {
    let expected = shape.byte_len(layout);
    if bytes.len() < expected {
        return Err(WireError::TruncatedMessage {
            expected,
            actual: bytes.len(),
        });
    }
    let record = &bytes[..expected];
    match layout.byte_order {
        ByteOrder::Little => read_fields::<LittleEndian>(record, shape, layout.long_width),
        ByteOrder::Native => read_fields::<NativeEndian>(record, shape, layout.long_width),
    }
}

/// Read the leading size field of a record.
pub fn peek_size(bytes: &[u8], layout: WireLayout) -> Option<i32> {
    let head = bytes.get(..SIZE_FIELD_BYTES)?;
    Some(match layout.byte_order {
        ByteOrder::Little => LittleEndian::read_i32(head),
        ByteOrder::Native => NativeEndian::read_i32(head),
    })
}

fn check_arg_counts(message: &Message) -> Result<(), WireError> {
    let blocks = [
        ("long", message.long_args.len(), MAX_LONG_ARGS),
        ("bool", message.bool_args.len(), MAX_BOOL_ARGS),
        ("double", message.double_args.len(), MAX_DOUBLE_ARGS),
    ];
    for (kind, count, max) in blocks {
        if count > max {
            return Err(WireError::TooManyArgs { kind, count, max });
        }
    }
    Ok(())
}

fn write_fields<E: Endian>(message: &Message, width: LongWidth, buf: &mut [u8]) {
    let size = buf.len() as i32;
    let mut w = FieldWriter::<E>::new(buf, width);
    w.i32(size);
    for &v in &message.long_args {
        w.long(v);
    }
    for &b in &message.bool_args {
        w.i32(i32::from(b));
    }
    for &d in &message.double_args {
        w.f64(d);
    }
    for &v in &message.trailing {
        w.long(v);
    }
}

fn read_fields<E: Endian>(record: &[u8], shape: MessageShape, width: LongWidth) -> Result<Message, WireError> {
    let mut r = FieldReader::<E>::new(record, width);
    let declared = r.i32();
    if usize::try_from(declared).ok() != Some(record.len()) {
        return Err(WireError::SizeMismatch {
            declared,
            expected: record.len(),
        });
    }
    Ok(Message {
        long_args: (0..shape.longs).map(|_| r.long()).collect(),
        bool_args: (0..shape.bools).map(|_| r.i32() != 0).collect(),
        double_args: (0..shape.doubles).map(|_| r.f64()).collect(),
        trailing: (0..shape.trailing).map(|_| r.long()).collect(),
    })
}

/// Sequential field writer over a buffer sized exactly for the record.
struct FieldWriter<'a, E> {
    buf: &'a mut [u8],
    pos: usize,
    width: LongWidth,
    order: PhantomData<E>,
}

impl<'a, E: Endian> FieldWriter<'a, E> {
    fn new(buf: &'a mut [u8], width: LongWidth) -> Self {
        Self {
            buf,
            pos: 0,
            width,
            order: PhantomData,
        }
    }

    fn take(&mut self, n: usize) -> &mut [u8] {
        let start = self.pos;
        self.pos += n;
        &mut self.buf[start..start + n]
    }

    fn i32(&mut self, v: i32) {
        E::write_i32(self.take(4), v);
    }

    // Range was checked by the caller for 4-byte longs.
    fn long(&mut self, v: i64) {
        match self.width {
            LongWidth::Four => E::write_i32(self.take(4), v as i32),
            LongWidth::Eight => E::write_i64(self.take(8), v),
        }
    }

    fn f64(&mut self, v: f64) {
        E::write_f64(self.take(8), v);
    }
}

struct FieldReader<'a, E> {
    buf: &'a [u8],
    pos: usize,
    width: LongWidth,
    order: PhantomData<E>,
}

impl<'a, E: Endian> FieldReader<'a, E> {
    fn new(buf: &'a [u8], width: LongWidth) -> Self {
        Self {
            buf,
            pos: 0,
            width,
            order: PhantomData,
        }
    }

    fn take(&mut self, n: usize) -> &'a [u8] {
        let buf = self.buf;
        let start = self.pos;
        self.pos += n;
        &buf[start..start + n]
    }

    fn i32(&mut self) -> i32 {
        E::read_i32(self.take(4))
    }

    fn long(&mut self) -> i64 {
        match self.width {
            LongWidth::Four => i64::from(E::read_i32(self.take(4))),
            LongWidth::Eight => E::read_i64(self.take(8)),
        }
    }

    fn f64(&mut self) -> f64 {
        E::read_f64(self.take(8))
    }
}

// ── String payloads ───────────────────────────────────────────────────────────

/// Pack `text` for a trailing array: null terminator, null padding up to a
/// multiple of 4 bytes (and of the long width), then reinterpreted as longs.
pub fn pack_str(text: &str, layout: WireLayout) -> Vec<i64> {
    pack_strs(&[text], layout)
}

/// Pack several strings back to back, each with its own null terminator.
/// Padding is applied once, after the last one.
pub fn pack_strs(parts: &[&str], layout: WireLayout) -> Vec<i64> {
    let mut bytes = Vec::with_capacity(parts.iter().map(|p| p.len() + 1).sum::<usize>() + 8);
    for part in parts {
        bytes.extend_from_slice(part.as_bytes());
        bytes.push(0);
    }
    let align = layout.long_width.bytes().max(4);
    while bytes.len() % align != 0 {
        bytes.push(0);
    }
    bytes_to_longs(&bytes, layout)
}

/// Recover a string packed with [`pack_str`]: everything up to the first null.
pub fn unpack_str(array: &[i64], layout: WireLayout) -> String {
    let bytes = longs_to_bytes(array, layout);
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn bytes_to_longs(bytes: &[u8], layout: WireLayout) -> Vec<i64> {
    let width = layout.long_width.bytes();
    bytes
        .chunks_exact(width)
        .map(|c| match (layout.byte_order, layout.long_width) {
            (ByteOrder::Little, LongWidth::Four) => i64::from(LittleEndian::read_i32(c)),
            (ByteOrder::Little, LongWidth::Eight) => LittleEndian::read_i64(c),
            (ByteOrder::Native, LongWidth::Four) => i64::from(NativeEndian::read_i32(c)),
            (ByteOrder::Native, LongWidth::Eight) => NativeEndian::read_i64(c),
        })
        .collect()
}

fn longs_to_bytes(array: &[i64], layout: WireLayout) -> Vec<u8> {
    let width = layout.long_width.bytes();
    let mut bytes = vec![0u8; array.len() * width];
    for (chunk, &v) in bytes.chunks_exact_mut(width).zip(array) {
        match (layout.byte_order, layout.long_width) {
            (ByteOrder::Little, LongWidth::Four) => LittleEndian::write_i32(chunk, v as i32),
            (ByteOrder::Little, LongWidth::Eight) => LittleEndian::write_i64(chunk, v),
            (ByteOrder::Native, LongWidth::Four) => NativeEndian::write_i32(chunk, v as i32),
            (ByteOrder::Native, LongWidth::Eight) => NativeEndian::write_i64(chunk, v),
        }
    }
    bytes
}

// ── Pixel payloads ────────────────────────────────────────────────────────────

/// Bytes per pixel of every image this camera family returns (unsigned 16-bit).
pub const BYTES_PER_PIXEL: usize = 2;

/// Convert a raw pixel payload to `u16` values. `src` must hold exactly
/// `dst.len() * BYTES_PER_PIXEL` bytes.
pub fn read_pixels(src: &[u8], order: ByteOrder, dst: &mut [u16]) {
    match order {
        ByteOrder::Little => LittleEndian::read_u16_into(src, dst),
        ByteOrder::Native => NativeEndian::read_u16_into(src, dst),
    }
}

/// Inverse of [`read_pixels`].
pub fn write_pixels(src: &[u16], order: ByteOrder, dst: &mut [u8]) {
    match order {
        ByteOrder::Little => LittleEndian::write_u16_into(src, dst),
        ByteOrder::Native => NativeEndian::write_u16_into(src, dst),
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when producing or interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("message size {size} exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("{count} {kind} arguments exceed the host's capacity of {max}")]
    TooManyArgs {
        kind: &'static str,
        count: usize,
        max: usize,
    },

    #[error("value {0} does not fit a 4-byte long")]
    LongOutOfRange(i64),

    #[error("truncated message: need {expected} bytes, have {actual}")]
    TruncatedMessage { expected: usize, actual: usize },

    #[error("size header declares {declared} bytes, expected shape is {expected}")]
    SizeMismatch { declared: i32, expected: usize },

    #[error("unsupported long width: {0} bytes")]
    UnsupportedLongWidth(u8),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
