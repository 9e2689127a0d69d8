//! One client connection: read a request, answer it, repeat until EOF.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use dmlink_core::wire::{self, write_pixels, BYTES_PER_PIXEL, MAX_MESSAGE_SIZE};
use dmlink_core::{FunctionCode, Message, MessageShape, WireLayout};

use crate::host::SimState;
use crate::pattern;

/// Fixed blocks of each request; `true` if a trailing array follows.
fn request_blocks(function: Option<FunctionCode>) -> (MessageShape, bool) {
    use FunctionCode::*;
    match function {
        Some(ExecuteScript) => (MessageShape::new(2, 1, 0), true),
        Some(GetAcquiredImage) => (MessageShape::new(14, 0, 2), false),
        Some(GetDarkReference) => (MessageShape::new(12, 0, 2), false),
        Some(SetK2Parameters) => (MessageShape::new(4, 3, 2), true),
        Some(SetupFileSaving) => (MessageShape::new(3, 1, 1), true),
        Some(SetupFileSaving2) => (MessageShape::new(4, 1, 5), true),
        Some(IsCameraInserted) | Some(SelectCamera) => (MessageShape::new(2, 0, 0), false),
        Some(InsertCamera) => (MessageShape::new(2, 1, 0), false),
        Some(SetReadMode) => (MessageShape::new(2, 0, 1), false),
        Some(SetShutterNormallyClosed) => (MessageShape::new(3, 0, 0), false),
        _ => (MessageShape::new(1, 0, 0), false),
    }
}

/// Shape of a request of `size` bytes. Unknown functions are read as all longs.
fn request_shape(function: Option<FunctionCode>, size: usize, layout: WireLayout) -> Option<MessageShape> {
    let width = layout.long_width.bytes();
    let (fixed, trailing) = request_blocks(function);
    let fixed_len = fixed.byte_len(layout);
    if size < fixed_len {
        return None;
    }
    let extra = size - fixed_len;
    if function.is_none() || (!trailing && extra > 0) {
        return (extra % width == 0).then(|| {
            MessageShape::new(fixed.longs + extra / width, fixed.bools, fixed.doubles)
        });
    }
    (extra % width == 0).then(|| fixed.with_trailing(extra / width))
}

/// Read one request, or `None` at a clean end of stream.
async fn read_request(stream: &mut TcpStream, layout: WireLayout) -> io::Result<Option<Message>> {
    let mut header = [0u8; 4];
    match stream.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let declared = wire::peek_size(&header, layout).unwrap_or_default();
    let size = usize::try_from(declared)
        .ok()
        .filter(|s| (4..=MAX_MESSAGE_SIZE).contains(s))
        .ok_or_else(|| invalid(format!("request declares {declared} bytes")))?;

    let mut record = vec![0u8; size];
    record[..4].copy_from_slice(&header);
    stream.read_exact(&mut record[4..]).await?;

    let code = wire::decode(&record, MessageShape::new(1, 0, 0), layout)
        .map(|m| m.head())
        .unwrap_or_default();
    let function = FunctionCode::from_code(code).ok();
    let shape = request_shape(function, size, layout)
        .ok_or_else(|| invalid(format!("{size} bytes do not fit a request for code {code}")))?;
    let request = wire::decode(&record, shape, layout).map_err(|e| invalid(e.to_string()))?;
    Ok(Some(request))
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

async fn reply(stream: &mut TcpStream, response: &Message, layout: WireLayout) -> io::Result<()> {
    let bytes = wire::encode(response, layout).map_err(|e| invalid(e.to_string()))?;
    stream.write_all(&bytes).await
}

fn status(longs: &[i64]) -> Message {
    Message {
        long_args: longs.to_vec(),
        ..Message::default()
    }
}

pub(crate) async fn serve_connection(mut stream: TcpStream, state: Arc<SimState>) -> io::Result<()> {
    let layout = state.options.layout;
    stream.set_nodelay(true)?;
    while let Some(request) = read_request(&mut stream, layout).await? {
        let function = FunctionCode::from_code(request.head()).ok();
        state.record(&request);
        tracing::debug!(code = request.head(), "request");

        let response = match function {
            Some(FunctionCode::ExecuteScript) => {
                let script = wire::unpack_str(&request.trailing, layout);
                let value = state.run_script(script);
                let status = state.options.script_status.unwrap_or(0);
                Message::default().longs([status]).doubles([value])
            }
            Some(FunctionCode::GetAcquiredImage) | Some(FunctionCode::GetDarkReference) => {
                if !send_image(&mut stream, &state, &request).await? {
                    return Ok(());
                }
                continue;
            }
            Some(FunctionCode::ChunkHandshake) => {
                tracing::warn!("handshake outside an image transfer");
                continue;
            }
            Some(FunctionCode::GetDMVersion) => status(&[0, state.options.dm_version]),
            Some(FunctionCode::GetPluginVersion) => status(&[0, state.options.plugin_version]),
            Some(FunctionCode::GetNumberOfCameras) => status(&[0, state.options.cameras]),
            Some(FunctionCode::IsCameraInserted) => {
                let camera = request.long(1).unwrap_or_default();
                Message::default().longs([0]).bools([state.inserted(camera)])
            }
            Some(FunctionCode::InsertCamera) => {
                let camera = request.long(1).unwrap_or_default();
                state.set_inserted(camera, request.bool(0).unwrap_or_default());
                status(&[0])
            }
            Some(FunctionCode::SelectCamera) => {
                let camera = request.long(1).unwrap_or(-1);
                if (0..state.options.cameras).contains(&camera) {
                    status(&[0])
                } else {
                    status(&[-1])
                }
            }
            Some(FunctionCode::SetReadMode) | Some(FunctionCode::SetShutterNormallyClosed) => status(&[0]),
            Some(FunctionCode::SetK2Parameters) => status(&[0]),
            Some(FunctionCode::SetupFileSaving) | Some(FunctionCode::SetupFileSaving2) => status(&[0, 0]),
            _ => status(&[-1]),
        };
        reply(&mut stream, &response, layout).await?;
    }
    Ok(())
}

/// Answer an image request. Returns `false` once the connection should close.
async fn send_image(stream: &mut TcpStream, state: &SimState, request: &Message) -> io::Result<bool> {
    let options = &state.options;
    let layout = options.layout;

    if let Some(code) = options.image_status {
        reply(stream, &status(&[code, 0, 0, 0, 0]), layout).await?;
        return Ok(true);
    }

    let requested = (request.long(2).unwrap_or_default(), request.long(3).unwrap_or_default());
    let (width, height) = options.reported_size.unwrap_or(requested);
    let count = usize::try_from(width.max(0) * height.max(0)).unwrap_or_default();
    let chunks = options.chunks;
    reply(
        stream,
        &status(&[0, (width * height).max(0), width, height, chunks as i64]),
        layout,
    )
    .await?;

    let mut payload = vec![0u8; count * BYTES_PER_PIXEL];
    write_pixels(&pattern(count), layout.byte_order, &mut payload);

    let total = payload.len();
    let chunk_len = if chunks == 0 { 0 } else { total.div_ceil(chunks) };
    let limit = options.truncate_after.unwrap_or(usize::MAX).min(total);
    let mut sent = 0;

    for index in 0..chunks {
        if index > 0 {
            match read_request(stream, layout).await? {
                Some(r) if r.head() == FunctionCode::ChunkHandshake.code() => {
                    state.record(&r);
                }
                Some(r) => {
                    tracing::warn!(code = r.head(), "expected a chunk handshake");
                    return Ok(false);
                }
                None => return Ok(false),
            }
        }
        state.chunk_sent();
        let end = (sent + chunk_len).min(total);
        while sent < end {
            let stop = (sent + options.fragment).min(end).min(limit);
            if stop <= sent {
                tracing::info!(sent, total, "truncating image payload");
                stream.flush().await?;
                return Ok(false);
            }
            stream.write_all(&payload[sent..stop]).await?;
            stream.flush().await?;
            tokio::task::yield_now().await;
            sent = stop;
        }
    }
    Ok(true)
}
