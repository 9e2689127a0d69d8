//! One TCP connection to the host plugin.
//!
//! The protocol has no framing beyond the size header and no request ids, so
//! a [`Channel`] is strictly half-duplex: write one request, read exactly the
//! bytes of the expected response, repeat. Reads loop until the record is
//! complete; a short read is normal, a read of zero bytes means the host went
//! away.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

use dmlink_core::wire::{self, MAX_MESSAGE_SIZE};
use dmlink_core::{Message, MessageShape, WireLayout};

use crate::error::ClientError;
use crate::log::{MessageLog, NoLog};

pub struct Channel {
    host: String,
    port: u16,
    layout: WireLayout,
    stream: Option<TcpStream>,
    /// Reused for every encoded request and every response record.
    scratch: Vec<u8>,
    log: Box<dyn MessageLog>,
}

impl Channel {
    /// A channel to `host:port`. Nothing is opened until [`connect`](Self::connect).
    pub fn new(host: impl Into<String>, port: u16, layout: WireLayout) -> Self {
        Self {
            host: host.into(),
            port,
            layout,
            stream: None,
            scratch: Vec::with_capacity(MAX_MESSAGE_SIZE),
            log: Box::new(NoLog),
        }
    }

    pub fn with_log(mut self, log: Box<dyn MessageLog>) -> Self {
        self.log = log;
        self
    }

    pub fn set_log(&mut self, log: Box<dyn MessageLog>) {
        self.log = log;
    }

    pub fn layout(&self) -> WireLayout {
        self.layout
    }

    pub fn peer(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Open the connection, closing any previous one first.
    pub fn connect(&mut self) -> Result<(), ClientError> {
        self.disconnect();
        let stream = TcpStream::connect((self.host.as_str(), self.port)).map_err(|e| {
            self.log.failed(&e);
            e
        })?;
        stream.set_nodelay(true)?;
        tracing::debug!(host = %self.host, port = self.port, "connected");
        self.stream = Some(stream);
        Ok(())
    }

    /// Close the connection. Safe to call when already closed.
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            tracing::debug!(host = %self.host, port = self.port, "disconnected");
        }
    }

    pub fn reconnect(&mut self) -> Result<(), ClientError> {
        self.connect()
    }

    /// Write one request. No response is read.
    pub fn send(&mut self, request: &Message) -> Result<(), ClientError> {
        wire::encode_into(request, self.layout, &mut self.scratch)?;
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        if let Err(e) = stream.write_all(&self.scratch) {
            self.log.failed(&e);
            return Err(e.into());
        }
        self.log.sent(request, &self.scratch);
        Ok(())
    }

    /// Read one response record of the given shape.
    pub fn receive(&mut self, shape: MessageShape) -> Result<Message, ClientError> {
        let len = shape.byte_len(self.layout);
        if len > MAX_MESSAGE_SIZE {
            return Err(wire::WireError::MessageTooLarge {
                size: len,
                max: MAX_MESSAGE_SIZE,
            }
            .into());
        }
        self.scratch.clear();
        self.scratch.resize(len, 0);

        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        let mut filled = 0;
        while filled < len {
            match stream.read(&mut self.scratch[filled..]) {
                Ok(0) => {
                    let e = io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("host closed the connection after {filled} of {len} bytes"),
                    );
                    self.log.failed(&e);
                    return Err(e.into());
                }
                Ok(n) => {
                    self.log.received(&self.scratch[filled..filled + n]);
                    filled += n;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.log.failed(&e);
                    return Err(e.into());
                }
            }
        }
        Ok(wire::decode(&self.scratch, shape, self.layout)?)
    }

    /// Send `request` and read its response.
    pub fn exchange(&mut self, request: &Message, shape: MessageShape) -> Result<Message, ClientError> {
        self.send(request)?;
        let response = self.receive(shape)?;
        self.log.exchanged(request, &response);
        Ok(response)
    }

    /// One read of raw payload bytes into `dst`. Returns 0 at end of stream.
    pub fn read_raw(&mut self, dst: &mut [u8]) -> Result<usize, ClientError> {
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        loop {
            match stream.read(dst) {
                Ok(n) => {
                    if n > 0 {
                        self.log.received(&dst[..n]);
                    }
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.log.failed(&e);
                    return Err(e.into());
                }
            }
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("layout", &self.layout)
            .field("connected", &self.is_connected())
            .finish()
    }
}
