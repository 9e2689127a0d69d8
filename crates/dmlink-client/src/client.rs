use dmlink_core::config::DmlinkConfig;
use dmlink_core::{FunctionCode, Message, MessageShape, WireLayout};

use crate::error::ClientError;
use crate::log;
use crate::transport::Channel;

/// A session with the host plugin over one [`Channel`].
///
/// The typed operations live in the modules that implement them:
/// [`camera`](crate::camera), [`functions`](crate::functions),
/// [`script`](crate::script), [`notes`](crate::notes) and
/// [`filter`](crate::filter).
#[derive(Debug)]
pub struct Client {
    pub(crate) channel: Channel,
    /// Set by `set_k2_parameters`; selects the extended file-saving request.
    pub(crate) save_frames: bool,
}

impl Client {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            save_frames: false,
        }
    }

    /// Open a connection as described by `config`.
    pub fn connect(config: &DmlinkConfig) -> Result<Self, ClientError> {
        let log = log::from_config(&config.debug)?;
        let mut channel = Channel::new(
            config.connection.host.clone(),
            config.connection.port,
            config.wire.layout(),
        )
        .with_log(log);
        channel.connect()?;
        Ok(Self::new(channel))
    }

    pub fn channel(&mut self) -> &mut Channel {
        &mut self.channel
    }

    pub fn layout(&self) -> WireLayout {
        self.channel.layout()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn reconnect(&mut self) -> Result<(), ClientError> {
        self.channel.reconnect()
    }

    pub fn disconnect(&mut self) {
        self.channel.disconnect();
    }

    /// Send any request and read a response of `shape`. The status in
    /// `long_args[0]` is returned to the caller unexamined.
    pub fn call(&mut self, request: &Message, shape: MessageShape) -> Result<Message, ClientError> {
        self.channel.exchange(request, shape)
    }

    /// Like [`call`](Self::call), but a non-zero status is an error.
    pub(crate) fn call_checked(
        &mut self,
        function: FunctionCode,
        request: &Message,
        shape: MessageShape,
    ) -> Result<Message, ClientError> {
        let response = self.call(request, shape)?;
        match response.head() {
            0 => Ok(response),
            status => Err(ClientError::Status { function, status }),
        }
    }
}
