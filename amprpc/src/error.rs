//! Failure kinds reported by the session and the retargeting layer

use crate::lifecycle::ChannelState;
use crate::transport::adapter::SendError;
use crate::wire::WireError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Platform setup or transport registration failed.
    PlatformInitFailure,
    /// The channel is not established yet.
    ChannelNotReady,
    /// Another request is still waiting for its response.
    ConcurrentRequestViolation,
    /// The peer answered with a failure.
    RemoteOperationError(RemoteError),
    /// The channel is being released by either side.
    ChannelClosing,
    /// A configured deadline expired.
    Timeout,
    /// The peer answered with something that does not match the request.
    ProtocolViolation(ProtocolError),
    /// The transport refused to send.
    Transport(SendError),
    /// The operation is not allowed in the current lifecycle state.
    InvalidState(ChannelState),
    /// The request cannot be represented on the wire.
    Encode(WireError),
    /// The console input stream ended.
    EndOfInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RemoteError {
    /// Negated errno reported by the peer.
    Code(i32),
    /// The reported length exceeds the requested capacity or disagrees with the data.
    LengthOutOfRange { reported: usize, capacity: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// The response answers a different operation. `received` is the raw id.
    UnexpectedResponse { expected: crate::core::OpCode, received: u32 },
    /// The response could not be parsed.
    Malformed(WireError),
    /// The response exceeds the largest message the transport can carry.
    Oversized(usize),
}

impl From<SendError> for Error {
    fn from(value: SendError) -> Self {
        Error::Transport(value)
    }
}

impl From<WireError> for Error {
    fn from(value: WireError) -> Self {
        Error::Encode(value)
    }
}

impl From<ProtocolError> for Error {
    fn from(value: ProtocolError) -> Self {
        Error::ProtocolViolation(value)
    }
}

impl From<RemoteError> for Error {
    fn from(value: RemoteError) -> Self {
        Error::RemoteOperationError(value)
    }
}
