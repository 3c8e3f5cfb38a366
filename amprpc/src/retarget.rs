//! Request/response layer over the established channel
//!
//! Every operation encodes one request, sends it and suspends until the matching response arrives.
//! Only one request may be outstanding per session: a second caller fails immediately with
//! `ConcurrentRequestViolation` and leaves the first one untouched.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

use crate::core::{FileHandle, Mode, OpenFlags};
use crate::error::{Error, ProtocolError, RemoteError};
use crate::lifecycle::{ChannelState, Inbound, Manager, bounded};
use crate::transport::adapter::Transport;
use crate::wire::{MAX_DATA_LEN, RESPONSE_FLAG, Request, Response};

/// Typed result of a completed request
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reply {
    /// Handle issued by an open request.
    Handle(FileHandle),
    /// Bytes returned by a read request.
    Data(Vec<u8, MAX_DATA_LEN>),
    /// Bytes accepted by a write request.
    Count(usize),
    /// Status of a close request.
    Status(i32),
}

/// Remote I/O handle
///
/// Borrowed from the [`Manager`] and valid while the manager is. File handles are opaque values
/// issued by the peer; the handle only remembers the last one it was given.
pub struct Retarget<'m, 'a, M: RawMutex, T> {
    manager: &'m Manager<'a, M, T>,
    last_handle: Cell<Option<FileHandle>>,
}

impl<'m, 'a, M: RawMutex + Sync + 'a, T: Transport<'a>> Retarget<'m, 'a, M, T> {
    pub(crate) fn new(manager: &'m Manager<'a, M, T>) -> Self {
        Self {
            manager,
            last_handle: Cell::new(None),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.manager.state()
    }

    /// Handle returned by the most recent successful open
    pub fn last_handle(&self) -> Option<FileHandle> {
        self.last_handle.get()
    }

    /// Sends `request` and waits for the matching response.
    ///
    /// The response must carry the request's operation. A negative result is reported as
    /// `RemoteOperationError`. Reported lengths are checked against the request before any data
    /// is handed out.
    pub async fn perform(&self, request: &Request<'_>) -> Result<Reply, Error> {
        let opcode = request.opcode();
        self.manager.ensure_ready()?;
        let message = request.to_message()?;

        let session = self.manager.session();
        let mut pending = session.begin(opcode)?;
        // Events posted before the request was marked pending do not interrupt it
        let channel = self.manager.ensure_ready()?;
        trace!("Sending {:?} request, {} bytes", opcode, message.len());
        self.manager.send(channel, &message)?;
        pending.sent();

        let inbound = bounded(self.manager.config().response_timeout, session.inbound()).await;
        if inbound.is_ok() {
            pending.settled();
        }
        let message = match inbound {
            Ok(Inbound::Message(message)) => message,
            Ok(Inbound::Oversized(len)) => return Err(ProtocolError::Oversized(len).into()),
            Ok(Inbound::Closing) => {
                self.manager.process_events();
                return Err(Error::ChannelClosing);
            }
            Err(err) => {
                warn!("No response to {:?} request", opcode);
                return Err(err);
            }
        };

        let response = Response::decode(&message).map_err(ProtocolError::Malformed)?;
        interpret(request, &response)
    }

    /// Opens or creates a file on the host.
    pub async fn open(&self, path: &str, flags: OpenFlags, mode: Mode) -> Result<FileHandle, Error> {
        match self.perform(&Request::Open { path, flags, mode }).await? {
            Reply::Handle(handle) => {
                self.last_handle.set(Some(handle));
                Ok(handle)
            }
            _ => unreachable!(),
        }
    }

    /// Reads up to `buf.len()` bytes, limited by the configured maximum read length.
    ///
    /// Returns the number of bytes placed at the start of `buf`. Zero means end of file.
    pub async fn read(&self, handle: FileHandle, buf: &mut [u8]) -> Result<usize, Error> {
        let len = buf.len().min(self.manager.config().max_read_len);
        self.read_into(Request::Read { handle, len: len as u32 }, buf)
            .await
    }

    /// Writes `data`, split into as many requests as needed.
    ///
    /// Stops at the first short write and returns the total accepted so far.
    pub async fn write(&self, handle: FileHandle, data: &[u8]) -> Result<usize, Error> {
        let mut written = 0;
        for chunk in data.chunks(MAX_DATA_LEN) {
            let count = self.write_chunk(Request::Write { handle, data: chunk }).await?;
            written += count;
            if count < chunk.len() {
                break;
            }
        }
        Ok(written)
    }

    pub async fn close(&self, handle: FileHandle) -> Result<(), Error> {
        match self.perform(&Request::Close { handle }).await? {
            Reply::Status(_) => {
                if self.last_handle.get() == Some(handle) {
                    self.last_handle.set(None);
                }
                Ok(())
            }
            _ => unreachable!(),
        }
    }

    /// Writes to the host console.
    pub async fn console_write(&self, data: &[u8]) -> Result<usize, Error> {
        let mut written = 0;
        for chunk in data.chunks(MAX_DATA_LEN) {
            let count = self.write_chunk(Request::ConsoleWrite { data: chunk }).await?;
            written += count;
            if count < chunk.len() {
                break;
            }
        }
        Ok(written)
    }

    /// Reads pending host console input.
    pub async fn console_read(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let len = buf.len().min(self.manager.config().max_read_len);
        self.read_into(Request::ConsoleRead { len: len as u32 }, buf)
            .await
    }

    /// Tells the host that the remote side is about to release the channel.
    ///
    /// Subsequent requests fail with `ChannelClosing`.
    pub fn send_close_intent(&self) -> Result<(), Error> {
        self.manager.request_close()
    }

    async fn read_into(&self, request: Request<'_>, buf: &mut [u8]) -> Result<usize, Error> {
        match self.perform(&request).await? {
            Reply::Data(data) => {
                buf[..data.len()].copy_from_slice(&data);
                Ok(data.len())
            }
            _ => unreachable!(),
        }
    }

    async fn write_chunk(&self, request: Request<'_>) -> Result<usize, Error> {
        match self.perform(&request).await? {
            Reply::Count(count) => Ok(count),
            _ => unreachable!(),
        }
    }
}

fn interpret(request: &Request<'_>, response: &Response<'_>) -> Result<Reply, Error> {
    let expected = request.opcode();
    if response.opcode != expected {
        return Err(ProtocolError::UnexpectedResponse {
            expected,
            received: response.opcode.into_u32() | RESPONSE_FLAG,
        }
        .into());
    }
    if response.result < 0 {
        return Err(RemoteError::Code(response.result).into());
    }

    let reported = response.result as usize;
    match *request {
        Request::Open { .. } => FileHandle::new(response.result)
            .map(Reply::Handle)
            .ok_or(Error::from(RemoteError::Code(response.result))),
        Request::Read { len, .. } | Request::ConsoleRead { len } => {
            let capacity = (len as usize).min(MAX_DATA_LEN);
            let out_of_range = RemoteError::LengthOutOfRange { reported, capacity };
            if reported > capacity || reported != response.data.len() {
                return Err(out_of_range.into());
            }
            let data = Vec::from_slice(response.data).map_err(|_| out_of_range)?;
            Ok(Reply::Data(data))
        }
        Request::Write { data, .. } | Request::ConsoleWrite { data } => {
            if reported > data.len() {
                return Err(RemoteError::LengthOutOfRange {
                    reported,
                    capacity: data.len(),
                }
                .into());
            }
            Ok(Reply::Count(reported))
        }
        Request::Close { .. } => Ok(Reply::Status(response.result)),
    }
}
