//! RPC message codec
//!
//! Every RPC message starts with a 16-byte little-endian header followed by `data_len` bytes:
//!
//! ```text
//! ┌──────────┬───────────┬───────────┬──────────────┬─────────────────┐
//! │ id: u32  │ arg0: i32 │ arg1: i32 │ data_len:u32 │ data[data_len]  │
//! └──────────┴───────────┴───────────┴──────────────┴─────────────────┘
//! ```
//!
//! | Message                  | arg0               | arg1         | data              |
//! |--------------------------|--------------------|--------------|-------------------|
//! | Open request             | flags              | mode         | path, NUL         |
//! | Read/ConsoleRead request | handle             | length       | -                 |
//! | Write/ConsoleWrite req.  | handle             | byte count   | bytes             |
//! | Close request            | handle             | 0            | -                 |
//! | Terminate (host only)    | 0                  | 0            | -                 |
//! | Response                 | result or -errno   | 0            | read data         |
//!
//! A response carries the request id with [`RESPONSE_FLAG`] set, so the receiver can tell which
//! operation it answers. The close-intent token is sent raw, without a header.
//!
//! Both directions are implemented: the remote side encodes requests and decodes responses,
//! while the peer-side functions serve host proxies and test doubles.

use heapless::Vec;

use crate::core::{FileHandle, Mode, OpCode, OpenFlags};
use crate::transport::adapter::MAX_PAYLOAD_LEN;

pub const HEADER_LEN: usize = 16;

/// Largest encoded RPC message
pub const MAX_MESSAGE_LEN: usize = MAX_PAYLOAD_LEN;

/// Largest data section of a single RPC message
pub const MAX_DATA_LEN: usize = MAX_MESSAGE_LEN - HEADER_LEN;

/// Set in the id of every response
pub const RESPONSE_FLAG: u32 = 0x100;

const CLOSE_INTENT_TEXT: &[u8] = b"rpc_channel_ready_to_close";

/// Literal marker announcing that the remote side is about to release the channel
///
/// Sent unframed as 28 bytes: the text, its NUL terminator and one zero pad byte.
pub const CLOSE_INTENT_TOKEN: &[u8] = b"rpc_channel_ready_to_close\0\0";

/// Owned encoded message
pub type Message = Vec<u8, MAX_MESSAGE_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireError {
    /// Attempted to write past the end of the buffer.
    BufferOverflow,
    /// Attempted to read past the end of the buffer.
    BufferUnderflow,
    /// The id names no known operation or has the wrong direction.
    UnknownOpcode(u32),
    /// The path is not NUL-terminated within the data section.
    MissingTerminator,
    /// The path contains a NUL byte before its end.
    InteriorNul,
    /// The path is not valid UTF-8.
    InvalidUtf8,
    /// A declared length disagrees with the data section.
    LengthMismatch,
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            return Err(WireError::BufferOverflow);
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn write_u32(&mut self, value: u32) -> Result<(), WireError> {
        self.put(&value.to_le_bytes())
    }

    fn write_i32(&mut self, value: i32) -> Result<(), WireError> {
        self.put(&value.to_le_bytes())
    }

    fn write_header(&mut self, id: u32, arg0: i32, arg1: i32, data_len: usize) -> Result<(), WireError> {
        let data_len = u32::try_from(data_len).map_err(|_| WireError::BufferOverflow)?;
        self.write_u32(id)?;
        self.write_i32(arg0)?;
        self.write_i32(arg1)?;
        self.write_u32(data_len)
    }

    fn position(&self) -> usize {
        self.pos
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let end = self.pos.checked_add(len).ok_or(WireError::BufferUnderflow)?;
        if end > self.buf.len() {
            return Err(WireError::BufferUnderflow);
        }
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut array = [0; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_i32(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    fn read_header(&mut self) -> Result<Header<'a>, WireError> {
        let id = self.read_u32()?;
        let arg0 = self.read_i32()?;
        let arg1 = self.read_i32()?;
        let data_len = usize::try_from(self.read_u32()?).map_err(|_| WireError::BufferUnderflow)?;
        let data = self.take(data_len)?;
        Ok(Header {
            id,
            arg0,
            arg1,
            data,
        })
    }
}

struct Header<'a> {
    id: u32,
    arg0: i32,
    arg1: i32,
    data: &'a [u8],
}

fn len_to_i32(len: usize) -> Result<i32, WireError> {
    i32::try_from(len).map_err(|_| WireError::BufferOverflow)
}

fn bytes_to_message(bytes: &[u8]) -> Message {
    // Callers never encode more than MAX_MESSAGE_LEN bytes
    unwrap!(Vec::from_slice(bytes))
}

/// Request sent by the remote side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Request<'a> {
    Open {
        path: &'a str,
        flags: OpenFlags,
        mode: Mode,
    },
    Read {
        handle: FileHandle,
        len: u32,
    },
    Write {
        handle: FileHandle,
        data: &'a [u8],
    },
    Close {
        handle: FileHandle,
    },
    ConsoleRead {
        len: u32,
    },
    ConsoleWrite {
        data: &'a [u8],
    },
}

impl<'a> Request<'a> {
    pub fn opcode(&self) -> OpCode {
        match self {
            Request::Open { .. } => OpCode::Open,
            Request::Read { .. } => OpCode::Read,
            Request::Write { .. } => OpCode::Write,
            Request::Close { .. } => OpCode::Close,
            Request::ConsoleRead { .. } => OpCode::ConsoleRead,
            Request::ConsoleWrite { .. } => OpCode::ConsoleWrite,
        }
    }

    /// Serializes the request into `buf` and returns the encoded length.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, WireError> {
        let mut writer = Writer::new(buf);
        let id = self.opcode().into_u32();
        match *self {
            Request::Open { path, flags, mode } => {
                if path.as_bytes().contains(&0) {
                    return Err(WireError::InteriorNul);
                }
                writer.write_header(
                    id,
                    flags.into_bits() as i32,
                    mode.into_bits() as i32,
                    path.len() + 1,
                )?;
                writer.put(path.as_bytes())?;
                writer.put(&[0])?;
            }
            Request::Read { handle, len } => {
                let len = i32::try_from(len).map_err(|_| WireError::BufferOverflow)?;
                writer.write_header(id, handle.into_i32(), len, 0)?;
            }
            Request::Write { handle, data } => {
                writer.write_header(id, handle.into_i32(), len_to_i32(data.len())?, data.len())?;
                writer.put(data)?;
            }
            Request::Close { handle } => {
                writer.write_header(id, handle.into_i32(), 0, 0)?;
            }
            Request::ConsoleRead { len } => {
                let len = i32::try_from(len).map_err(|_| WireError::BufferOverflow)?;
                writer.write_header(id, FileHandle::STDIN.into_i32(), len, 0)?;
            }
            Request::ConsoleWrite { data } => {
                writer.write_header(
                    id,
                    FileHandle::STDOUT.into_i32(),
                    len_to_i32(data.len())?,
                    data.len(),
                )?;
                writer.put(data)?;
            }
        }
        Ok(writer.position())
    }

    /// Serializes the request into an owned message.
    pub fn to_message(&self) -> Result<Message, WireError> {
        let mut buf = [0u8; MAX_MESSAGE_LEN];
        let len = self.encode(&mut buf)?;
        Ok(bytes_to_message(&buf[..len]))
    }

    /// Parses a request. Used by the peer side.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, WireError> {
        let header = Reader::new(bytes).read_header()?;
        let opcode = OpCode::try_from_u32(header.id).ok_or(WireError::UnknownOpcode(header.id))?;
        let handle = || FileHandle::new(header.arg0).ok_or(WireError::LengthMismatch);
        let request = match opcode {
            OpCode::Open => {
                let (last, path) = header
                    .data
                    .split_last()
                    .ok_or(WireError::MissingTerminator)?;
                if *last != 0 {
                    return Err(WireError::MissingTerminator);
                }
                if path.contains(&0) {
                    return Err(WireError::InteriorNul);
                }
                let path = core::str::from_utf8(path).map_err(|_| WireError::InvalidUtf8)?;
                Request::Open {
                    path,
                    flags: OpenFlags::from_bits(header.arg0 as u32),
                    mode: Mode::from_bits(header.arg1 as u32),
                }
            }
            OpCode::Read => Request::Read {
                handle: handle()?,
                len: u32::try_from(header.arg1).map_err(|_| WireError::LengthMismatch)?,
            },
            OpCode::Write => {
                if usize::try_from(header.arg1) != Ok(header.data.len()) {
                    return Err(WireError::LengthMismatch);
                }
                Request::Write {
                    handle: handle()?,
                    data: header.data,
                }
            }
            OpCode::Close => Request::Close { handle: handle()? },
            OpCode::ConsoleRead => Request::ConsoleRead {
                len: u32::try_from(header.arg1).map_err(|_| WireError::LengthMismatch)?,
            },
            OpCode::ConsoleWrite => {
                if usize::try_from(header.arg1) != Ok(header.data.len()) {
                    return Err(WireError::LengthMismatch);
                }
                Request::ConsoleWrite { data: header.data }
            }
            OpCode::Terminate => return Err(WireError::UnknownOpcode(header.id)),
        };
        Ok(request)
    }
}

/// Response sent by the peer
///
/// `result` is the operation result (file handle, byte count or status) when non-negative and
/// a negated errno otherwise. `data` is non-empty for read responses only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Response<'a> {
    pub opcode: OpCode,
    pub result: i32,
    pub data: &'a [u8],
}

impl<'a> Response<'a> {
    /// Parses a response.
    ///
    /// The data section is bounded by the message length only. Callers check the reported
    /// lengths against their own capacity.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, WireError> {
        let header = Reader::new(bytes).read_header()?;
        if header.id & RESPONSE_FLAG == 0 {
            return Err(WireError::UnknownOpcode(header.id));
        }
        let opcode = OpCode::try_from_u32(header.id & !RESPONSE_FLAG)
            .ok_or(WireError::UnknownOpcode(header.id))?;
        Ok(Self {
            opcode,
            result: header.arg0,
            data: header.data,
        })
    }

    /// Serializes the response. Used by the peer side.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, WireError> {
        let mut writer = Writer::new(buf);
        writer.write_header(
            self.opcode.into_u32() | RESPONSE_FLAG,
            self.result,
            0,
            self.data.len(),
        )?;
        writer.put(self.data)?;
        Ok(writer.position())
    }

    pub fn to_message(&self) -> Result<Message, WireError> {
        let mut buf = [0u8; MAX_MESSAGE_LEN];
        let len = self.encode(&mut buf)?;
        Ok(bytes_to_message(&buf[..len]))
    }
}

/// Returns the raw id of a message without validating the rest.
pub fn peek_id(bytes: &[u8]) -> Option<u32> {
    Reader::new(bytes).read_u32().ok()
}

/// Whether the message is a host request to release the channel.
pub fn is_terminate(bytes: &[u8]) -> bool {
    bytes.len() >= HEADER_LEN && peek_id(bytes) == Some(OpCode::Terminate.into_u32())
}

/// Whether the message is the close-intent token.
///
/// Up to two trailing NUL bytes are accepted.
pub fn is_close_intent(bytes: &[u8]) -> bool {
    bytes
        .strip_prefix(CLOSE_INTENT_TEXT)
        .is_some_and(|tail| tail.len() <= 2 && tail.iter().all(|&byte| byte == 0))
}

/// Encodes a host request to release the channel. Used by the peer side.
pub fn encode_terminate() -> Message {
    let mut buf = [0u8; HEADER_LEN];
    let mut writer = Writer::new(&mut buf);
    unwrap!(writer.write_header(OpCode::Terminate.into_u32(), 0, 0, 0));
    bytes_to_message(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str = "remote.file";

    fn create_flags() -> OpenFlags {
        OpenFlags::CREAT | OpenFlags::WRONLY | OpenFlags::APPEND
    }

    fn owner_rw() -> Mode {
        Mode::S_IRUSR | Mode::S_IWUSR
    }

    #[test]
    fn test_open_layout() {
        let request = Request::Open {
            path: PATH,
            flags: create_flags(),
            mode: owner_rw(),
        };
        let message = request.to_message().unwrap();

        assert_eq!(message.len(), HEADER_LEN + PATH.len() + 1);
        assert_eq!(message[0..4], 1u32.to_le_bytes());
        assert_eq!(message[4..8], 2037i32.to_le_bytes());
        assert_eq!(message[8..12], 0o600i32.to_le_bytes());
        assert_eq!(message[12..16], 12u32.to_le_bytes());
        assert_eq!(&message[16..], b"remote.file\0");
    }

    #[test]
    fn test_open_round_trip() {
        let request = Request::Open {
            path: PATH,
            flags: create_flags(),
            mode: owner_rw(),
        };
        let message = request.to_message().unwrap();
        assert_eq!(Request::decode(&message), Ok(request));

        let response = Response {
            opcode: OpCode::Open,
            result: 3,
            data: &[],
        };
        let message = response.to_message().unwrap();
        assert_eq!(message[0..4], (1u32 | RESPONSE_FLAG).to_le_bytes());
        assert_eq!(Response::decode(&message), Ok(response));
    }

    #[test]
    fn test_read_round_trip() {
        let handle = FileHandle::new(3).unwrap();
        let request = Request::Read { handle, len: 1024 };
        let message = request.to_message().unwrap();
        assert_eq!(message.len(), HEADER_LEN);
        assert_eq!(Request::decode(&message), Ok(request));

        let response = Response {
            opcode: OpCode::Read,
            result: 5,
            data: b"hello",
        };
        let message = response.to_message().unwrap();
        assert_eq!(Response::decode(&message), Ok(response));
    }

    #[test]
    fn test_write_round_trip() {
        let handle = FileHandle::new(4).unwrap();
        let request = Request::Write {
            handle,
            data: b"payload",
        };
        let message = request.to_message().unwrap();
        assert_eq!(message[8..12], 7i32.to_le_bytes());
        assert_eq!(Request::decode(&message), Ok(request));
    }

    #[test]
    fn test_close_round_trip() {
        let request = Request::Close {
            handle: FileHandle::new(3).unwrap(),
        };
        let message = request.to_message().unwrap();
        assert_eq!(Request::decode(&message), Ok(request));

        let response = Response {
            opcode: OpCode::Close,
            result: -9,
            data: &[],
        };
        let message = response.to_message().unwrap();
        assert_eq!(Response::decode(&message).unwrap().result, -9);
    }

    #[test]
    fn test_console_handles() {
        let message = Request::ConsoleWrite { data: b"hi" }.to_message().unwrap();
        assert_eq!(message[4..8], 1i32.to_le_bytes());

        let message = Request::ConsoleRead { len: 10 }.to_message().unwrap();
        assert_eq!(message[4..8], 0i32.to_le_bytes());
        assert_eq!(
            Request::decode(&message),
            Ok(Request::ConsoleRead { len: 10 })
        );
    }

    #[test]
    fn test_write_too_large() {
        let data = [0u8; MAX_DATA_LEN + 1];
        let request = Request::Write {
            handle: FileHandle::STDOUT,
            data: &data,
        };
        assert_eq!(request.to_message(), Err(WireError::BufferOverflow));

        let data = [0u8; MAX_DATA_LEN];
        let request = Request::Write {
            handle: FileHandle::STDOUT,
            data: &data,
        };
        assert_eq!(request.to_message().unwrap().len(), MAX_MESSAGE_LEN);
    }

    #[test]
    fn test_path_validation() {
        let request = Request::Open {
            path: "bad\0name",
            flags: OpenFlags::RDONLY,
            mode: Mode::NONE,
        };
        assert_eq!(request.to_message(), Err(WireError::InteriorNul));

        let mut message = Request::Open {
            path: PATH,
            flags: OpenFlags::RDONLY,
            mode: Mode::NONE,
        }
        .to_message()
        .unwrap();
        let last = message.len() - 1;
        message[last] = b'x';
        assert_eq!(Request::decode(&message), Err(WireError::MissingTerminator));
    }

    #[test]
    fn test_response_direction() {
        let request = Request::Close {
            handle: FileHandle::STDIN,
        }
        .to_message()
        .unwrap();
        assert_eq!(Response::decode(&request), Err(WireError::UnknownOpcode(2)));

        let response = Response {
            opcode: OpCode::Close,
            result: 0,
            data: &[],
        }
        .to_message()
        .unwrap();
        assert_eq!(
            Request::decode(&response),
            Err(WireError::UnknownOpcode(2 | RESPONSE_FLAG))
        );
    }

    #[test]
    fn test_truncated() {
        let message = Response {
            opcode: OpCode::Read,
            result: 5,
            data: b"hello",
        }
        .to_message()
        .unwrap();
        assert_eq!(
            Response::decode(&message[..message.len() - 1]),
            Err(WireError::BufferUnderflow)
        );
        assert_eq!(Response::decode(&message[..3]), Err(WireError::BufferUnderflow));
    }

    #[test]
    fn test_terminate() {
        let message = encode_terminate();
        assert!(is_terminate(&message));
        assert!(Request::decode(&message).is_err());
        assert!(!is_terminate(CLOSE_INTENT_TOKEN));
    }

    #[test]
    fn test_close_intent() {
        assert!(is_close_intent(CLOSE_INTENT_TOKEN));
        assert_eq!(CLOSE_INTENT_TOKEN.len(), 28);
        assert!(is_close_intent(b"rpc_channel_ready_to_close"));
        assert!(is_close_intent(b"rpc_channel_ready_to_close\0"));
        assert!(!is_close_intent(b"rpc_channel_ready_to_close\0\0\0"));
        assert!(!is_close_intent(b"rpc_channel_ready_to_closeX"));
        assert!(!is_close_intent(b"rpc_channel_ready"));
    }
}
