//! Formatted console I/O on the host terminal
//!
//! [`Console`] buffers host input and splits it into whitespace-separated tokens, and formats
//! output into a bounded buffer before sending it. It talks to the host through [`ConsoleIo`],
//! which [`Retarget`] implements with console requests.

use core::fmt::{self, Write};
use core::str::FromStr;

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::{String, Vec};

use crate::error::Error;
use crate::retarget::Retarget;
use crate::transport::adapter::Transport;
use crate::wire::WireError;

/// Size of the console input buffer
pub const CONSOLE_LINE_CAPACITY: usize = 128;

/// Longest accepted input token
pub const TOKEN_CAPACITY: usize = 64;

/// Longest formatted output of a single `print`
pub const PRINT_CAPACITY: usize = 256;

/// Raw access to the host console
#[allow(async_fn_in_trait)]
pub trait ConsoleIo {
    /// Writes to the host standard output and returns the accepted byte count.
    async fn write(&self, data: &[u8]) -> Result<usize, Error>;

    /// Reads available host standard input. Zero means the input ended.
    async fn read(&self, buf: &mut [u8]) -> Result<usize, Error>;
}

impl<C: ConsoleIo + ?Sized> ConsoleIo for &C {
    async fn write(&self, data: &[u8]) -> Result<usize, Error> {
        (**self).write(data).await
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, Error> {
        (**self).read(buf).await
    }
}

impl<'a, M: RawMutex + Sync + 'a, T: Transport<'a>> ConsoleIo for Retarget<'_, 'a, M, T> {
    async fn write(&self, data: &[u8]) -> Result<usize, Error> {
        self.console_write(data).await
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, Error> {
        self.console_read(buf).await
    }
}

pub type Token = String<TOKEN_CAPACITY>;

/// Buffered console client
///
/// # Examples:
///
/// ```
/// use amprpc::console::{Console, ConsoleIo};
/// use amprpc::error::Error;
///
/// async fn ask_age(io: impl ConsoleIo) -> Result<Option<i32>, Error> {
///     let mut console = Console::new(io);
///     console.print(format_args!("Enter age\r\n")).await?;
///     console.scan::<i32>().await
/// }
/// ```
pub struct Console<C> {
    io: C,
    line: [u8; CONSOLE_LINE_CAPACITY],
    start: usize,
    end: usize,
}

impl<C: ConsoleIo> Console<C> {
    pub fn new(io: C) -> Self {
        Self {
            io,
            line: [0; CONSOLE_LINE_CAPACITY],
            start: 0,
            end: 0,
        }
    }

    pub fn io(&self) -> &C {
        &self.io
    }

    /// Writes `data` verbatim.
    pub async fn write_bytes(&mut self, data: &[u8]) -> Result<(), Error> {
        self.io.write(data).await.map(|_| ())
    }

    /// Formats `args` and writes the result.
    ///
    /// Fails with `Encode(BufferOverflow)` if the output exceeds `PRINT_CAPACITY`.
    pub async fn print(&mut self, args: fmt::Arguments<'_>) -> Result<(), Error> {
        let mut text = String::<PRINT_CAPACITY>::new();
        text.write_fmt(args)
            .map_err(|_| Error::Encode(WireError::BufferOverflow))?;
        self.write_bytes(text.as_bytes()).await
    }

    /// Reads the next whitespace-separated token.
    ///
    /// Returns `None` if the token is too long or not valid UTF-8. The token is consumed either
    /// way.
    pub async fn read_token(&mut self) -> Result<Option<Token>, Error> {
        let mut byte = self.next_byte().await?;
        while byte.is_ascii_whitespace() {
            byte = self.next_byte().await?;
        }

        let mut bytes = Vec::<u8, TOKEN_CAPACITY>::new();
        let mut fits = true;
        loop {
            fits &= bytes.push(byte).is_ok();
            byte = match self.next_byte().await {
                Ok(byte) => byte,
                Err(Error::EndOfInput) => break,
                Err(err) => return Err(err),
            };
            if byte.is_ascii_whitespace() {
                break;
            }
        }

        if !fits {
            return Ok(None);
        }
        Ok(String::from_utf8(bytes).ok())
    }

    /// Reads the next token and parses it as `T`.
    ///
    /// Returns `None` if the token does not parse. The token is consumed either way.
    pub async fn scan<T: FromStr>(&mut self) -> Result<Option<T>, Error> {
        let token = self.read_token().await?;
        Ok(token.and_then(|token| token.parse().ok()))
    }

    async fn next_byte(&mut self) -> Result<u8, Error> {
        if self.start == self.end {
            let len = self.io.read(&mut self.line).await?;
            if len == 0 {
                return Err(Error::EndOfInput);
            }
            self.start = 0;
            self.end = len.min(CONSOLE_LINE_CAPACITY);
        }
        let byte = self.line[self.start];
        self.start += 1;
        Ok(byte)
    }
}
