//! AMP retargeting protocol core data types
//!
//! This crate provides basic value types used by other amprpc crates.
//! Users should not depend on this crate directly. Use `amprpc::core` reexport instead.
#![no_std]

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidValue;

/// Remote procedure identifier carried in the first header word of every RPC message.
///
/// The numbering matches the host proxy. `Terminate` travels from the host only: it asks the
/// remote side to release the channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum OpCode {
    Open = 1,
    Close = 2,
    Write = 3,
    Read = 4,
    Terminate = 6,
    ConsoleWrite = 7,
    ConsoleRead = 8,
}

impl OpCode {
    pub const fn try_from_u32(code: u32) -> Option<OpCode> {
        match code {
            1 => Some(OpCode::Open),
            2 => Some(OpCode::Close),
            3 => Some(OpCode::Write),
            4 => Some(OpCode::Read),
            6 => Some(OpCode::Terminate),
            7 => Some(OpCode::ConsoleWrite),
            8 => Some(OpCode::ConsoleRead),
            _ => None,
        }
    }

    pub const fn into_u32(self) -> u32 {
        self as u32
    }

    /// Whether the operation returns payload bytes in its response.
    pub const fn carries_response_data(self) -> bool {
        matches!(self, OpCode::Read | OpCode::ConsoleRead)
    }
}

impl From<OpCode> for u32 {
    fn from(value: OpCode) -> Self {
        value.into_u32()
    }
}

impl TryFrom<u32> for OpCode {
    type Error = InvalidValue;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::try_from_u32(value).ok_or(InvalidValue)
    }
}

/// Transport endpoint address of the logical channel
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelId(u32);

impl ChannelId {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn into_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for ChannelId {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<ChannelId> for u32 {
    fn from(value: ChannelId) -> Self {
        value.into_u32()
    }
}

/// File descriptor issued by the host proxy
///
/// The handle table lives on the host. The remote side only stores the values it was given.
/// Negative numbers are error codes on the wire and never valid handles.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FileHandle(i32);

impl FileHandle {
    pub const STDIN: FileHandle = FileHandle(0);
    pub const STDOUT: FileHandle = FileHandle(1);
    pub const STDERR: FileHandle = FileHandle(2);

    pub const fn new(value: i32) -> Option<Self> {
        if value >= 0 { Some(Self(value)) } else { None }
    }

    pub const fn into_i32(self) -> i32 {
        self.0
    }
}

impl From<FileHandle> for i32 {
    fn from(value: FileHandle) -> Self {
        value.into_i32()
    }
}

impl TryFrom<i32> for FileHandle {
    type Error = InvalidValue;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidValue)
    }
}

/// Open flags understood by the host proxy
///
/// The proxy redefines the flag values (decimal, not bit positions), and the remote side
/// combines them bitwise. `contains` therefore compares the exact bit pattern of a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const RDONLY: Self = Self(0);
    pub const WRONLY: Self = Self(1);
    pub const RDWR: Self = Self(2);
    pub const ACCMODE: Self = Self(3);
    pub const CREAT: Self = Self(100);
    pub const EXCL: Self = Self(200);
    pub const APPEND: Self = Self(2000);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn into_bits(self) -> u32 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Access mode part of the flags (`RDONLY`, `WRONLY` or `RDWR`)
    pub const fn access_mode(&self) -> Self {
        Self(self.0 & Self::ACCMODE.0)
    }
}

impl Default for OpenFlags {
    fn default() -> Self {
        OpenFlags::RDONLY
    }
}

impl core::ops::BitOr<OpenFlags> for OpenFlags {
    type Output = Self;
    fn bitor(self, rhs: OpenFlags) -> Self::Output {
        self.union(rhs)
    }
}

impl core::ops::BitOrAssign<OpenFlags> for OpenFlags {
    fn bitor_assign(&mut self, rhs: OpenFlags) {
        self.0 |= rhs.0;
    }
}

/// POSIX permission bits for newly created files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mode(u32);

impl Mode {
    pub const NONE: Self = Self(0);
    pub const S_IRUSR: Self = Self(0o400);
    pub const S_IWUSR: Self = Self(0o200);
    pub const S_IXUSR: Self = Self(0o100);
    pub const S_IRWXU: Self = Self(0o700);
    pub const S_IRGRP: Self = Self(0o040);
    pub const S_IWGRP: Self = Self(0o020);
    pub const S_IXGRP: Self = Self(0o010);
    pub const S_IROTH: Self = Self(0o004);
    pub const S_IWOTH: Self = Self(0o002);
    pub const S_IXOTH: Self = Self(0o001);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & 0o7777)
    }

    pub const fn into_bits(self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::NONE
    }
}

impl core::ops::BitOr<Mode> for Mode {
    type Output = Self;
    fn bitor(self, rhs: Mode) -> Self::Output {
        Mode(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign<Mode> for Mode {
    fn bitor_assign(&mut self, rhs: Mode) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_codes() {
        for code in 0..16 {
            if let Some(op) = OpCode::try_from_u32(code) {
                assert_eq!(op.into_u32(), code);
            }
        }
        assert_eq!(OpCode::try_from_u32(5), None);
        assert!(OpCode::try_from(0).is_err());
    }

    #[test]
    fn test_opcode_response_data() {
        assert!(OpCode::Read.carries_response_data());
        assert!(OpCode::ConsoleRead.carries_response_data());
        assert!(!OpCode::Write.carries_response_data());
        assert!(!OpCode::Open.carries_response_data());
    }

    #[test]
    fn test_file_handle() {
        assert_eq!(FileHandle::new(3).map(FileHandle::into_i32), Some(3));
        assert_eq!(FileHandle::new(-2), None);
        assert_eq!(FileHandle::new(0), Some(FileHandle::STDIN));
    }

    #[test]
    fn test_open_flags() {
        let flags = OpenFlags::CREAT | OpenFlags::WRONLY | OpenFlags::APPEND;
        assert!(flags.contains(OpenFlags::CREAT));
        assert!(flags.contains(OpenFlags::APPEND));
        assert_eq!(flags.access_mode(), OpenFlags::WRONLY);
        assert_eq!(OpenFlags::default(), OpenFlags::RDONLY);
    }

    #[test]
    fn test_mode() {
        let mode = Mode::S_IRUSR | Mode::S_IWUSR;
        assert_eq!(mode.into_bits(), 0o600);
        assert!(mode.contains(Mode::S_IRUSR));
        assert!(!mode.contains(Mode::S_IXUSR));
        assert_eq!(Mode::from_bits(0o170600), mode);
    }
}
