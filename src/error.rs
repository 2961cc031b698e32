//! Error kinds shared by every layer of the engine, in the propagation order
//! described by the design: io -> invalid-argument -> corrupt -> not-found ->
//! out-of-memory -> permission-denied -> unsupported.

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, NvramError>;

#[derive(Debug, thiserror::Error)]
pub enum NvramError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("corrupt data: {message}")]
    Corrupt { message: String },

    #[error("key not found: {key_repr}")]
    NotFound { key_repr: String },

    #[error("out of memory")]
    OutOfMemory,

    #[error("permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("unsupported: {message}")]
    Unsupported { message: String },
}

impl NvramError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt { message: message.into() }
    }

    pub fn not_found(key: &[u8]) -> Self {
        Self::NotFound { key_repr: key_repr(key) }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied { message: message.into() }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported { message: message.into() }
    }
}

/// Render a key for error messages: as a string if it looks string-typed
/// (last byte is a NUL terminator), otherwise as hex. Presentation only,
/// mirrors the convention in §3 of the spec.
fn key_repr(key: &[u8]) -> String {
    if key.last() == Some(&0) && key[..key.len() - 1].is_ascii() {
        String::from_utf8_lossy(&key[..key.len() - 1]).into_owned()
    } else {
        let mut s = String::from("0x");
        for b in key {
            use fmt::Write;
            let _ = write!(s, "{b:02x}");
        }
        s
    }
}

/// Maps process exit codes to error kinds, for the CLI layer (`main.rs`).
/// Mirrors the original's "positive errno" convention without depending on
/// actual libc errno values for kinds that have no natural syscall analogue.
impl NvramError {
    pub fn exit_code(&self) -> i32 {
        match self {
            NvramError::Io(e) => e.raw_os_error().unwrap_or(libc_like::EIO),
            NvramError::InvalidArgument { .. } => libc_like::EINVAL,
            NvramError::Corrupt { .. } => libc_like::EINVAL,
            NvramError::NotFound { .. } => libc_like::ENOENT,
            NvramError::OutOfMemory => libc_like::ENOMEM,
            NvramError::PermissionDenied { .. } => libc_like::EACCES,
            NvramError::Unsupported { .. } => libc_like::EOPNOTSUPP,
        }
    }
}

/// Small numeric errno mirror so `error.rs` has no dependency on the `libc`
/// crate just for a handful of constants used only as exit codes.
mod libc_like {
    pub const EIO: i32 = 5;
    pub const EINVAL: i32 = 22;
    pub const ENOENT: i32 = 2;
    pub const ENOMEM: i32 = 12;
    pub const EACCES: i32 = 13;
    pub const EOPNOTSUPP: i32 = 95;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_repr_string_typed() {
        assert_eq!(key_repr(b"hello\0"), "hello");
    }

    #[test]
    fn key_repr_binary() {
        assert_eq!(key_repr(&[0x01, 0x02, 0xff]), "0x0102ff");
    }

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(NvramError::invalid_argument("x").exit_code(), 22);
        assert_eq!(NvramError::OutOfMemory.exit_code(), 12);
    }
}
