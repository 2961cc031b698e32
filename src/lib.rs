//! Transactional dual-section NVRAM store: a crash-safe key/value engine
//! for embedded Linux configuration storage, backed by two mirrored
//! physical sections with CRC-protected, counter-versioned framing.

pub mod codec;
pub mod entryset;
pub mod error;
pub mod format;
pub mod interface;
pub mod medium;
pub mod namespace;
pub mod store;
pub mod transaction;

pub use entryset::EntrySet;
pub use error::{NvramError, Result};
