//! A named registry mapping a format string to a bound engine. Only `v2`
//! (the transactional dual-section engine) works here; `legacy` and
//! `platform` are acknowledged siblings from the original format-selector
//! table that this crate does not reimplement.

use crate::entryset::EntrySet;
use crate::error::{NvramError, Result};
use crate::interface;
use crate::store::Store;

/// A live, opened format instance. Only one variant exists today; the enum
/// leaves room for `legacy`/`platform` without a trait object per format.
pub enum FormatHandle {
    V2(Store),
}

impl FormatHandle {
    pub fn commit(&mut self, entries: &EntrySet) -> Result<()> {
        match self {
            FormatHandle::V2(store) => store.commit(entries),
        }
    }

    pub fn close(self) {
        match self {
            FormatHandle::V2(store) => store.close(),
        }
    }
}

/// `section_a`/`section_b` may be empty to request single-section mode.
pub fn open(
    format_name: &str,
    interface_name: &str,
    section_a: &str,
    section_b: &str,
) -> Result<(FormatHandle, EntrySet)> {
    match format_name {
        "v2" => {
            let medium_a = if section_a.is_empty() {
                None
            } else {
                Some(interface::construct_medium(interface_name, section_a)?)
            };
            let medium_b = if section_b.is_empty() {
                None
            } else {
                Some(interface::construct_medium(interface_name, section_b)?)
            };
            let (store, entries) = Store::open(medium_a, medium_b)?;
            Ok((FormatHandle::V2(store), entries))
        }
        "legacy" | "platform" => Err(NvramError::unsupported(format!(
            "format '{format_name}' does not implement the transactional engine"
        ))),
        other => Err(NvramError::invalid_argument(format!("unknown format '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_format_is_named_but_unsupported() {
        let err = open("legacy", "file", "/tmp/a", "").unwrap_err();
        assert!(matches!(err, NvramError::Unsupported { .. }));
    }

    #[test]
    fn platform_format_is_named_but_unsupported() {
        let err = open("platform", "file", "/tmp/a", "").unwrap_err();
        assert!(matches!(err, NvramError::Unsupported { .. }));
    }

    #[test]
    fn unknown_format_is_invalid_argument() {
        let err = open("xyz", "file", "/tmp/a", "").unwrap_err();
        assert!(matches!(err, NvramError::InvalidArgument { .. }));
    }

    #[test]
    fn v2_single_section_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a");
        let (handle, entries) = open("v2", "file", path.to_str().unwrap(), "").unwrap();
        assert!(entries.is_empty());
        handle.close();
    }
}
