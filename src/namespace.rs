//! Policy layer imposed by callers on top of an entry set: the system/user
//! prefix rule and the system-unlock gate. Not part of the transactional
//! engine itself — a thin wrapper callers apply before touching it.

use crate::error::{NvramError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    System,
    User,
}

pub struct NamespaceGate {
    prefix: Vec<u8>,
    system_unlocked: bool,
}

impl NamespaceGate {
    pub fn new(prefix: impl Into<Vec<u8>>, system_unlocked: bool) -> Self {
        NamespaceGate { prefix: prefix.into(), system_unlocked }
    }

    /// Unlock means the env value equals the sentinel exactly — the
    /// recommended, non-inverted reading of the original check.
    pub fn from_env(prefix: impl Into<Vec<u8>>, unlock_env: &str, sentinel: &str) -> Self {
        let unlocked = std::env::var(unlock_env).map(|v| v == sentinel).unwrap_or(false);
        NamespaceGate::new(prefix, unlocked)
    }

    /// Must be checked before any write/delete that targets `namespace`.
    pub fn check_write(&self, namespace: Namespace, key: &[u8]) -> Result<()> {
        self.check_prefix(namespace, key)?;
        if namespace == Namespace::System && !self.system_unlocked {
            return Err(NvramError::permission_denied("system namespace is locked"));
        }
        Ok(())
    }

    /// Reads, listings, and all user-namespace operations are unrestricted
    /// beyond the prefix rule, which does not apply to reads.
    pub fn check_prefix(&self, namespace: Namespace, key: &[u8]) -> Result<()> {
        let has_prefix = key.starts_with(&self.prefix);
        match namespace {
            Namespace::System if !has_prefix => Err(NvramError::invalid_argument(format!(
                "system keys must start with {:?}",
                String::from_utf8_lossy(&self.prefix)
            ))),
            Namespace::User if has_prefix => Err(NvramError::invalid_argument(format!(
                "user keys must not start with {:?}",
                String::from_utf8_lossy(&self.prefix)
            ))),
            _ => Ok(()),
        }
    }
}
