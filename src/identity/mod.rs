//! Identity & ID Issuer (C1): derives the collaborator prefix and
//! allocates monotonically increasing, durable task IDs per prefix.

mod sequence_store;

pub use sequence_store::SequenceStore;

use std::ffi::CStr;

use sha2::{Digest, Sha256};

use crate::errors::{OrcError, OrcResult};
use crate::task::TaskId;

/// Where a collaborator's prefix is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixSource {
    /// No prefix: solo mode.
    None,
    /// Explicit initials, uppercased.
    Initials,
    /// OS username, lowercased.
    Username,
    /// First 4 hex characters of SHA-256(lowercase(email)).
    EmailHash,
    /// Hostname, lowercased, DNS suffix dropped, truncated to 12 chars.
    Hostname,
}

/// The raw identity fields a caller may supply; which ones are required
/// depends on the chosen [`PrefixSource`].
#[derive(Debug, Clone, Default)]
pub struct IdentityRecord {
    pub initials: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub hostname: Option<String>,
}

/// Resolve the canonical prefix for `source` against `identity`.
pub fn resolve_prefix(source: PrefixSource, identity: &IdentityRecord) -> OrcResult<String> {
    match source {
        PrefixSource::None => Ok(String::new()),
        PrefixSource::Initials => identity
            .initials
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_uppercase())
            .ok_or_else(|| OrcError::config("initials required for PrefixSource::Initials")),
        PrefixSource::Username => identity
            .username
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase())
            .ok_or_else(|| OrcError::config("username required for PrefixSource::Username")),
        PrefixSource::EmailHash => {
            let email = identity
                .email
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| OrcError::config("email required for PrefixSource::EmailHash"))?;
            let mut hasher = Sha256::new();
            hasher.update(email.to_lowercase().as_bytes());
            let digest = hasher.finalize();
            Ok(hex_prefix(&digest, 4))
        }
        PrefixSource::Hostname => identity
            .hostname
            .clone()
            .or_else(probe_hostname)
            .filter(|s| !s.is_empty())
            .map(|s| normalize_hostname(&s))
            .ok_or_else(|| OrcError::config("hostname required for PrefixSource::Hostname")),
    }
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()[..n].to_string()
}

fn normalize_hostname(raw: &str) -> String {
    let without_suffix = raw.split('.').next().unwrap_or(raw);
    without_suffix.to_lowercase().chars().take(12).collect()
}

/// Read the local hostname via `libc::gethostname`, as `tftio-gator`
/// does for its own fleet-identity surface.
fn probe_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if ret != 0 {
        return None;
    }
    let cstr = unsafe { CStr::from_ptr(buf.as_ptr() as *const libc::c_char) };
    cstr.to_str().ok().map(str::to_string)
}

/// Allocates IDs against a backing [`SequenceStore`], formatting them
/// per the `TASK-NNN` / `TASK-PREFIX-NNN` grammar.
pub struct IdIssuer<'a> {
    store: &'a SequenceStore,
    prefix_key: String,
}

impl<'a> IdIssuer<'a> {
    pub fn new(store: &'a SequenceStore, prefix: &str) -> Self {
        Self {
            store,
            prefix_key: sequence_store::normalize_key(prefix),
        }
    }

    pub fn next_id(&self) -> OrcResult<TaskId> {
        let n = self.store.next(&self.prefix_key)?;
        Ok(TaskId::format(&self.prefix_key, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn initials_uppercased() {
        let identity = IdentityRecord {
            initials: Some("am".into()),
            ..Default::default()
        };
        assert_eq!(resolve_prefix(PrefixSource::Initials, &identity).unwrap(), "AM");
    }

    #[test]
    fn username_lowercased() {
        let identity = IdentityRecord {
            username: Some("Alice".into()),
            ..Default::default()
        };
        assert_eq!(resolve_prefix(PrefixSource::Username, &identity).unwrap(), "alice");
    }

    #[test]
    fn email_hash_is_four_hex_chars_and_deterministic() {
        let identity = IdentityRecord {
            email: Some("Alice@Example.com".into()),
            ..Default::default()
        };
        let a = resolve_prefix(PrefixSource::EmailHash, &identity).unwrap();
        let identity2 = IdentityRecord {
            email: Some("alice@example.com".into()),
            ..Default::default()
        };
        let b = resolve_prefix(PrefixSource::EmailHash, &identity2).unwrap();
        assert_eq!(a.len(), 4);
        assert_eq!(a, b);
    }

    #[test]
    fn hostname_drops_dns_suffix_and_truncates() {
        let identity = IdentityRecord {
            hostname: Some("Dev-Machine-Workstation.local.example.com".into()),
            ..Default::default()
        };
        let prefix = resolve_prefix(PrefixSource::Hostname, &identity).unwrap();
        assert_eq!(prefix, "dev-machine-");
        assert!(prefix.len() <= 12);
    }

    #[test]
    fn missing_required_field_is_config_error() {
        let identity = IdentityRecord::default();
        let err = resolve_prefix(PrefixSource::EmailHash, &identity).unwrap_err();
        assert!(matches!(err, OrcError::ConfigError(_)));
    }

    #[test]
    fn issuer_formats_ids_with_prefix() {
        let dir = tempdir().unwrap();
        let store = SequenceStore::open(dir.path().join("sequences.json")).unwrap();
        let issuer = IdIssuer::new(&store, "am");
        assert_eq!(issuer.next_id().unwrap().as_str(), "TASK-AM-001");
        assert_eq!(issuer.next_id().unwrap().as_str(), "TASK-AM-002");
    }

    #[test]
    fn issuer_formats_solo_ids() {
        let dir = tempdir().unwrap();
        let store = SequenceStore::open(dir.path().join("sequences.json")).unwrap();
        let issuer = IdIssuer::new(&store, "");
        assert_eq!(issuer.next_id().unwrap().as_str(), "TASK-001");
    }
}
