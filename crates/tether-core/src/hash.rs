//! Content fingerprints for summary cache keys.
//!
//! The `ContentHasher` port is defined here so the cache can fingerprint
//! windows without coupling to a specific digest. The `Sha256ContentHasher`
//! adapter lives in tether-infra.

use std::sync::Arc;

use tether_types::message::RecentMessage;

/// Abstraction over content hashing.
pub trait ContentHasher: Send + Sync {
    /// Compute a hex-encoded hash of the given content.
    fn compute_hash(&self, content: &str) -> String;
}

/// Turns a trailing message window into a stable, salted fingerprint.
///
/// The salt is the summarization instruction, so changing the instruction
/// changes every fingerprint and invalidates every cached summary.
#[derive(Clone)]
pub struct Fingerprinter {
    hasher: Arc<dyn ContentHasher>,
    salt: String,
}

impl Fingerprinter {
    pub fn new(hasher: Arc<dyn ContentHasher>, salt: impl Into<String>) -> Self {
        Self {
            hasher,
            salt: salt.into(),
        }
    }

    /// Fingerprint of `window`. Order-sensitive and deterministic.
    pub fn fingerprint(&self, window: &[RecentMessage]) -> String {
        let mut content = self.salt.clone();
        content.push_str(&canonicalize(window));
        self.hasher.compute_hash(&content)
    }
}

impl std::fmt::Debug for Fingerprinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fingerprinter")
            .field("salt_len", &self.salt.len())
            .finish()
    }
}

/// Canonical text form of a window: one `role:text\n` line per message.
///
/// Roles are lower-cased; whitespace runs in the text collapse to one space
/// and the text is trimmed.
pub fn canonicalize(window: &[RecentMessage]) -> String {
    let mut out = String::new();
    for msg in window {
        out.push_str(&msg.role.trim().to_lowercase());
        out.push(':');
        out.push_str(&collapse_whitespace(&msg.text));
        out.push('\n');
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
