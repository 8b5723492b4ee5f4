//! Session key type shared by every store in Tether.
//!
//! A remote chat session is identified by the IP of the chat server hosting it
//! plus the session id on that server. The composite `ip::sid` string is built
//! once by [`SessionKey::new`] and then reused verbatim by the summary cache,
//! the aggregated state store, and the outbound queue.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Separator between the IP and the session id inside a [`SessionKey`].
pub const KEY_SEPARATOR: &str = "::";

/// Composite key `ip::sid` for one remote session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionKey {
    key: String,
    split: usize,
}

impl SessionKey {
    /// Build the key for `sid` hosted at `ip`.
    pub fn new(ip: impl AsRef<str>, sid: impl AsRef<str>) -> Self {
        let ip = ip.as_ref();
        let key = format!("{ip}{KEY_SEPARATOR}{}", sid.as_ref());
        Self {
            key,
            split: ip.len(),
        }
    }

    /// Parse a key previously produced by [`SessionKey::as_str`].
    ///
    /// IPv6 addresses contain `::` themselves, so the split is placed after the
    /// longest prefix that parses as an IP address. Keys whose host is not an
    /// IP address split on the first separator.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut candidates = raw.match_indices(KEY_SEPARATOR).map(|(at, _)| at);
        let first = candidates.next()?;
        let split = std::iter::once(first)
            .chain(candidates)
            .filter(|&at| raw[..at].parse::<IpAddr>().is_ok())
            .last()
            .unwrap_or(first);
        Some(Self {
            key: raw.to_string(),
            split,
        })
    }

    /// IP of the chat server hosting the session.
    pub fn ip(&self) -> &str {
        &self.key[..self.split]
    }

    /// Session id on the remote chat server.
    pub fn session_id(&self) -> &str {
        &self.key[self.split + KEY_SEPARATOR.len()..]
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl TryFrom<String> for SessionKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SessionKey::parse(&value).ok_or_else(|| format!("invalid session key: '{value}'"))
    }
}

impl From<SessionKey> for String {
    fn from(key: SessionKey) -> Self {
        key.key
    }
}
