//! Per-operation callback tokens.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies which outstanding request a completion belongs to.
///
/// The bridge never interprets a token; it hands it back unchanged with the
/// completion callback of the operation that carried it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestToken(pub u64);

impl RequestToken {
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out unique tokens, starting at 1.
#[derive(Debug)]
pub struct TokenSource {
    next: AtomicU64,
}

impl TokenSource {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> RequestToken {
        RequestToken(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TokenSource {
    fn default() -> Self {
        Self::new()
    }
}
