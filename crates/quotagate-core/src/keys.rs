//! Recovery keys
//!
//! Keys are short enough to be typed by hand after a device reset. Every
//! draw comes straight from the OS CSPRNG; nothing is seeded or shared
//! between requests.

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default key alphabet: uppercase letters and digits
pub const DEFAULT_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Default key length (36^8 ≈ 2.8e12 keys)
pub const DEFAULT_LENGTH: usize = 8;

/// Recovery key (Value Object)
///
/// # Invariants
/// - Issued by a [`KeyPolicy`] or read back from the ledger
/// - Globally unique across recovery records (enforced by the ledger)
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecoveryKey(String);

impl RecoveryKey {
    /// Wrap a key read back from storage
    pub(crate) fn from_stored(key: String) -> Self {
        Self(key)
    }

    /// Get inner value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RecoveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Keys are bearer secrets; keep them out of debug logs.
impl fmt::Debug for RecoveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: String = self.0.chars().take(2).collect();
        write!(f, "RecoveryKey({shown}…)")
    }
}

/// Shape of issued recovery keys
#[derive(Debug, Clone)]
pub struct KeyPolicy {
    length: usize,
    alphabet: Vec<char>,
}

impl KeyPolicy {
    /// Create a policy. Returns `None` for a zero length or an empty alphabet.
    pub fn new(length: usize, alphabet: &str) -> Option<Self> {
        let mut chars: Vec<char> = alphabet.chars().collect();
        chars.sort_unstable();
        chars.dedup();

        if length == 0 || chars.is_empty() {
            return None;
        }
        Some(Self { length, alphabet: chars })
    }

    /// Number of distinct characters keys are drawn from
    pub fn alphabet_size(&self) -> usize {
        self.alphabet.len()
    }

    /// Draw a fresh key, uniformly over the alphabet
    pub fn generate(&self) -> RecoveryKey {
        let mut rng = OsRng;
        let key = (0..self.length)
            .map(|_| self.alphabet[rng.gen_range(0..self.alphabet.len())])
            .collect();
        RecoveryKey(key)
    }

    /// Normalize user input into a key of this policy's shape.
    ///
    /// Surrounding whitespace is dropped and, when the alphabet has no
    /// lowercase letters, input is upper-cased first.
    pub fn parse(&self, input: &str) -> Option<RecoveryKey> {
        let trimmed = input.trim();
        let normalized = if self.alphabet.iter().any(|c| c.is_lowercase()) {
            trimmed.to_string()
        } else {
            trimmed.to_uppercase()
        };

        let valid = normalized.chars().count() == self.length
            && normalized.chars().all(|c| self.alphabet.binary_search(&c).is_ok());
        valid.then_some(RecoveryKey(normalized))
    }
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            length: DEFAULT_LENGTH,
            alphabet: {
                let mut chars: Vec<char> = DEFAULT_ALPHABET.chars().collect();
                chars.sort_unstable();
                chars
            },
        }
    }
}
