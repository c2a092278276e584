//! Random directory tokens.

use crate::error::{Error, Result};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default token alphabet: ASCII letters and digits.
pub const DEFAULT_ALPHABET: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Default token length.
pub const DEFAULT_TOKEN_LENGTH: usize = 7;

/// Longest token accepted by the allocator.
pub const MAX_TOKEN_LENGTH: usize = 64;

/// Characters allowed in a token directory name, whatever the alphabet.
pub(crate) fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// The set of characters tokens are drawn from.
///
/// Guaranteed non-empty, duplicate-free, and made only of characters that
/// are safe as a single path component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    chars: Vec<u8>,
}

impl Alphabet {
    /// Validate and build an alphabet from the given characters.
    pub fn new(chars: &str) -> Result<Self> {
        if chars.is_empty() {
            return Err(Error::invalid_config("alphabet cannot be empty"));
        }

        let mut seen = [false; 128];
        for b in chars.bytes() {
            if !is_token_char(b) {
                return Err(Error::invalid_config(format!(
                    "alphabet character {:?} is not alphanumeric, '-' or '_'",
                    b as char
                )));
            }
            if seen[b as usize] {
                return Err(Error::invalid_config(format!(
                    "alphabet character {:?} appears more than once",
                    b as char
                )));
            }
            seen[b as usize] = true;
        }

        Ok(Self {
            chars: chars.as_bytes().to_vec(),
        })
    }

    /// Number of distinct characters.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Always false; an alphabet holds at least one character.
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Check whether `c` belongs to the alphabet.
    pub fn contains(&self, c: char) -> bool {
        c.is_ascii() && self.chars.contains(&(c as u8))
    }

    /// The characters as a string slice.
    pub fn as_str(&self) -> &str {
        // Validated as ASCII in `new`
        std::str::from_utf8(&self.chars).unwrap_or_default()
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Self {
            chars: DEFAULT_ALPHABET.as_bytes().to_vec(),
        }
    }
}

impl FromStr for Alphabet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Draws fixed-length tokens from an alphabet.
///
/// Uses a small, non-cryptographic generator seeded from the wall clock.
/// Tokens only obscure upload locations; they are not secrets.
#[derive(Debug)]
pub(crate) struct TokenGenerator {
    alphabet: Alphabet,
    length: usize,
    rng: Mutex<SmallRng>,
}

impl TokenGenerator {
    /// Create a generator seeded from the current time.
    pub(crate) fn new(alphabet: Alphabet, length: usize) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self::with_seed(alphabet, length, nanos ^ u64::from(std::process::id()))
    }

    /// Create a generator with a fixed seed.
    pub(crate) fn with_seed(alphabet: Alphabet, length: usize, seed: u64) -> Self {
        Self {
            alphabet,
            length,
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }

    /// Generate the next token.
    pub(crate) fn generate(&self) -> String {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        (0..self.length)
            .map(|_| {
                let idx = rng.gen_range(0..self.alphabet.chars.len());
                self.alphabet.chars[idx] as char
            })
            .collect()
    }
}
