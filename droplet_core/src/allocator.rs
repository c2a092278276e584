//! Upload path allocation.

use crate::error::{Error, Result};
use crate::root::{StorageRoot, validate_filename};
use crate::token::{Alphabet, DEFAULT_TOKEN_LENGTH, MAX_TOKEN_LENGTH, TokenGenerator};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Attempts made under [`CollisionPolicy::Strict`] before giving up.
pub const MAX_ALLOCATION_ATTEMPTS: usize = 100;

/// How the allocator treats an existing file at the candidate location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// Check for an existing file and draw a new token if one is found,
    /// failing after [`MAX_ALLOCATION_ATTEMPTS`] tries.
    #[default]
    Strict,
    /// Skip the check and rely on the size of the token space.
    Relaxed,
}

/// Allocator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Characters tokens are drawn from.
    pub alphabet: Alphabet,
    /// Token length in characters.
    pub token_length: usize,
    /// Collision handling.
    pub policy: CollisionPolicy,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            alphabet: Alphabet::default(),
            token_length: DEFAULT_TOKEN_LENGTH,
            policy: CollisionPolicy::default(),
        }
    }
}

impl AllocatorConfig {
    /// Check that the settings can produce valid tokens.
    pub fn validate(&self) -> Result<()> {
        if self.token_length == 0 || self.token_length > MAX_TOKEN_LENGTH {
            return Err(Error::invalid_config(format!(
                "token length must be between 1 and {}, got {}",
                MAX_TOKEN_LENGTH, self.token_length
            )));
        }
        Ok(())
    }
}

/// A freshly allocated upload location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    /// Absolute path the caller writes the upload to.
    pub destination: PathBuf,
    /// `<token>/<filename>`, used in download URLs.
    pub public_path: String,
}

/// Maps requested filenames to fresh locations under the storage root.
///
/// Each allocation lives in its own randomly named directory. The allocator
/// creates that directory but never the file itself.
#[derive(Debug)]
pub struct Allocator {
    root: StorageRoot,
    policy: CollisionPolicy,
    tokens: TokenGenerator,
}

impl Allocator {
    /// Create an allocator for `root`.
    pub fn new(root: StorageRoot, config: AllocatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            root,
            policy: config.policy,
            tokens: TokenGenerator::new(config.alphabet, config.token_length),
        })
    }

    /// Create an allocator with a deterministic token sequence.
    #[cfg(test)]
    pub(crate) fn with_seed(root: StorageRoot, config: AllocatorConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            root,
            policy: config.policy,
            tokens: TokenGenerator::with_seed(config.alphabet, config.token_length, seed),
        })
    }

    /// Get the storage root.
    pub fn root(&self) -> &StorageRoot {
        &self.root
    }

    /// Get the collision policy.
    pub fn policy(&self) -> CollisionPolicy {
        self.policy
    }

    /// Allocate a location for `filename`.
    ///
    /// Creates `<root>/<token>` (and any missing ancestors) and returns
    /// `<root>/<token>/<filename>` together with `<token>/<filename>`.
    pub fn allocate(&self, filename: &str) -> Result<Allocation> {
        validate_filename(filename)?;

        let token = match self.policy {
            CollisionPolicy::Strict => self.free_token(filename)?,
            CollisionPolicy::Relaxed => self.tokens.generate(),
        };

        let dir = self.root.path().join(&token);
        create_token_dir(&dir)?;

        let allocation = Allocation {
            destination: dir.join(filename),
            public_path: format!("{}/{}", token, filename),
        };
        debug!(
            destination = %allocation.destination.display(),
            public_path = %allocation.public_path,
            "allocated upload path"
        );

        Ok(allocation)
    }

    /// Draw tokens until one does not already hold `filename`.
    fn free_token(&self, filename: &str) -> Result<String> {
        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let token = self.tokens.generate();
            let candidate = self.root.path().join(&token).join(filename);

            match fs::symlink_metadata(&candidate) {
                Ok(_) => {
                    debug!(token = %token, attempt, "token already holds filename, retrying");
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(token),
                // A stray non-directory entry named like the token
                Err(err) if err.kind() == io::ErrorKind::NotADirectory => {
                    debug!(token = %token, attempt, "token is not a directory, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(Error::collision_exhausted(MAX_ALLOCATION_ATTEMPTS))
    }
}

/// Create a token directory, succeeding if it already exists.
#[cfg(unix)]
fn create_token_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(dir)?;
    Ok(())
}

/// Create a token directory, succeeding if it already exists (non-unix fallback).
#[cfg(not(unix))]
fn create_token_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn allocator(temp_dir: &TempDir, config: AllocatorConfig) -> Allocator {
        let root = StorageRoot::init(temp_dir.path()).unwrap();
        Allocator::new(root, config).unwrap()
    }

    fn tiny_config(policy: CollisionPolicy) -> AllocatorConfig {
        AllocatorConfig {
            alphabet: Alphabet::new("x").unwrap(),
            token_length: 1,
            policy,
        }
    }

    #[test]
    fn test_allocate_layout() {
        let temp_dir = TempDir::new().unwrap();
        let allocator = allocator(&temp_dir, AllocatorConfig::default());

        let allocation = allocator.allocate("hello.txt").unwrap();
        let (token, name) = allocation.public_path.split_once('/').unwrap();

        assert_eq!(name, "hello.txt");
        assert_eq!(token.len(), DEFAULT_TOKEN_LENGTH);
        assert_eq!(
            allocation.destination,
            allocator.root().path().join(token).join("hello.txt")
        );
    }

    #[test]
    fn test_allocate_creates_dir_not_file() {
        let temp_dir = TempDir::new().unwrap();
        let allocator = allocator(&temp_dir, AllocatorConfig::default());

        let allocation = allocator.allocate("data.bin").unwrap();
        assert!(allocation.destination.parent().unwrap().is_dir());
        assert!(!allocation.destination.exists());
    }

    #[test]
    fn test_allocate_rejects_bad_filename() {
        let temp_dir = TempDir::new().unwrap();
        let allocator = allocator(&temp_dir, AllocatorConfig::default());

        for name in ["", "..", "a/b", "../../etc/passwd", "a\\b"] {
            let result = allocator.allocate(name);
            assert!(
                matches!(result, Err(Error::InvalidFilename { .. })),
                "{:?} should be rejected",
                name
            );
        }

        // Nothing was created for rejected names
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_allocate_unique_destinations() {
        let temp_dir = TempDir::new().unwrap();
        let allocator = allocator(&temp_dir, AllocatorConfig::default());

        let mut seen = HashSet::new();
        for _ in 0..500 {
            let allocation = allocator.allocate("same.txt").unwrap();
            fs::write(&allocation.destination, b"x").unwrap();
            assert!(seen.insert(allocation.destination));
        }
    }

    #[test]
    fn test_relaxed_tokens_distinct_over_sample() {
        let temp_dir = TempDir::new().unwrap();
        let config = AllocatorConfig {
            policy: CollisionPolicy::Relaxed,
            ..AllocatorConfig::default()
        };
        let allocator = allocator(&temp_dir, config);

        let paths: HashSet<PathBuf> = (0..2000)
            .map(|_| allocator.allocate("f").unwrap().destination)
            .collect();
        assert_eq!(paths.len(), 2000);
    }

    #[test]
    fn test_strict_collision_exhausted() {
        let temp_dir = TempDir::new().unwrap();
        let allocator = allocator(&temp_dir, tiny_config(CollisionPolicy::Strict));

        let first = allocator.allocate("file").unwrap();
        assert_eq!(first.public_path, "x/file");
        fs::write(&first.destination, b"taken").unwrap();

        let result = allocator.allocate("file");
        assert!(matches!(
            result,
            Err(Error::CollisionExhausted {
                attempts: MAX_ALLOCATION_ATTEMPTS
            })
        ));

        // The existing file is untouched
        assert_eq!(fs::read(&first.destination).unwrap(), b"taken");
    }

    #[test]
    fn test_strict_other_filename_same_token() {
        let temp_dir = TempDir::new().unwrap();
        let allocator = allocator(&temp_dir, tiny_config(CollisionPolicy::Strict));

        let first = allocator.allocate("a").unwrap();
        fs::write(&first.destination, b"a").unwrap();

        let second = allocator.allocate("b").unwrap();
        assert_eq!(second.public_path, "x/b");
    }

    #[test]
    fn test_relaxed_reuses_taken_location() {
        let temp_dir = TempDir::new().unwrap();
        let allocator = allocator(&temp_dir, tiny_config(CollisionPolicy::Relaxed));

        let first = allocator.allocate("file").unwrap();
        fs::write(&first.destination, b"taken").unwrap();

        let second = allocator.allocate("file").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_strict_retries_past_taken_token() {
        let temp_dir = TempDir::new().unwrap();
        let config = AllocatorConfig {
            alphabet: Alphabet::new("ab").unwrap(),
            token_length: 1,
            policy: CollisionPolicy::Strict,
        };
        let root = StorageRoot::init(temp_dir.path()).unwrap();
        let allocator = Allocator::with_seed(root, config, 7).unwrap();

        let first = allocator.allocate("file").unwrap();
        fs::write(&first.destination, b"1").unwrap();

        // Only the other token is free; the retry loop must find it
        let second = allocator.allocate("file").unwrap();
        assert_ne!(first.destination, second.destination);
    }

    #[test]
    fn test_invalid_token_length() {
        let temp_dir = TempDir::new().unwrap();
        let root = StorageRoot::init(temp_dir.path()).unwrap();

        for token_length in [0, MAX_TOKEN_LENGTH + 1] {
            let config = AllocatorConfig {
                token_length,
                ..AllocatorConfig::default()
            };
            assert!(matches!(
                Allocator::new(root.clone(), config),
                Err(Error::InvalidConfig { .. })
            ));
        }
    }

    #[test]
    fn test_allocate_existing_token_dir() {
        let temp_dir = TempDir::new().unwrap();
        let allocator = allocator(&temp_dir, tiny_config(CollisionPolicy::Strict));

        fs::create_dir(temp_dir.path().join("x")).unwrap();
        let allocation = allocator.allocate("new").unwrap();
        assert_eq!(allocation.public_path, "x/new");
    }

    #[test]
    fn test_strict_skips_token_shadowed_by_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = AllocatorConfig {
            alphabet: Alphabet::new("ab").unwrap(),
            token_length: 1,
            policy: CollisionPolicy::Strict,
        };
        let root = StorageRoot::init(temp_dir.path()).unwrap();
        let allocator = Allocator::with_seed(root, config, 3).unwrap();

        fs::write(temp_dir.path().join("a"), b"stray").unwrap();

        for _ in 0..50 {
            let allocation = allocator.allocate("f").unwrap();
            assert_eq!(allocation.public_path, "b/f");
        }
        assert_eq!(fs::read(temp_dir.path().join("a")).unwrap(), b"stray");
    }

    #[test]
    #[cfg(unix)]
    fn test_token_dir_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let allocator = allocator(&temp_dir, AllocatorConfig::default());

        let allocation = allocator.allocate("f").unwrap();
        let mode = fs::metadata(allocation.destination.parent().unwrap())
            .unwrap()
            .permissions()
            .mode();
        // Owner always has full access; group/other bits depend on umask
        assert_eq!(mode & 0o700, 0o700);
    }
}
