//! # Droplet Core
//!
//! Storage core for an ephemeral, anonymous file-drop service.
//!
//! Uploads are placed at `<root>/<token>/<filename>`, where `<token>` is a
//! short random directory name. The directory tree is the only state: there
//! is no index, and a restart simply re-reads the tree.
//!
//! ## Features
//!
//! - Randomized, collision-checked upload locations ([`Allocator`])
//! - Age-based reclamation of files and the directories they leave behind
//!   ([`Reclaimer`])
//! - Filename and token validation that keeps every path inside the root
//!
//! ## Example
//!
//! ```no_run
//! use droplet_core::{Allocator, AllocatorConfig, Reclaimer, Retention, StorageRoot};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let root = StorageRoot::init("/var/lib/droplet")?;
//!
//! // Reserve a location and write the upload into it
//! let allocator = Allocator::new(root.clone(), AllocatorConfig::default())?;
//! let allocation = allocator.allocate("notes.txt")?;
//! std::fs::write(&allocation.destination, b"hello")?;
//! println!("download at /{}", allocation.public_path);
//!
//! // Later, delete everything older than three days
//! let reclaimer = Reclaimer::new(root, Retention::days(3));
//! let stats = reclaimer.sweep()?;
//! println!("Removed {} files", stats.files_removed);
//! # Ok(())
//! # }
//! ```

mod allocator;
mod error;
mod reclaim;
mod root;
mod token;

pub use allocator::{
    Allocation, Allocator, AllocatorConfig, CollisionPolicy, MAX_ALLOCATION_ATTEMPTS,
};
pub use error::{Error, Result};
pub use reclaim::{Reclaimer, Retention, SweepStats};
pub use root::{MAX_FILENAME_LEN, StorageRoot, validate_filename};
pub use token::{Alphabet, DEFAULT_ALPHABET, DEFAULT_TOKEN_LENGTH, MAX_TOKEN_LENGTH};
