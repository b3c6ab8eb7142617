//! Filesystem primitives for the etch agent
//!
//! Provides the state-directory layout, non-dereferencing node probes,
//! atomic replacement, metadata-preserving copies and resource locks.

pub mod checksum;
pub mod config;
pub mod error;
pub mod io;
pub mod layout;
pub mod lock;
pub mod meta;

pub use config::{ConfigStore, Format};
pub use error::{Error, Result};
pub use io::StagedFile;
pub use layout::{AgentLayout, relative_name};
pub use lock::{LockGuard, LockManager};
pub use meta::{NodeKind, NodeState};
