//! Revision store for the etch history log
//!
//! The history log is a plain directory tree mirroring managed resources.
//! Its revisions are kept in a bare git object store nested inside that tree
//! (`history/RCS`), with the tree itself as the work directory.

pub mod error;
pub mod revision;
pub mod store;

pub use error::{Error, Result};
pub use revision::Revision;
pub use store::HistoryStore;
