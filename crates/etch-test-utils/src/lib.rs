//! Shared test utilities for the etch workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`host`]: [`TestHost`]: temporary base directory plus test root
//! - [`specs`]: builders for resource and command specs
//! - [`resolver`]: [`ScriptedResolver`], an in-memory authority

pub mod host;
pub mod resolver;
pub mod specs;

pub use host::TestHost;
pub use resolver::ScriptedResolver;
pub use specs::{CommandBuilder, SpecBuilder};
