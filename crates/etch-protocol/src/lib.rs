//! Wire protocol for the etch agent
//!
//! Typed configuration model, request accumulation and form encoding,
//! request signing, and the [`Resolver`] seam with its HTTP and local
//! implementations.

pub mod client;
pub mod error;
pub mod facts;
pub mod local;
pub mod model;
pub mod report;
pub mod request;
pub mod resolver;
pub mod signing;

pub use client::HttpResolver;
pub use error::{Error, Result};
pub use facts::{FactSource, Facts, HostFacts};
pub use local::LocalResolver;
pub use model::{
    Action, Attributes, CommandSpec, DeleteAction, DirectoryAction, FileAction, LinkAction,
    ResourceSpec, Response, Step,
};
pub use report::{ProcessingResult, RunReport};
pub use request::{EncodeOptions, FileRequest, RequestState};
pub use resolver::Resolver;
pub use signing::Signer;
