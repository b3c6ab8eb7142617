//! Operator confirmation for interactive runs

use std::str::FromStr;

use crate::actions::ChangeSet;
use crate::{Error, Result};

/// Operator's answer to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    /// Leave this resource or command alone
    Skip,
    /// Stop the whole run, releasing every lock
    Quit,
}

impl Decision {
    /// Parse a typed answer. Anything unrecognised is an error.
    pub fn parse(answer: &str) -> Result<Self> {
        answer.parse()
    }
}

impl FromStr for Decision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" | "p" | "proceed" => Ok(Self::Proceed),
            "n" | "no" | "s" | "skip" => Ok(Self::Skip),
            "q" | "quit" => Ok(Self::Quit),
            _ => Err(Error::UnexpectedResponse {
                response: s.to_string(),
            }),
        }
    }
}

/// What the operator is asked about.
#[derive(Debug, Clone, Copy)]
pub enum Confirmation<'a> {
    Resource { name: &'a str, changes: &'a ChangeSet },
    Command { name: &'a str, command: &'a [String] },
}

impl Confirmation<'_> {
    pub fn name(&self) -> &str {
        match self {
            Self::Resource { name, .. } | Self::Command { name, .. } => name,
        }
    }
}

/// Source of operator decisions.
pub trait Prompter {
    fn confirm(&self, request: &Confirmation<'_>) -> Result<Decision>;
}
