//! The seam between the agent and whatever resolves its configuration.

use crate::{Facts, RequestState, Response, Result, RunReport};

/// Resolves desired state for a host and accepts its results.
pub trait Resolver {
    /// Exchange one request for one response.
    fn resolve(&self, facts: &Facts, request: &RequestState) -> Result<Response>;

    /// Submit the final run report.
    fn report(&self, report: &RunReport) -> Result<()>;

    /// Whether reports go anywhere. Local resolvers keep results local.
    fn accepts_reports(&self) -> bool {
        true
    }
}
