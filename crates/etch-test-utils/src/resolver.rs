//! [`ScriptedResolver`]: an in-memory authority that records what it is sent.

use std::cell::RefCell;
use std::collections::VecDeque;

use etch_protocol::{CommandSpec, Facts, RequestState, Resolver, ResourceSpec, Response, RunReport};

/// Serves a fixed catalogue, filtered by what each request asks for.
///
/// Queued responses, when present, are returned verbatim before the
/// catalogue is consulted.
#[derive(Default)]
pub struct ScriptedResolver {
    resources: Vec<ResourceSpec>,
    commands: Vec<CommandSpec>,
    queued: RefCell<VecDeque<Response>>,
    requests: RefCell<Vec<RequestState>>,
    reports: RefCell<Vec<RunReport>>,
    /// Pretend the authority is down from this request on (0-based)
    fail_from: Option<usize>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(mut self, spec: ResourceSpec) -> Self {
        self.resources.push(spec);
        self
    }

    pub fn command(mut self, spec: CommandSpec) -> Self {
        self.commands.push(spec);
        self
    }

    pub fn queue(self, response: Response) -> Self {
        self.queued.borrow_mut().push_back(response);
        self
    }

    pub fn failing(self) -> Self {
        self.failing_after(0)
    }

    /// Answer the first `requests` requests, then fail every later one.
    pub fn failing_after(mut self, requests: usize) -> Self {
        self.fail_from = Some(requests);
        self
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<RequestState> {
        self.requests.borrow().clone()
    }

    pub fn reports(&self) -> Vec<RunReport> {
        self.reports.borrow().clone()
    }
}

impl Resolver for ScriptedResolver {
    fn resolve(&self, _facts: &Facts, request: &RequestState) -> etch_protocol::Result<Response> {
        let index = {
            let mut requests = self.requests.borrow_mut();
            requests.push(request.clone());
            requests.len() - 1
        };
        if self.fail_from.is_some_and(|from| index >= from) {
            return Err(etch_protocol::Error::Status {
                url: "scripted://files".to_string(),
                status: 500,
                body: "scripted failure".to_string(),
            });
        }
        if let Some(response) = self.queued.borrow_mut().pop_front() {
            return Ok(response);
        }
        Ok(Response {
            resources: self
                .resources
                .iter()
                .filter(|r| request.wants_file(&r.name))
                .cloned()
                .collect(),
            commands: self
                .commands
                .iter()
                .filter(|c| request.wants_command(&c.name))
                .cloned()
                .collect(),
            ..Response::default()
        })
    }

    fn report(&self, report: &RunReport) -> etch_protocol::Result<()> {
        self.reports.borrow_mut().push(report.clone());
        Ok(())
    }
}
