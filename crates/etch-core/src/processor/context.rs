//! Run-scoped processing state, passed explicitly through every recursive call

use std::collections::{BTreeMap, BTreeSet, HashMap};

use etch_protocol::{CommandSpec, ProcessingResult, ResourceSpec};

/// How a finished resource or command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Succeeded,
    Failed,
}

/// Key identifying a resource or command in the run-scoped sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemKey {
    Resource(String),
    Command(String),
}

impl ItemKey {
    pub fn name(&self) -> &str {
        match self {
            Self::Resource(name) | Self::Command(name) => name,
        }
    }

    /// Name of the lock file guarding this item.
    pub fn lock_name(&self) -> String {
        match self {
            Self::Resource(name) => name.clone(),
            Self::Command(name) => format!("command:{name}"),
        }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resource(name) => f.write_str(name),
            Self::Command(name) => write!(f, "command {name}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct RunContext {
    resources: BTreeMap<String, ResourceSpec>,
    commands: BTreeMap<String, CommandSpec>,
    /// The current round asked for everything
    complete_round: bool,
    in_progress: Vec<ItemKey>,
    completed: HashMap<ItemKey, Completion>,
    once_per_run: Vec<String>,
    results: Vec<ProcessingResult>,
    deferred: BTreeSet<ItemKey>,
    /// Dependencies asked for in an earlier round
    requested: BTreeSet<ItemKey>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the specs with the ones received this round.
    ///
    /// `complete` means the response answered a generate-everything request,
    /// so anything missing from it will never arrive.
    pub fn begin_round(&mut self, resources: Vec<ResourceSpec>, commands: Vec<CommandSpec>, complete: bool) {
        self.resources = resources.into_iter().map(|r| (r.name.clone(), r)).collect();
        self.commands = commands.into_iter().map(|c| (c.name.clone(), c)).collect();
        self.complete_round = complete;
        self.deferred.clear();
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceSpec> {
        self.resources.get(name)
    }

    pub fn command(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(name)
    }

    pub fn resource_names(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    }

    pub fn command_names(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }

    pub fn is_in_progress(&self, key: &ItemKey) -> bool {
        self.in_progress.contains(key)
    }

    pub(crate) fn enter(&mut self, key: ItemKey) {
        self.in_progress.push(key);
    }

    pub(crate) fn leave(&mut self) {
        self.in_progress.pop();
    }

    /// Names along the current dependency chain, outermost first.
    pub fn chain(&self) -> Vec<String> {
        self.in_progress.iter().map(ItemKey::lock_name).collect()
    }

    pub fn completion(&self, key: &ItemKey) -> Option<Completion> {
        self.completed.get(key).copied()
    }

    pub(crate) fn complete(&mut self, key: ItemKey, completion: Completion) {
        self.completed.insert(key, completion);
    }

    pub(crate) fn record(&mut self, result: ProcessingResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[ProcessingResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<ProcessingResult> {
        self.results
    }

    pub(crate) fn queue_once_per_run(&mut self, commands: &[String]) {
        for command in commands {
            if !self.once_per_run.contains(command) {
                self.once_per_run.push(command.clone());
            }
        }
    }

    pub fn take_once_per_run(&mut self) -> Vec<String> {
        std::mem::take(&mut self.once_per_run)
    }

    /// Whether a missing dependency can still be obtained in a later round.
    pub(crate) fn can_request(&self, key: &ItemKey) -> bool {
        !self.complete_round && !self.requested.contains(key)
    }

    pub(crate) fn defer(&mut self, key: ItemKey) {
        self.deferred.insert(key);
    }

    /// Items to ask for next round; each is remembered as requested.
    pub fn take_deferred(&mut self) -> Vec<ItemKey> {
        let deferred = std::mem::take(&mut self.deferred);
        self.requested.extend(deferred.iter().cloned());
        deferred.into_iter().collect()
    }
}
