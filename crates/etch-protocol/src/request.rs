//! Accumulated request state and its form encoding.

use std::collections::{BTreeMap, BTreeSet};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use url::form_urlencoded;

use crate::Facts;

/// Name used on the wire to ask for every resource and command.
pub const GENERATE_ALL: &str = "GENERATEALL";

/// Per-resource data carried by a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRequest {
    /// SHA-1 of the archived original
    pub sha1sum: Option<String>,
    /// Raw archived original
    pub contents: Option<Vec<u8>>,
    /// Merged local side-channel document
    pub local_requests: Option<String>,
}

impl FileRequest {
    fn is_bare(&self) -> bool {
        self.sha1sum.is_none() && self.contents.is_none() && self.local_requests.is_none()
    }
}

/// What the next round asks the authority for.
///
/// Rebuilt every round from the previous response and local state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestState {
    generate_all: bool,
    files: BTreeMap<String, FileRequest>,
    commands: BTreeSet<String>,
}

impl RequestState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request for every resource and command.
    pub fn generate_all() -> Self {
        Self {
            generate_all: true,
            ..Self::default()
        }
    }

    pub fn wants_all(&self) -> bool {
        self.generate_all
    }

    /// Ask for `name` as a target, keeping any data already attached.
    pub fn request_file(&mut self, name: &str) -> &mut FileRequest {
        self.files.entry(name.to_string()).or_default()
    }

    pub fn request_command(&mut self, name: &str) {
        self.commands.insert(name.to_string());
    }

    pub fn set_sha1sum(&mut self, name: &str, sum: String) {
        self.request_file(name).sha1sum = Some(sum);
    }

    pub fn set_contents(&mut self, name: &str, contents: Vec<u8>) {
        self.request_file(name).contents = Some(contents);
    }

    pub fn set_local_requests(&mut self, name: &str, document: String) {
        self.request_file(name).local_requests = Some(document);
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &FileRequest)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn file(&self, name: &str) -> Option<&FileRequest> {
        self.files.get(name)
    }

    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(String::as_str)
    }

    pub fn wants_file(&self, name: &str) -> bool {
        self.generate_all || self.files.contains_key(name)
    }

    pub fn wants_command(&self, name: &str) -> bool {
        self.generate_all || self.commands.contains(name)
    }

    /// A request asking for nothing means the run has converged.
    pub fn is_empty(&self) -> bool {
        !self.generate_all && self.files.is_empty() && self.commands.is_empty()
    }

    /// Form-encode the request, without the signature timestamp.
    pub fn encode(&self, facts: &Facts, options: &EncodeOptions<'_>) -> String {
        let mut form = form_urlencoded::Serializer::new(String::new());
        form.append_pair("fqdn", facts.fqdn());
        for (key, value) in facts.iter() {
            form.append_pair(&format!("facts[{key}]"), value);
        }
        if options.debug {
            form.append_pair("debug", "1");
        }
        if let Some(tag) = options.tag {
            form.append_pair("tag", tag);
        }
        if self.generate_all {
            form.append_pair(&format!("files[{GENERATE_ALL}]"), "1");
        }
        for (name, file) in &self.files {
            if file.is_bare() {
                form.append_pair(&format!("files[{name}]"), "");
                continue;
            }
            if let Some(sum) = &file.sha1sum {
                form.append_pair(&format!("files[{name}][sha1sum]"), sum);
            }
            if let Some(contents) = &file.contents {
                form.append_pair(&format!("files[{name}][contents]"), &STANDARD.encode(contents));
            }
            if let Some(local) = &file.local_requests {
                form.append_pair(&format!("files[{name}][local_requests]"), local);
            }
        }
        for name in &self.commands {
            form.append_pair(&format!("commands[{name}]"), "1");
        }
        form.finish()
    }
}

/// Request-wide options.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeOptions<'a> {
    pub debug: bool,
    pub tag: Option<&'a str>,
}
