//! Local request side-channel
//!
//! `requests/<path>/` may hold fragment files written by other tools on the
//! host. Each fragment is a JSON object with the single key `request`; valid
//! fragments are merged into `{"requests": [...]}` and sent with the
//! resource's entry in the next request. Invalid fragments are skipped.

use std::fs;
use std::path::Path;

use etch_fs::AgentLayout;
use serde_json::{Map, Value, json};

use crate::{Error, Result};

const ROOT_KEY: &str = "request";

#[derive(Debug, Clone)]
pub struct LocalRequests {
    layout: AgentLayout,
}

impl LocalRequests {
    pub fn new(layout: &AgentLayout) -> Self {
        Self {
            layout: layout.clone(),
        }
    }

    /// Merged document for `name`, or `None` when there are no valid fragments.
    pub fn collect(&self, name: &str) -> Result<Option<String>> {
        let dir = self.layout.requests_for(name)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(&dir, e)),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&dir, e))?;
            if entry.file_type().map_err(|e| Error::io(entry.path(), e))?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let requests: Vec<Value> = paths.iter().filter_map(|path| read_fragment(name, path)).collect();
        if requests.is_empty() {
            return Ok(None);
        }
        tracing::debug!(resource = %name, count = requests.len(), "Attaching local requests");
        Ok(Some(json!({ "requests": requests }).to_string()))
    }
}

fn read_fragment(name: &str, path: &Path) -> Option<Value> {
    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()))
        .and_then(|value| match value {
            Value::Object(map) => unwrap_root(map),
            _ => Err("not a JSON object".to_string()),
        });
    match parsed {
        Ok(request) => Some(request),
        Err(reason) => {
            tracing::warn!(resource = %name, ?path, %reason, "Skipping malformed local request");
            None
        }
    }
}

fn unwrap_root(mut map: Map<String, Value>) -> std::result::Result<Value, String> {
    if map.len() != 1 {
        return Err(format!("expected a single `{ROOT_KEY}` key"));
    }
    map.remove(ROOT_KEY)
        .ok_or_else(|| format!("root key must be `{ROOT_KEY}`"))
}
