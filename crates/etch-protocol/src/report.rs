//! Per-resource results and the run report.

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// Outcome of processing one resource or command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Resource or command name
    pub file: String,
    pub success: bool,
    /// Captured output and failure text
    pub message: String,
}

impl ProcessingResult {
    pub fn new(file: impl Into<String>, success: bool, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            success,
            message: message.into(),
        }
    }
}

/// Aggregated results submitted at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub fqdn: String,
    pub status: i32,
    pub message: String,
    pub results: Vec<ProcessingResult>,
}

impl RunReport {
    /// Form-encode the report, without the signature timestamp.
    pub fn encode(&self) -> String {
        let mut form = form_urlencoded::Serializer::new(String::new());
        form.append_pair("fqdn", &self.fqdn);
        form.append_pair("status", &self.status.to_string());
        form.append_pair("message", &self.message);
        for result in &self.results {
            form.append_pair("results[][file]", &result.file);
            form.append_pair("results[][success]", if result.success { "true" } else { "false" });
            form.append_pair("results[][message]", &result.message);
        }
        form.finish()
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }
}
