//! Per-resource capture sink
//!
//! Everything that happens while one resource or command is processed
//! (decisions, subprocess output, failure text) lands in its transcript,
//! which becomes the result message.

use std::fmt::{self, Display};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    text: String,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line.
    pub fn line(&mut self, line: impl Display) {
        self.text.push_str(&line.to_string());
        self.text.push('\n');
    }

    /// Append a block of raw output, terminating it with a newline.
    pub fn append(&mut self, output: &str) {
        if output.is_empty() {
            return;
        }
        self.text.push_str(output);
        if !output.ends_with('\n') {
            self.text.push('\n');
        }
    }

    /// Append an error and, when `verbose`, its source chain.
    pub fn error(&mut self, err: &dyn std::error::Error, verbose: bool) {
        self.line(format_args!("Error: {err}"));
        if verbose {
            let mut source = err.source();
            while let Some(cause) = source {
                self.line(format_args!("  caused by: {cause}"));
                source = cause.source();
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lines_and_output_are_newline_terminated() {
        let mut t = Transcript::new();
        t.line("Updating /etc/motd");
        t.append("hello");
        t.append("");
        assert_eq!(t.as_str(), "Updating /etc/motd\nhello\n");
    }

    #[test]
    fn verbose_errors_include_sources() {
        let io = std::io::Error::other("disk on fire");
        let err = crate::Error::io("/etc/motd", io);
        let mut t = Transcript::new();
        t.error(&err, true);
        assert!(t.as_str().contains("caused by: disk on fire"), "{t}");
    }
}
