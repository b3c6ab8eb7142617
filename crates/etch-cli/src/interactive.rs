//! Interactive confirmation for `--interactive` runs
//!
//! Uses dialoguer to read the operator's answer from the terminal.

use std::fmt::Write as _;

use colored::Colorize;
use dialoguer::Input;
use etch_core::{Confirmation, Decision, Prompter};

const PROMPT: &str = "Apply? [y]es, [n]o (skip), [q]uit";

/// Asks on the terminal before every change.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&self, request: &Confirmation<'_>) -> etch_core::Result<Decision> {
        println!();
        print!("{}", render(request));
        let answer: String = Input::new()
            .with_prompt(PROMPT)
            .interact_text()
            .map_err(|e| etch_core::Error::io("/dev/tty", std::io::Error::other(e)))?;
        Decision::parse(&answer)
    }
}

/// What the operator sees before answering.
fn render(request: &Confirmation<'_>) -> String {
    let mut out = String::new();
    match request {
        Confirmation::Resource { name, changes } => {
            let _ = writeln!(out, "{} {}", name.bold(), format!("({})", changes.summary()).dimmed());
            if let Some(diff) = &changes.diff {
                for line in diff.lines() {
                    let line = if line.starts_with("+++") || line.starts_with("---") {
                        line.bold()
                    } else if line.starts_with('+') {
                        line.green()
                    } else if line.starts_with('-') {
                        line.red()
                    } else if line.starts_with("@@") {
                        line.cyan()
                    } else {
                        line.normal()
                    };
                    let _ = writeln!(out, "{line}");
                }
            }
        }
        Confirmation::Command { name, command } => {
            let _ = writeln!(out, "{} {}", "command".dimmed(), name.bold());
            for line in command.iter() {
                let _ = writeln!(out, "  {}", line.cyan());
            }
        }
    }
    out
}
