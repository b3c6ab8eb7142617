//! Local resolver backed by a directory of pre-resolved bundles.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use etch_fs::{ConfigStore, Format};
use serde::Deserialize;

use crate::{CommandSpec, Error, Facts, RequestState, Resolver, ResourceSpec, Response, Result, RunReport};

/// One bundle file.
#[derive(Debug, Default, Deserialize)]
struct Bundle {
    #[serde(default)]
    resources: Vec<ResourceSpec>,
    #[serde(default)]
    commands: Vec<CommandSpec>,
}

/// Serves resources and commands from `*.toml`, `*.json` and `*.yaml` files.
#[derive(Debug)]
pub struct LocalResolver {
    dir: PathBuf,
    resources: BTreeMap<String, ResourceSpec>,
    commands: BTreeMap<String, CommandSpec>,
}

impl LocalResolver {
    /// Load every bundle in `dir`. A name defined twice is an error.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
            let path = entry.map_err(|e| Error::io(dir, e))?.path();
            if path.is_file() && Format::detect(&path).is_some() {
                paths.push(path);
            }
        }
        paths.sort();

        let store = ConfigStore::new();
        let mut resources = BTreeMap::new();
        let mut commands = BTreeMap::new();
        for path in &paths {
            let bundle: Bundle = store.load(path)?;
            tracing::debug!(
                bundle = %path.display(),
                resources = bundle.resources.len(),
                commands = bundle.commands.len(),
                "Loaded local bundle"
            );
            for spec in bundle.resources {
                if resources.contains_key(&spec.name) {
                    return Err(Error::DuplicateEntry {
                        kind: "resource",
                        name: spec.name,
                        path: path.clone(),
                    });
                }
                resources.insert(spec.name.clone(), spec);
            }
            for spec in bundle.commands {
                if commands.contains_key(&spec.name) {
                    return Err(Error::DuplicateEntry {
                        kind: "command",
                        name: spec.name,
                        path: path.clone(),
                    });
                }
                commands.insert(spec.name.clone(), spec);
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            resources,
            commands,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Resolver for LocalResolver {
    fn resolve(&self, _facts: &Facts, request: &RequestState) -> Result<Response> {
        let resources = self
            .resources
            .values()
            .filter(|spec| request.wants_file(&spec.name))
            .cloned()
            .collect();
        let commands = self
            .commands
            .values()
            .filter(|spec| request.wants_command(&spec.name))
            .cloned()
            .collect();
        Ok(Response {
            resources,
            commands,
            ..Response::default()
        })
    }

    fn report(&self, report: &RunReport) -> Result<()> {
        tracing::debug!(status = report.status, "Local mode, results not submitted");
        Ok(())
    }

    fn accepts_reports(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MOTD: &str = r#"
[[resources]]
name = "/etc/motd"
[resources.action]
type = "file"
perms = "0644"
contents = "aGVsbG8K"

[[commands]]
name = "restart"
[[commands.steps]]
command = ["true"]
"#;

    fn resolver() -> (tempfile::TempDir, LocalResolver) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("motd.toml"), MOTD).unwrap();
        std::fs::write(
            dir.path().join("hosts.json"),
            r#"{"resources":[{"name":"/etc/hosts","action":{"type":"file"}}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("README"), "ignored").unwrap();
        let resolver = LocalResolver::load(dir.path()).unwrap();
        (dir, resolver)
    }

    #[test]
    fn generate_all_returns_every_entry() {
        let (_dir, resolver) = resolver();
        let response = resolver
            .resolve(&Facts::new(), &RequestState::generate_all())
            .unwrap();
        let names: Vec<_> = response.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["/etc/hosts", "/etc/motd"]);
        assert_eq!(response.commands.len(), 1);
    }

    #[test]
    fn explicit_targets_filter_the_response() {
        let (_dir, resolver) = resolver();
        let mut request = RequestState::new();
        request.request_file("/etc/motd");
        let response = resolver.resolve(&Facts::new(), &request).unwrap();
        assert_eq!(response.resources.len(), 1);
        assert!(response.commands.is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let (dir, _) = resolver();
        std::fs::write(
            dir.path().join("zz.json"),
            r#"{"resources":[{"name":"/etc/motd","action":{"type":"revert"}}]}"#,
        )
        .unwrap();
        assert!(matches!(
            LocalResolver::load(dir.path()),
            Err(Error::DuplicateEntry { .. })
        ));
    }
}
