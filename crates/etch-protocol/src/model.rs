//! Typed wire model of resolved configuration
//!
//! A response is deserialized once into these types; nothing downstream
//! queries the raw document.

use serde::{Deserialize, Serialize};

/// Desired state of one named resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Absolute path as seen by the authority
    pub name: String,

    /// Resources that must be processed first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depend: Vec<String>,

    /// Commands that must be processed first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependcommand: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post: Vec<String>,

    /// Run only when this is the first change ever made to the resource
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_once: Vec<String>,

    /// Run at most once per invocation, after every resource is processed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_once_per_run: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test_before_post: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test: Vec<String>,

    pub action: Action,
}

impl ResourceSpec {
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            depend: Vec::new(),
            dependcommand: Vec::new(),
            setup: Vec::new(),
            pre: Vec::new(),
            post: Vec::new(),
            post_once: Vec::new(),
            post_once_per_run: Vec::new(),
            test_before_post: Vec::new(),
            test: Vec::new(),
            action,
        }
    }

    /// Whether a verification step exists, which is what makes a backup necessary.
    pub fn has_tests(&self) -> bool {
        !self.test_before_post.is_empty() || !self.test.is_empty()
    }
}

/// What to do with a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Restore the archived original and forget it
    Revert,
    File(FileAction),
    Link(LinkAction),
    Directory(DirectoryAction),
    Delete(DeleteAction),
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Revert => "revert",
            Self::File(_) => "file",
            Self::Link(_) => "link",
            Self::Directory(_) => "directory",
            Self::Delete(_) => "delete",
        }
    }

    /// Whether applying this action may replace a live directory.
    pub fn overwrites_directory(&self) -> bool {
        match self {
            Self::File(f) => f.overwrite_directory,
            Self::Link(l) => l.overwrite_directory,
            Self::Delete(d) => d.overwrite_directory,
            Self::Directory(_) | Self::Revert => false,
        }
    }
}

/// Ownership and permission fields shared by every managed kind.
///
/// `None` leaves the live attribute unmanaged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    /// Octal mode such as `"0644"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perms: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAction {
    #[serde(flatten)]
    pub attrs: Attributes,
    #[serde(default, with = "base64_bytes")]
    pub contents: Vec<u8>,
    #[serde(default)]
    pub overwrite_directory: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAction {
    #[serde(flatten)]
    pub attrs: Attributes,
    pub dest: String,
    #[serde(default)]
    pub allow_nonexistent_dest: bool,
    #[serde(default)]
    pub overwrite_directory: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryAction {
    #[serde(flatten)]
    pub attrs: Attributes,
    /// Create the directory when it does not exist
    #[serde(default)]
    pub create: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAction {
    /// Must be set for the deletion to happen
    #[serde(default)]
    pub proceed: bool,
    #[serde(default)]
    pub overwrite_directory: bool,
}

/// Named multi-step command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depend: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependfile: Vec<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Guard/action pair. The action runs only when a guard fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guard: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
}

/// One authority response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
    /// Resources whose original SHA-1 the authority needs
    #[serde(default)]
    pub need_sums: Vec<String>,
    /// Resources whose original content the authority needs
    #[serde(default)]
    pub need_origs: Vec<String>,
    #[serde(default)]
    pub retry_commands: Vec<String>,
}

impl Response {
    pub fn parse(body: &str) -> crate::Result<Self> {
        serde_json::from_str(body).map_err(|e| crate::Error::MalformedResponse {
            message: e.to_string(),
        })
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let compact: String = encoded.split_whitespace().collect();
        STANDARD.decode(compact).map_err(serde::de::Error::custom)
    }
}
