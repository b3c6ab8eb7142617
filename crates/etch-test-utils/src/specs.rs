//! Builders for [`ResourceSpec`] and [`CommandSpec`] fixtures.

use etch_protocol::{
    Action, Attributes, CommandSpec, DeleteAction, DirectoryAction, FileAction, LinkAction,
    ResourceSpec, Step,
};

pub struct SpecBuilder {
    spec: ResourceSpec,
}

impl SpecBuilder {
    pub fn file(name: &str, contents: &str) -> Self {
        Self::with_action(
            name,
            Action::File(FileAction {
                contents: contents.as_bytes().to_vec(),
                ..FileAction::default()
            }),
        )
    }

    pub fn link(name: &str, dest: &str) -> Self {
        Self::with_action(
            name,
            Action::Link(LinkAction {
                dest: dest.to_string(),
                ..LinkAction::default()
            }),
        )
    }

    pub fn directory(name: &str) -> Self {
        Self::with_action(
            name,
            Action::Directory(DirectoryAction {
                create: true,
                ..DirectoryAction::default()
            }),
        )
    }

    pub fn delete(name: &str) -> Self {
        Self::with_action(
            name,
            Action::Delete(DeleteAction {
                proceed: true,
                overwrite_directory: false,
            }),
        )
    }

    pub fn revert(name: &str) -> Self {
        Self::with_action(name, Action::Revert)
    }

    fn with_action(name: &str, action: Action) -> Self {
        Self {
            spec: ResourceSpec::new(name, action),
        }
    }

    fn attrs(&mut self) -> Option<&mut Attributes> {
        match &mut self.spec.action {
            Action::File(a) => Some(&mut a.attrs),
            Action::Link(a) => Some(&mut a.attrs),
            Action::Directory(a) => Some(&mut a.attrs),
            Action::Delete(_) | Action::Revert => None,
        }
    }

    pub fn perms(mut self, perms: &str) -> Self {
        if let Some(attrs) = self.attrs() {
            attrs.perms = Some(perms.to_string());
        }
        self
    }

    pub fn owner(mut self, owner: &str) -> Self {
        if let Some(attrs) = self.attrs() {
            attrs.owner = Some(owner.to_string());
        }
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        if let Some(attrs) = self.attrs() {
            attrs.group = Some(group.to_string());
        }
        self
    }

    pub fn overwrite_directory(mut self) -> Self {
        match &mut self.spec.action {
            Action::File(a) => a.overwrite_directory = true,
            Action::Link(a) => a.overwrite_directory = true,
            Action::Delete(a) => a.overwrite_directory = true,
            Action::Directory(_) | Action::Revert => {}
        }
        self
    }

    pub fn depend(mut self, name: &str) -> Self {
        self.spec.depend.push(name.to_string());
        self
    }

    pub fn dependcommand(mut self, name: &str) -> Self {
        self.spec.dependcommand.push(name.to_string());
        self
    }

    pub fn setup(mut self, command: &str) -> Self {
        self.spec.setup.push(command.to_string());
        self
    }

    pub fn pre(mut self, command: &str) -> Self {
        self.spec.pre.push(command.to_string());
        self
    }

    pub fn post(mut self, command: &str) -> Self {
        self.spec.post.push(command.to_string());
        self
    }

    pub fn post_once(mut self, command: &str) -> Self {
        self.spec.post_once.push(command.to_string());
        self
    }

    pub fn post_once_per_run(mut self, command: &str) -> Self {
        self.spec.post_once_per_run.push(command.to_string());
        self
    }

    pub fn test_before_post(mut self, command: &str) -> Self {
        self.spec.test_before_post.push(command.to_string());
        self
    }

    pub fn test(mut self, command: &str) -> Self {
        self.spec.test.push(command.to_string());
        self
    }

    pub fn build(self) -> ResourceSpec {
        self.spec
    }
}

pub struct CommandBuilder {
    spec: CommandSpec,
}

impl CommandBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            spec: CommandSpec {
                name: name.to_string(),
                depend: Vec::new(),
                dependfile: Vec::new(),
                steps: Vec::new(),
            },
        }
    }

    /// Add a step; an empty `guard` makes the command unconditional.
    pub fn step(mut self, guard: &str, command: &str) -> Self {
        let guard = if guard.is_empty() {
            Vec::new()
        } else {
            vec![guard.to_string()]
        };
        self.spec.steps.push(Step {
            guard,
            command: vec![command.to_string()],
        });
        self
    }

    pub fn depend(mut self, name: &str) -> Self {
        self.spec.depend.push(name.to_string());
        self
    }

    pub fn dependfile(mut self, name: &str) -> Self {
        self.spec.dependfile.push(name.to_string());
        self
    }

    pub fn build(self) -> CommandSpec {
        self.spec
    }
}
