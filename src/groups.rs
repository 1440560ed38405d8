//! Assembly of the command group tree and of the [`GlobalMetadata`] model.
//!
//! Groups can be declared explicitly (with a description, default command
//! and member list) or implicitly through a command's group memberships.
//! A name containing whitespace is a path: `"remote show"` is the `show`
//! sub-group of `remote`, and intermediate groups are created on demand.

use crate::merge::merge_option_set;
use crate::metadata::{
    CommandGroupMetadata, CommandId, CommandMetadata, GlobalMetadata, GroupId, MetadataError,
    OptionMetadata, ParserMetadata,
};
use crate::restrictions::GlobalRestriction;
use std::collections::BTreeSet;

/// An explicit group declaration.
#[derive(Debug, Clone, Default)]
pub struct GroupDeclaration {
    name: String,
    description: Option<String>,
    hidden: bool,
    default_command: Option<String>,
    commands: Vec<String>,
}

impl GroupDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn default_command(mut self, command: impl Into<String>) -> Self {
        self.default_command = Some(command.into());
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.commands.push(command.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Arena of groups under construction.
#[derive(Debug, Default)]
struct GroupTree {
    groups: Vec<CommandGroupMetadata>,
    top_level: Vec<GroupId>,
}

impl GroupTree {
    /// Find or create the group at `path`, creating missing ancestors.
    fn materialize(&mut self, path: &str) -> Result<GroupId, MetadataError> {
        let segments: Vec<&str> = path.split_whitespace().collect();
        if segments.is_empty() {
            return Err(MetadataError::InvalidGroupName(path.to_string()));
        }

        let mut parent: Option<GroupId> = None;
        for segment in segments {
            let siblings = match parent {
                None => &self.top_level,
                Some(id) => &self.groups[id.0].sub_groups,
            };
            let existing = siblings
                .iter()
                .copied()
                .find(|id| self.groups[id.0].name == segment);
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = GroupId(self.groups.len());
                    self.groups.push(CommandGroupMetadata::new(segment, parent));
                    match parent {
                        None => self.top_level.push(id),
                        Some(p) => self.groups[p.0].add_sub_group(id),
                    }
                    tracing::trace!(group = path, segment, "created group");
                    id
                }
            };
            parent = Some(id);
        }
        // `segments` was non-empty, so the loop assigned at least once.
        parent.ok_or_else(|| MetadataError::InvalidGroupName(path.to_string()))
    }
}

/// Builder for the complete, immutable [`GlobalMetadata`].
#[derive(Debug)]
pub struct GlobalMetadataBuilder {
    name: String,
    description: Option<String>,
    parser: ParserMetadata,
    commands: Vec<CommandMetadata>,
    groups: Vec<GroupDeclaration>,
    default_command: Option<String>,
    restrictions: Vec<GlobalRestriction>,
}

impl GlobalMetadataBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parser: ParserMetadata::default(),
            commands: Vec::new(),
            groups: Vec::new(),
            default_command: None,
            restrictions: GlobalRestriction::defaults(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn parser(mut self, parser: ParserMetadata) -> Self {
        self.parser = parser;
        self
    }

    pub fn command(mut self, command: CommandMetadata) -> Self {
        self.commands.push(command);
        self
    }

    pub fn commands<I: IntoIterator<Item = CommandMetadata>>(mut self, commands: I) -> Self {
        self.commands.extend(commands);
        self
    }

    pub fn group(mut self, group: GroupDeclaration) -> Self {
        self.groups.push(group);
        self
    }

    /// Command run when no command name is given at the top level.
    pub fn default_command(mut self, command: impl Into<String>) -> Self {
        self.default_command = Some(command.into());
        self
    }

    /// Replace the global restrictions (both are enabled by default).
    pub fn restrictions(mut self, restrictions: Vec<GlobalRestriction>) -> Self {
        self.restrictions = restrictions;
        self
    }

    pub fn build(self) -> Result<GlobalMetadata, MetadataError> {
        if self.name.trim().is_empty() || self.name.chars().any(char::is_whitespace) {
            return Err(MetadataError::InvalidProgramName(self.name));
        }
        self.parser.validate()?;

        let mut seen = BTreeSet::new();
        for command in &self.commands {
            if !seen.insert(command.name()) {
                return Err(MetadataError::DuplicateCommand(command.name().to_string()));
            }
        }
        let lookup = |name: &str| -> Result<CommandId, MetadataError> {
            self.commands
                .iter()
                .position(|c| c.name() == name)
                .map(CommandId)
                .ok_or_else(|| MetadataError::UnknownCommand(name.to_string()))
        };

        let mut tree = GroupTree::default();
        let mut grouped = BTreeSet::new();

        // Parents before children, so intermediate declarations take effect first.
        let mut declarations: Vec<&GroupDeclaration> = self.groups.iter().collect();
        declarations.sort_by(|a, b| {
            a.name
                .trim()
                .len()
                .cmp(&b.name.trim().len())
                .then_with(|| a.name.cmp(&b.name))
        });

        for declaration in declarations {
            let id = tree.materialize(&declaration.name)?;
            let group = &mut tree.groups[id.0];
            if declaration.description.is_some() {
                group.description = declaration.description.clone();
            }
            group.hidden |= declaration.hidden;

            if let Some(name) = &declaration.default_command {
                let command = lookup(name)?;
                if let Some(existing) = group.default_command.filter(|c| *c != command) {
                    return Err(MetadataError::ConflictingDefaultCommand {
                        group: declaration.name.clone(),
                        first: self.commands[existing.0].name().to_string(),
                        second: name.clone(),
                    });
                }
                group.default_command = Some(command);
                group.add_command(command);
                grouped.insert(command);
            }
            for name in &declaration.commands {
                let command = lookup(name)?;
                group.add_command(command);
                grouped.insert(command);
            }
        }

        // Memberships declared on the commands themselves.
        for (index, command) in self.commands.iter().enumerate() {
            for path in command.groups() {
                let id = tree.materialize(path)?;
                tree.groups[id.0].add_command(CommandId(index));
                grouped.insert(CommandId(index));
            }
        }

        for group in &mut tree.groups {
            let mut contributed: Vec<OptionMetadata> = Vec::new();
            if let Some(default) = group.default_command {
                contributed.extend(self.commands[default.0].group_options().iter().cloned());
            }
            for member in &group.commands {
                contributed.extend(self.commands[member.0].group_options().iter().cloned());
            }
            group.options = merge_option_set(contributed)?;
        }

        let options = merge_option_set(
            self.commands
                .iter()
                .flat_map(|c| c.global_options().iter().cloned())
                .collect(),
        )?;

        let default_command = self.default_command.as_deref().map(lookup).transpose()?;
        let default_group_commands: Vec<CommandId> = (0..self.commands.len())
            .map(CommandId)
            .filter(|id| !grouped.contains(id))
            .collect();

        tracing::debug!(
            program = %self.name,
            commands = self.commands.len(),
            groups = tree.groups.len(),
            ungrouped = default_group_commands.len(),
            "assembled command metadata"
        );

        Ok(GlobalMetadata {
            name: self.name,
            description: self.description,
            options,
            default_command,
            default_group_commands,
            command_groups: tree.top_level,
            commands: self.commands,
            groups: tree.groups,
            restrictions: self.restrictions,
            parser: self.parser,
        })
    }
}
