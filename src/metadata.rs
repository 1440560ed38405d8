//! Immutable metadata records describing options, arguments, commands and groups.

use crate::alias::UserAliasSource;
use crate::merge::override_option_set;
use crate::restrictions::{GlobalRestriction, Restriction};
use crate::strategies::{ClassicGetOptParser, LongGetOptParser, OptionParser, StandardOptionParser};
use crate::types::{DefaultTypeConverter, TypeConverter, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while assembling the metadata model.
///
/// These abort program startup; none of them can occur during parsing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetadataError {
    #[error("option '{0}' must declare at least one name")]
    NoOptionNames(String),

    #[error("option '{title}' has an invalid name '{name}': names may not be blank or contain whitespace")]
    InvalidOptionName { title: String, name: String },

    #[error("option '{title}' declares the name '{name}' more than once")]
    DuplicateOptionName { title: String, name: String },

    #[error("'{0}' has no accessor to bind values to")]
    MissingAccessor(String),

    #[error("conflicting definitions for option name '{name}': {first} and {second}")]
    ConflictingOptionDefinition {
        name: String,
        first: String,
        second: String,
    },

    #[error("option definitions {first} and {second} share some but not all names")]
    OverlappingOptionDefinition { first: String, second: String },

    #[error("option '{title}' is sealed and cannot be overridden by {child}")]
    SealedOptionOverride { title: String, child: String },

    #[error("option '{title}' redefines {parent} without declaring itself an override")]
    UndeclaredOverride { title: String, parent: String },

    #[error("option '{title}' cannot change its type from {parent} to {child}")]
    IncompatibleOptionType {
        title: String,
        parent: ValueType,
        child: ValueType,
    },

    #[error("invalid command name '{0}': must be non-blank and contain no whitespace")]
    InvalidCommandName(String),

    #[error("invalid group name '{0}'")]
    InvalidGroupName(String),

    #[error("invalid program name '{0}'")]
    InvalidProgramName(String),

    #[error("command '{0}' declares both a default option and arguments")]
    DefaultOptionWithArguments(String),

    #[error("command '{command}' has no option named any of {names:?} to use as its default option")]
    UnknownDefaultOption { command: String, names: Vec<String> },

    #[error("default option '{title}' of command '{command}' must have arity 1, not {arity}")]
    InvalidDefaultOption {
        command: String,
        title: String,
        arity: usize,
    },

    #[error("duplicate command name '{0}'")]
    DuplicateCommand(String),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("group '{group}' declares conflicting default commands '{first}' and '{second}'")]
    ConflictingDefaultCommand {
        group: String,
        first: String,
        second: String,
    },

    #[error("invalid parser configuration: {0}")]
    InvalidParserConfig(String),

    #[error("invalid alias '{0}': alias names may not be blank and must expand to at least one token")]
    InvalidAlias(String),

    #[error("invalid restriction on '{title}': {reason}")]
    InvalidRestriction { title: String, reason: String },
}

/// Level at which an option is accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionScope {
    /// Accepted before the group path and anywhere after it
    Global,
    /// Accepted after the group name
    Group,
    /// Accepted after the command name
    #[default]
    Command,
}

impl fmt::Display for OptionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionScope::Global => f.write_str("global"),
            OptionScope::Group => f.write_str("group"),
            OptionScope::Command => f.write_str("command"),
        }
    }
}

/// Opaque binding describing where a resolved value is written.
///
/// The core never writes through an accessor itself; it only reports
/// `(accessor, value)` pairs to the command factory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Accessor {
    name: String,
    value_type: ValueType,
    multi_valued: bool,
}

impl Accessor {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            multi_valued: false,
        }
    }

    /// Mark the binding as collecting every occurrence instead of the last one.
    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn is_multi_valued(&self) -> bool {
        self.multi_valued
    }
}

impl fmt::Display for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn is_valid_token_name(name: &str) -> bool {
    !name.trim().is_empty() && !name.chars().any(char::is_whitespace)
}

fn push_unique(accessors: &mut Vec<Accessor>, accessor: &Accessor) {
    if !accessors.contains(accessor) {
        accessors.push(accessor.clone());
    }
}

/// Definition of one option.
#[derive(Debug, Clone)]
pub struct OptionMetadata {
    scope: OptionScope,
    names: Vec<String>,
    title: String,
    description: Option<String>,
    arity: Option<usize>,
    hidden: bool,
    overrides: bool,
    sealed: bool,
    restrictions: Vec<Restriction>,
    accessors: Vec<Accessor>,
}

impl OptionMetadata {
    /// Create an option bound to `accessor`.
    ///
    /// The title defaults to the last `.`-separated segment of the accessor name.
    pub fn new<I, S>(scope: OptionScope, names: I, accessor: Accessor) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let title = accessor
            .name()
            .rsplit('.')
            .next()
            .unwrap_or(accessor.name())
            .to_string();
        Self {
            scope,
            names: names.into_iter().map(Into::into).collect(),
            title,
            description: None,
            arity: None,
            hidden: false,
            overrides: false,
            sealed: false,
            restrictions: Vec::new(),
            accessors: vec![accessor],
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    pub fn with_restriction(mut self, restriction: Restriction) -> Self {
        self.restrictions.push(restriction);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Declare that this option deliberately redefines a parent's option.
    pub fn overriding(mut self) -> Self {
        self.overrides = true;
        self
    }

    /// Forbid derived declarations from overriding this option.
    pub fn sealed(mut self) -> Self {
        self.sealed = true;
        self
    }

    /// Check the per-option invariants.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.names.is_empty() {
            return Err(MetadataError::NoOptionNames(self.title.clone()));
        }
        let mut seen = BTreeSet::new();
        for name in &self.names {
            if !is_valid_token_name(name) {
                return Err(MetadataError::InvalidOptionName {
                    title: self.title.clone(),
                    name: name.clone(),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(MetadataError::DuplicateOptionName {
                    title: self.title.clone(),
                    name: name.clone(),
                });
            }
        }
        if self.accessors.is_empty() {
            return Err(MetadataError::MissingAccessor(self.title.clone()));
        }
        for restriction in &self.restrictions {
            restriction.check_option(self)?;
        }
        Ok(())
    }

    pub fn scope(&self) -> OptionScope {
        self.scope
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn name_set(&self) -> BTreeSet<&str> {
        self.names.iter().map(String::as_str).collect()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Declared arity; `None` means infer it from the value type.
    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    /// Number of value tokens one occurrence consumes.
    pub fn effective_arity(&self) -> usize {
        self.arity
            .unwrap_or_else(|| self.value_type().default_arity())
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_override(&self) -> bool {
        self.overrides
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn restrictions(&self) -> &[Restriction] {
        &self.restrictions
    }

    pub fn accessors(&self) -> &[Accessor] {
        &self.accessors
    }

    /// Value type of the primary accessor.
    pub fn value_type(&self) -> &ValueType {
        self.accessors
            .first()
            .map(Accessor::value_type)
            .unwrap_or(&ValueType::String)
    }

    /// Whether this option takes no value and may be negated.
    pub fn is_flag(&self) -> bool {
        self.value_type().is_boolean() && self.effective_arity() == 0
    }

    /// Structural equality: everything but restrictions and accessors.
    pub fn same_definition(&self, other: &OptionMetadata) -> bool {
        self.scope == other.scope
            && self.name_set() == other.name_set()
            && self.title == other.title
            && self.description == other.description
            && self.arity == other.arity
            && self.hidden == other.hidden
            && self.overrides == other.overrides
            && self.sealed == other.sealed
    }

    /// Whether both options are the same identity for binding purposes.
    pub fn same_identity(&self, other: &OptionMetadata) -> bool {
        self.same_definition(other) && self.accessors == other.accessors
    }

    /// Union `other`'s accessors into this option.
    pub(crate) fn absorb_accessors(&mut self, other: &OptionMetadata) {
        for accessor in &other.accessors {
            push_unique(&mut self.accessors, accessor);
        }
    }

    pub(crate) fn absorb_restrictions(&mut self, other: &OptionMetadata) {
        for restriction in &other.restrictions {
            if !self.restrictions.contains(restriction) {
                self.restrictions.push(restriction.clone());
            }
        }
    }

    /// Merge a child (derived) definition over its parent.
    ///
    /// The child's settings win; unset description, arity and restrictions
    /// fall back to the parent's. Accessors are unioned, child first.
    pub(crate) fn overridden_by(parent: &OptionMetadata, child: &OptionMetadata) -> OptionMetadata {
        let mut merged = child.clone();
        if merged.description.is_none() {
            merged.description = parent.description.clone();
        }
        if merged.arity.is_none() {
            merged.arity = parent.arity;
        }
        if merged.restrictions.is_empty() {
            merged.restrictions = parent.restrictions.clone();
        }
        merged.absorb_accessors(parent);
        merged
    }
}

impl fmt::Display for OptionMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let accessors: Vec<&str> = self.accessors.iter().map(Accessor::name).collect();
        write!(
            f,
            "{} option '{}' [{}] ({})",
            self.scope,
            self.title,
            self.names.join(", "),
            accessors.join(", ")
        )
    }
}

/// Positional arguments of a command.
#[derive(Debug, Clone)]
pub struct ArgumentsMetadata {
    titles: Vec<String>,
    description: Option<String>,
    arity: Option<usize>,
    restrictions: Vec<Restriction>,
    accessors: Vec<Accessor>,
}

impl ArgumentsMetadata {
    pub fn new<I, S>(titles: I, accessor: Accessor) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            titles: titles.into_iter().map(Into::into).collect(),
            description: None,
            arity: None,
            restrictions: Vec::new(),
            accessors: vec![accessor],
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Fix the number of positional tokens; unset means unbounded.
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    pub fn with_restriction(mut self, restriction: Restriction) -> Self {
        self.restrictions.push(restriction);
        self
    }

    pub fn with_accessor(mut self, accessor: Accessor) -> Self {
        push_unique(&mut self.accessors, &accessor);
        self
    }

    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.accessors.is_empty() {
            return Err(MetadataError::MissingAccessor(self.title()));
        }
        for restriction in &self.restrictions {
            restriction.check_arguments(self)?;
        }
        Ok(())
    }

    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    /// Display title, the declared titles joined by spaces.
    pub fn title(&self) -> String {
        if self.titles.is_empty() {
            "arguments".to_string()
        } else {
            self.titles.join(" ")
        }
    }

    /// Title of the positional token at `index`, falling back to the last title.
    pub fn title_at(&self, index: usize) -> String {
        self.titles
            .get(index)
            .or_else(|| self.titles.last())
            .cloned()
            .unwrap_or_else(|| "arguments".to_string())
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    pub fn restrictions(&self) -> &[Restriction] {
        &self.restrictions
    }

    pub fn accessors(&self) -> &[Accessor] {
        &self.accessors
    }

    pub fn value_type(&self) -> &ValueType {
        self.accessors
            .first()
            .map(Accessor::value_type)
            .unwrap_or(&ValueType::String)
    }
}

/// A single command, with its options split by scope.
#[derive(Debug, Clone)]
pub struct CommandMetadata {
    name: String,
    description: Option<String>,
    hidden: bool,
    command_type: String,
    global_options: Vec<OptionMetadata>,
    group_options: Vec<OptionMetadata>,
    command_options: Vec<OptionMetadata>,
    default_option: Option<OptionMetadata>,
    arguments: Option<ArgumentsMetadata>,
    groups: Vec<String>,
    metadata_injections: Vec<Accessor>,
}

impl CommandMetadata {
    pub fn builder(name: impl Into<String>) -> CommandBuilder {
        CommandBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Opaque handle naming the command's implementing type.
    pub fn command_type(&self) -> &str {
        &self.command_type
    }

    pub fn global_options(&self) -> &[OptionMetadata] {
        &self.global_options
    }

    pub fn group_options(&self) -> &[OptionMetadata] {
        &self.group_options
    }

    pub fn command_options(&self) -> &[OptionMetadata] {
        &self.command_options
    }

    pub fn default_option(&self) -> Option<&OptionMetadata> {
        self.default_option.as_ref()
    }

    pub fn arguments(&self) -> Option<&ArgumentsMetadata> {
        self.arguments.as_ref()
    }

    /// Group paths this command declared membership of.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Accessors that receive the model itself rather than parsed values.
    pub fn metadata_injections(&self) -> &[Accessor] {
        &self.metadata_injections
    }

    /// All options of every scope declared by this command.
    pub fn all_options(&self) -> impl Iterator<Item = &OptionMetadata> {
        self.global_options
            .iter()
            .chain(self.group_options.iter())
            .chain(self.command_options.iter())
    }
}

/// Builder for [`CommandMetadata`].
///
/// Options are added most-derived first; when the same names are declared
/// at several levels of a command hierarchy they are reconciled through
/// [`override_option_set`] on [`CommandBuilder::build`].
#[derive(Debug)]
pub struct CommandBuilder {
    name: String,
    description: Option<String>,
    hidden: bool,
    command_type: Option<String>,
    options: Vec<OptionMetadata>,
    default_option: Option<Vec<String>>,
    arguments: Option<ArgumentsMetadata>,
    groups: Vec<String>,
    metadata_injections: Vec<Accessor>,
}

impl CommandBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            hidden: false,
            command_type: None,
            options: Vec::new(),
            default_option: None,
            arguments: None,
            groups: Vec::new(),
            metadata_injections: Vec::new(),
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

    pub fn command_type(mut self, command_type: impl Into<String>) -> Self {
        self.command_type = Some(command_type.into());
        self
    }

    pub fn option(mut self, option: OptionMetadata) -> Self {
        self.options.push(option);
        self
    }

    /// Add the options one level further up the hierarchy.
    pub fn options<I: IntoIterator<Item = OptionMetadata>>(mut self, options: I) -> Self {
        self.options.extend(options);
        self
    }

    /// Promote the first command option sharing any of `names` to the default option.
    pub fn default_option<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_option = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn arguments(mut self, arguments: ArgumentsMetadata) -> Self {
        self.arguments = Some(arguments);
        self
    }

    /// Declare membership of a group; whitespace separates sub-group paths.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    pub fn metadata_injection(mut self, accessor: Accessor) -> Self {
        self.metadata_injections.push(accessor);
        self
    }

    pub fn build(self) -> Result<CommandMetadata, MetadataError> {
        if !is_valid_token_name(&self.name) {
            return Err(MetadataError::InvalidCommandName(self.name));
        }
        if self.default_option.is_some() && self.arguments.is_some() {
            return Err(MetadataError::DefaultOptionWithArguments(self.name));
        }
        for option in &self.options {
            option.validate()?;
        }
        if let Some(arguments) = &self.arguments {
            arguments.validate()?;
        }

        let (mut global, mut group, mut command) = (Vec::new(), Vec::new(), Vec::new());
        for option in self.options {
            match option.scope() {
                OptionScope::Global => global.push(option),
                OptionScope::Group => group.push(option),
                OptionScope::Command => command.push(option),
            }
        }
        let global_options = override_option_set(global)?;
        let group_options = override_option_set(group)?;
        let command_options = override_option_set(command)?;

        let default_option = match self.default_option {
            None => None,
            Some(names) => {
                // First option in declaration order whose names intersect wins.
                let found = command_options
                    .iter()
                    .find(|o| names.iter().any(|n| o.has_name(n)))
                    .cloned();
                let option = found.ok_or_else(|| MetadataError::UnknownDefaultOption {
                    command: self.name.clone(),
                    names,
                })?;
                if option.effective_arity() != 1 {
                    return Err(MetadataError::InvalidDefaultOption {
                        command: self.name.clone(),
                        title: option.title().to_string(),
                        arity: option.effective_arity(),
                    });
                }
                Some(option)
            }
        };

        let command_type = self.command_type.unwrap_or_else(|| self.name.clone());
        tracing::trace!(command = %self.name, %command_type, "built command metadata");

        Ok(CommandMetadata {
            name: self.name,
            description: self.description,
            hidden: self.hidden,
            command_type,
            global_options,
            group_options,
            command_options,
            default_option,
            arguments: self.arguments,
            groups: self.groups,
            metadata_injections: self.metadata_injections,
        })
    }
}

/// Index of a command in [`GlobalMetadata`]'s command arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub(crate) usize);

/// Index of a group in [`GlobalMetadata`]'s group arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub(crate) usize);

/// A named group of commands, possibly nested under a parent group.
#[derive(Debug, Clone)]
pub struct CommandGroupMetadata {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) hidden: bool,
    pub(crate) options: Vec<OptionMetadata>,
    pub(crate) default_command: Option<CommandId>,
    pub(crate) commands: Vec<CommandId>,
    pub(crate) sub_groups: Vec<GroupId>,
    pub(crate) parent: Option<GroupId>,
}

impl CommandGroupMetadata {
    pub(crate) fn new(name: impl Into<String>, parent: Option<GroupId>) -> Self {
        Self {
            name: name.into(),
            description: None,
            hidden: false,
            options: Vec::new(),
            default_command: None,
            commands: Vec::new(),
            sub_groups: Vec::new(),
            parent,
        }
    }

    /// Add a member command; adding it twice is a no-op.
    pub(crate) fn add_command(&mut self, command: CommandId) {
        if !self.commands.contains(&command) {
            self.commands.push(command);
        }
    }

    /// Add a sub-group; adding it twice is a no-op.
    pub(crate) fn add_sub_group(&mut self, group: GroupId) {
        if !self.sub_groups.contains(&group) {
            self.sub_groups.push(group);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Group-scoped options merged from the default command and all members.
    pub fn options(&self) -> &[OptionMetadata] {
        &self.options
    }

    pub fn default_command(&self) -> Option<CommandId> {
        self.default_command
    }

    pub fn commands(&self) -> &[CommandId] {
        &self.commands
    }

    pub fn sub_groups(&self) -> &[GroupId] {
        &self.sub_groups
    }

    /// Back-reference to the enclosing group, for lookup only.
    pub fn parent(&self) -> Option<GroupId> {
        self.parent
    }
}

/// How parse-time errors propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorHandling {
    /// Raise the first error and stop
    #[default]
    FailFast,
    /// Keep scanning and raise every error found at the end
    CollectAll,
}

/// A program-declared alias.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AliasMetadata {
    name: String,
    arguments: Vec<String>,
}

impl AliasMetadata {
    pub fn new<I, S>(name: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.name.trim().is_empty() || self.arguments.is_empty() {
            return Err(MetadataError::InvalidAlias(self.name.clone()));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Literal replacement tokens.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }
}

/// Parser configuration.
#[derive(Debug, Clone)]
pub struct ParserMetadata {
    allow_abbreviated_commands: bool,
    allow_abbreviated_options: bool,
    aliases_override_built_ins: bool,
    aliases_may_chain: bool,
    arguments_separator: String,
    flag_negation_prefix: Option<String>,
    option_parsers: Vec<Arc<dyn OptionParser>>,
    type_converter: Arc<dyn TypeConverter>,
    error_handling: ErrorHandling,
    aliases: Vec<AliasMetadata>,
    user_aliases: Option<Arc<dyn UserAliasSource>>,
}

/// The standard, long getopt and classic getopt strategies, in that order.
pub fn default_option_parsers() -> Vec<Arc<dyn OptionParser>> {
    vec![
        Arc::new(StandardOptionParser),
        Arc::new(LongGetOptParser),
        Arc::new(ClassicGetOptParser),
    ]
}

impl Default for ParserMetadata {
    fn default() -> Self {
        Self {
            allow_abbreviated_commands: false,
            allow_abbreviated_options: false,
            aliases_override_built_ins: false,
            aliases_may_chain: false,
            arguments_separator: "--".to_string(),
            flag_negation_prefix: None,
            option_parsers: default_option_parsers(),
            type_converter: Arc::new(DefaultTypeConverter),
            error_handling: ErrorHandling::FailFast,
            aliases: Vec::new(),
            user_aliases: None,
        }
    }
}

impl ParserMetadata {
    /// Accept unambiguous command name prefixes. Group names always match exactly.
    pub fn with_abbreviated_commands(mut self, allow: bool) -> Self {
        self.allow_abbreviated_commands = allow;
        self
    }

    pub fn with_abbreviated_options(mut self, allow: bool) -> Self {
        self.allow_abbreviated_options = allow;
        self
    }

    pub fn with_aliases_override_built_ins(mut self, allow: bool) -> Self {
        self.aliases_override_built_ins = allow;
        self
    }

    pub fn with_aliases_may_chain(mut self, allow: bool) -> Self {
        self.aliases_may_chain = allow;
        self
    }

    pub fn with_arguments_separator(mut self, separator: impl Into<String>) -> Self {
        self.arguments_separator = separator.into();
        self
    }

    pub fn with_flag_negation_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.flag_negation_prefix = Some(prefix.into());
        self
    }

    /// Replace the option parsing strategies; they are tried in order.
    pub fn with_option_parsers(mut self, parsers: Vec<Arc<dyn OptionParser>>) -> Self {
        self.option_parsers = parsers;
        self
    }

    pub fn with_type_converter(mut self, converter: Arc<dyn TypeConverter>) -> Self {
        self.type_converter = converter;
        self
    }

    pub fn with_error_handling(mut self, error_handling: ErrorHandling) -> Self {
        self.error_handling = error_handling;
        self
    }

    pub fn with_alias(mut self, alias: AliasMetadata) -> Self {
        self.aliases.push(alias);
        self
    }

    pub fn with_user_aliases(mut self, source: Arc<dyn UserAliasSource>) -> Self {
        self.user_aliases = Some(source);
        self
    }

    pub fn validate(&self) -> Result<(), MetadataError> {
        if !is_valid_token_name(&self.arguments_separator) {
            return Err(MetadataError::InvalidParserConfig(format!(
                "arguments separator '{}' must be non-blank and contain no whitespace",
                self.arguments_separator
            )));
        }
        if let Some(prefix) = &self.flag_negation_prefix {
            if !is_valid_token_name(prefix) {
                return Err(MetadataError::InvalidParserConfig(format!(
                    "flag negation prefix '{}' must be non-blank and contain no whitespace",
                    prefix
                )));
            }
        }
        if self.option_parsers.is_empty() {
            return Err(MetadataError::InvalidParserConfig(
                "at least one option parser is required".to_string(),
            ));
        }
        for alias in &self.aliases {
            alias.validate()?;
        }
        Ok(())
    }

    pub fn allow_abbreviated_commands(&self) -> bool {
        self.allow_abbreviated_commands
    }

    pub fn allow_abbreviated_options(&self) -> bool {
        self.allow_abbreviated_options
    }

    pub fn aliases_override_built_ins(&self) -> bool {
        self.aliases_override_built_ins
    }

    pub fn aliases_may_chain(&self) -> bool {
        self.aliases_may_chain
    }

    pub fn arguments_separator(&self) -> &str {
        &self.arguments_separator
    }

    pub fn flag_negation_prefix(&self) -> Option<&str> {
        self.flag_negation_prefix.as_deref()
    }

    pub fn option_parsers(&self) -> &[Arc<dyn OptionParser>] {
        &self.option_parsers
    }

    pub fn type_converter(&self) -> &dyn TypeConverter {
        self.type_converter.as_ref()
    }

    pub fn error_handling(&self) -> ErrorHandling {
        self.error_handling
    }

    /// Built-in aliases.
    pub fn aliases(&self) -> &[AliasMetadata] {
        &self.aliases
    }

    pub fn user_aliases(&self) -> Option<&dyn UserAliasSource> {
        self.user_aliases.as_deref()
    }
}

/// The complete, immutable model of a program's command line.
///
/// Commands and groups live in arenas indexed by [`CommandId`] and
/// [`GroupId`]; groups refer to their parent by id.
#[derive(Debug, Clone)]
pub struct GlobalMetadata {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) options: Vec<OptionMetadata>,
    pub(crate) default_command: Option<CommandId>,
    pub(crate) default_group_commands: Vec<CommandId>,
    pub(crate) command_groups: Vec<GroupId>,
    pub(crate) commands: Vec<CommandMetadata>,
    pub(crate) groups: Vec<CommandGroupMetadata>,
    pub(crate) restrictions: Vec<GlobalRestriction>,
    pub(crate) parser: ParserMetadata,
}

impl GlobalMetadata {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Global options merged across every command.
    pub fn options(&self) -> &[OptionMetadata] {
        &self.options
    }

    pub fn default_command(&self) -> Option<CommandId> {
        self.default_command
    }

    /// Commands that belong to no explicit group.
    pub fn default_group_commands(&self) -> &[CommandId] {
        &self.default_group_commands
    }

    /// Top-level groups.
    pub fn command_groups(&self) -> &[GroupId] {
        &self.command_groups
    }

    pub fn restrictions(&self) -> &[GlobalRestriction] {
        &self.restrictions
    }

    pub fn parser(&self) -> &ParserMetadata {
        &self.parser
    }

    pub fn command(&self, id: CommandId) -> &CommandMetadata {
        &self.commands[id.0]
    }

    pub fn group(&self, id: GroupId) -> &CommandGroupMetadata {
        &self.groups[id.0]
    }

    pub fn commands(&self) -> impl Iterator<Item = (CommandId, &CommandMetadata)> {
        self.commands
            .iter()
            .enumerate()
            .map(|(i, c)| (CommandId(i), c))
    }

    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &CommandGroupMetadata)> {
        self.groups.iter().enumerate().map(|(i, g)| (GroupId(i), g))
    }

    pub fn find_command(&self, name: &str) -> Option<CommandId> {
        self.commands().find(|(_, c)| c.name() == name).map(|(id, _)| id)
    }

    /// Resolve a whitespace separated group path such as `"remote show"`.
    pub fn find_group(&self, path: &str) -> Option<GroupId> {
        let mut current: Option<GroupId> = None;
        for segment in path.split_whitespace() {
            let candidates = match current {
                None => &self.command_groups,
                Some(id) => &self.group(id).sub_groups,
            };
            current = Some(
                *candidates
                    .iter()
                    .find(|id| self.group(**id).name == segment)?,
            );
        }
        current
    }

    /// Names from the top-level group down to `group`.
    pub fn group_path(&self, group: GroupId) -> Vec<&str> {
        let mut path = Vec::new();
        let mut current = Some(group);
        while let Some(id) = current {
            let g = self.group(id);
            path.push(g.name.as_str());
            current = g.parent;
        }
        path.reverse();
        path
    }

    /// Whether `name` is a top-level command or group, i.e. something an alias could shadow.
    pub fn is_built_in(&self, name: &str) -> bool {
        self.default_group_commands
            .iter()
            .any(|id| self.command(*id).name() == name)
            || self
                .command_groups
                .iter()
                .any(|id| self.group(*id).name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verbose() -> OptionMetadata {
        OptionMetadata::new(
            OptionScope::Command,
            ["-v", "--verbose"],
            Accessor::new("Base.verbose", ValueType::Boolean),
        )
    }

    #[test]
    fn test_option_title_defaults_to_accessor() {
        assert_eq!(verbose().title(), "verbose");
    }

    #[test]
    fn test_option_effective_arity() {
        assert_eq!(verbose().effective_arity(), 0);
        assert!(verbose().is_flag());

        let level = OptionMetadata::new(
            OptionScope::Command,
            ["--level"],
            Accessor::new("Base.level", ValueType::Integer),
        );
        assert_eq!(level.effective_arity(), 1);
        assert_eq!(level.with_arity(2).effective_arity(), 2);
    }

    #[test]
    fn test_option_rejects_whitespace_name() {
        let option = OptionMetadata::new(
            OptionScope::Command,
            ["--bad name"],
            Accessor::new("Cmd.bad", ValueType::String),
        );
        assert!(matches!(
            option.validate(),
            Err(MetadataError::InvalidOptionName { .. })
        ));
    }

    #[test]
    fn test_option_rejects_duplicate_name() {
        let option = OptionMetadata::new(
            OptionScope::Command,
            ["-v", "-v"],
            Accessor::new("Cmd.v", ValueType::Boolean),
        );
        assert!(matches!(
            option.validate(),
            Err(MetadataError::DuplicateOptionName { .. })
        ));
    }

    #[test]
    fn test_same_definition_ignores_name_order() {
        let a = verbose();
        let b = OptionMetadata::new(
            OptionScope::Command,
            ["--verbose", "-v"],
            Accessor::new("Other.verbose", ValueType::Boolean),
        );
        assert!(a.same_definition(&b));
        assert!(!a.same_identity(&b));
    }

    #[test]
    fn test_command_name_validation() {
        let result = CommandMetadata::builder("bad name").build();
        assert!(matches!(result, Err(MetadataError::InvalidCommandName(_))));
        let result = CommandMetadata::builder("  ").build();
        assert!(matches!(result, Err(MetadataError::InvalidCommandName(_))));
    }

    #[test]
    fn test_command_splits_scopes() {
        let cmd = CommandMetadata::builder("add")
            .option(OptionMetadata::new(
                OptionScope::Global,
                ["--debug"],
                Accessor::new("Add.debug", ValueType::Boolean),
            ))
            .option(verbose())
            .build()
            .unwrap();
        assert_eq!(cmd.global_options().len(), 1);
        assert_eq!(cmd.command_options().len(), 1);
        assert!(cmd.group_options().is_empty());
        assert_eq!(cmd.command_type(), "add");
    }

    #[test]
    fn test_default_option_with_arguments_rejected() {
        let result = CommandMetadata::builder("cat")
            .option(OptionMetadata::new(
                OptionScope::Command,
                ["--file"],
                Accessor::new("Cat.file", ValueType::Path),
            ))
            .default_option(["--file"])
            .arguments(ArgumentsMetadata::new(
                ["files"],
                Accessor::new("Cat.files", ValueType::Path),
            ))
            .build();
        assert!(matches!(
            result,
            Err(MetadataError::DefaultOptionWithArguments(_))
        ));
    }

    #[test]
    fn test_default_option_first_match_wins() {
        let cmd = CommandMetadata::builder("cat")
            .option(OptionMetadata::new(
                OptionScope::Command,
                ["-f", "--file"],
                Accessor::new("Cat.file", ValueType::Path),
            ))
            .option(OptionMetadata::new(
                OptionScope::Command,
                ["--input"],
                Accessor::new("Cat.input", ValueType::Path),
            ))
            .default_option(["--input", "--file"])
            .build()
            .unwrap();
        assert_eq!(cmd.default_option().unwrap().title(), "file");
    }

    #[test]
    fn test_default_option_requires_arity_one() {
        let result = CommandMetadata::builder("run")
            .option(verbose())
            .default_option(["-v"])
            .build();
        assert!(matches!(
            result,
            Err(MetadataError::InvalidDefaultOption { arity: 0, .. })
        ));
    }

    #[test]
    fn test_unknown_default_option() {
        let result = CommandMetadata::builder("run")
            .option(verbose())
            .default_option(["--missing"])
            .build();
        assert!(matches!(
            result,
            Err(MetadataError::UnknownDefaultOption { .. })
        ));
    }

    #[test]
    fn test_parser_metadata_defaults() {
        let parser = ParserMetadata::default();
        assert_eq!(parser.arguments_separator(), "--");
        assert!(parser.flag_negation_prefix().is_none());
        assert_eq!(parser.option_parsers().len(), 3);
        assert_eq!(parser.error_handling(), ErrorHandling::FailFast);
        parser.validate().unwrap();
    }

    #[test]
    fn test_parser_metadata_rejects_whitespace_separator() {
        let parser = ParserMetadata::default().with_arguments_separator("- -");
        assert!(matches!(
            parser.validate(),
            Err(MetadataError::InvalidParserConfig(_))
        ));
    }

    #[test]
    fn test_alias_validation() {
        assert!(AliasMetadata::new("co", ["checkout"]).validate().is_ok());
        assert!(AliasMetadata::new("", ["checkout"]).validate().is_err());
        assert!(AliasMetadata::new("co", Vec::<String>::new()).validate().is_err());
    }
}
