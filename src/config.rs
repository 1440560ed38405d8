//! JSON schema describing a program's command line.
//!
//! A [`Config`] is a declarative stand-in for discovering commands and
//! options from annotated types: it names the program, its parser settings,
//! groups, commands, options, arguments, restrictions and aliases, and
//! [`Config::build`] feeds them through the metadata builders.

use crate::alias::AliasFile;
use crate::groups::{GlobalMetadataBuilder, GroupDeclaration};
use crate::metadata::{
    Accessor, AliasMetadata, ArgumentsMetadata, CommandMetadata, ErrorHandling, GlobalMetadata,
    MetadataError, OptionMetadata, OptionScope, ParserMetadata,
};
use crate::restrictions::{GlobalRestriction, PathKind, PortRange, Restriction};
use crate::strategies::{
    ClassicGetOptParser, ListValueOptionParser, LongGetOptParser, OptionParser, StandardOptionParser,
};
use crate::types::ValueType;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// The minimum supported schema version.
pub const MIN_SCHEMA_VERSION: u32 = 1;
/// The maximum supported schema version.
pub const MAX_SCHEMA_VERSION: u32 = 1;

/// Default prefix for shell variable output.
pub const DEFAULT_PREFIX: &str = "CLIFRAME_";

/// Errors that can occur while reading a schema.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse JSON config: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("unsupported schema version {0} (supported: 1)")]
    UnsupportedSchemaVersion(u32),

    #[error("config for '{0}' declares no commands")]
    NoCommands(String),

    #[error("'option_parsers' must list at least one strategy")]
    NoOptionParsers,

    #[error("invalid pattern on '{title}': {source}")]
    InvalidPattern {
        title: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// Option syntax strategies selectable from the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptionParserKind {
    Standard,
    LongGetopt,
    ClassicGetopt,
    ListValue,
}

impl OptionParserKind {
    fn strategy(self) -> Arc<dyn OptionParser> {
        match self {
            OptionParserKind::Standard => Arc::new(StandardOptionParser),
            OptionParserKind::LongGetopt => Arc::new(LongGetOptParser),
            OptionParserKind::ClassicGetopt => Arc::new(ClassicGetOptParser),
            OptionParserKind::ListValue => Arc::new(ListValueOptionParser),
        }
    }
}

/// Parser settings; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub allow_abbreviated_commands: bool,
    pub allow_abbreviated_options: bool,
    pub aliases_override_built_ins: bool,
    pub aliases_may_chain: bool,
    /// Token that ends option parsing (default: `--`)
    pub arguments_separator: Option<String>,
    /// Prefix that negates a boolean flag, e.g. `--no-`
    pub flag_negation_prefix: Option<String>,
    /// Strategies in the order they are tried
    pub option_parsers: Option<Vec<OptionParserKind>>,
    pub error_handling: ErrorHandling,
    /// Built-in aliases
    pub aliases: Vec<AliasMetadata>,
    /// Properties-style user alias file
    pub alias_file: Option<PathBuf>,
}

impl ParserConfig {
    pub fn to_parser_metadata(&self) -> Result<ParserMetadata, ConfigError> {
        let mut parser = ParserMetadata::default()
            .with_abbreviated_commands(self.allow_abbreviated_commands)
            .with_abbreviated_options(self.allow_abbreviated_options)
            .with_aliases_override_built_ins(self.aliases_override_built_ins)
            .with_aliases_may_chain(self.aliases_may_chain)
            .with_error_handling(self.error_handling);
        if let Some(separator) = &self.arguments_separator {
            parser = parser.with_arguments_separator(separator.clone());
        }
        if let Some(prefix) = &self.flag_negation_prefix {
            parser = parser.with_flag_negation_prefix(prefix.clone());
        }
        if let Some(kinds) = &self.option_parsers {
            if kinds.is_empty() {
                return Err(ConfigError::NoOptionParsers);
            }
            parser = parser.with_option_parsers(kinds.iter().map(|k| k.strategy()).collect());
        }
        for alias in &self.aliases {
            parser = parser.with_alias(alias.clone());
        }
        if let Some(path) = &self.alias_file {
            parser = parser.with_user_aliases(Arc::new(AliasFile::new(path.clone())));
        }
        Ok(parser)
    }
}

/// A port range given as a preset name, a single port or `"min-max"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSpec(pub PortRange);

impl PortSpec {
    fn parse(value: &str) -> Option<PortRange> {
        match value {
            "os-allocated" => Some(PortRange::OS_ALLOCATED),
            "system" => Some(PortRange::SYSTEM),
            "user" => Some(PortRange::USER),
            "dynamic" => Some(PortRange::DYNAMIC),
            "any" => Some(PortRange::ANY),
            _ => match value.split_once('-') {
                Some((min, max)) => {
                    let (min, max): (u16, u16) = (min.trim().parse().ok()?, max.trim().parse().ok()?);
                    (min <= max).then_some(PortRange { min, max })
                }
                None => value.trim().parse().ok().map(|port| PortRange { min: port, max: port }),
            },
        }
    }
}

impl<'de> Deserialize<'de> for PortSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct PortSpecVisitor;

        impl<'de> Visitor<'de> for PortSpecVisitor {
            type Value = PortSpec;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a port number, a \"min-max\" range or a preset name")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u16::try_from(value)
                    .map(|port| PortSpec(PortRange { min: port, max: port }))
                    .map_err(|_| de::Error::custom(format!("port {} is out of range", value)))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                PortSpec::parse(value)
                    .map(PortSpec)
                    .ok_or_else(|| de::Error::custom(format!("invalid port range '{}'", value)))
            }
        }

        deserializer.deserialize_any(PortSpecVisitor)
    }
}

fn default_true() -> bool {
    true
}

/// A restriction, tagged by `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RestrictionConfig {
    Required,
    NotBlank,
    NotEmpty,
    Length {
        min: Option<usize>,
        max: Option<usize>,
    },
    Pattern {
        pattern: String,
        description: Option<String>,
    },
    AllowedRawValues {
        values: Vec<String>,
        #[serde(default)]
        ignore_case: bool,
    },
    AllowedValues {
        values: Vec<String>,
    },
    Range {
        min: Option<f64>,
        max: Option<f64>,
        #[serde(default = "default_true")]
        min_inclusive: bool,
        #[serde(default = "default_true")]
        max_inclusive: bool,
    },
    Port {
        #[serde(default)]
        ranges: Vec<PortSpec>,
    },
    Path {
        #[serde(default)]
        target: PathKind,
        #[serde(default)]
        must_exist: bool,
        #[serde(default)]
        readable: bool,
        #[serde(default)]
        writable: bool,
        #[serde(default)]
        executable: bool,
    },
    MutuallyExclusive {
        tag: String,
    },
    RequireOnlyOne {
        tag: String,
    },
    RequireSome {
        tag: String,
    },
    Partial {
        indices: Vec<usize>,
        restriction: Box<RestrictionConfig>,
    },
}

impl RestrictionConfig {
    /// Build the restriction for the option or arguments titled `title`.
    pub fn to_restriction(&self, title: &str) -> Result<Restriction, ConfigError> {
        Ok(match self {
            RestrictionConfig::Required => Restriction::Required,
            RestrictionConfig::NotBlank => Restriction::NotBlank,
            RestrictionConfig::NotEmpty => Restriction::NotEmpty,
            RestrictionConfig::Length { min, max } => Restriction::Length {
                min: *min,
                max: *max,
            },
            RestrictionConfig::Pattern {
                pattern,
                description,
            } => Restriction::Pattern {
                regex: regex::Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                    title: title.to_string(),
                    source,
                })?,
                description: description.clone(),
            },
            RestrictionConfig::AllowedRawValues {
                values,
                ignore_case,
            } => Restriction::AllowedRawValues {
                values: values.clone(),
                ignore_case: *ignore_case,
            },
            RestrictionConfig::AllowedValues { values } => Restriction::AllowedValues {
                values: values.clone(),
            },
            RestrictionConfig::Range {
                min,
                max,
                min_inclusive,
                max_inclusive,
            } => Restriction::Range {
                min: *min,
                max: *max,
                min_inclusive: *min_inclusive,
                max_inclusive: *max_inclusive,
            },
            RestrictionConfig::Port { ranges } => Restriction::Port {
                ranges: if ranges.is_empty() {
                    vec![PortRange::ANY]
                } else {
                    ranges.iter().map(|r| r.0).collect()
                },
            },
            RestrictionConfig::Path {
                target,
                must_exist,
                readable,
                writable,
                executable,
            } => Restriction::Path {
                kind: *target,
                must_exist: *must_exist,
                readable: *readable,
                writable: *writable,
                executable: *executable,
            },
            RestrictionConfig::MutuallyExclusive { tag } => Restriction::mutually_exclusive(tag.clone()),
            RestrictionConfig::RequireOnlyOne { tag } => Restriction::require_only_one(tag.clone()),
            RestrictionConfig::RequireSome { tag } => Restriction::require_some(tag.clone()),
            RestrictionConfig::Partial {
                indices,
                restriction,
            } => Restriction::Partial {
                indices: indices.clone(),
                restriction: Box::new(restriction.to_restriction(title)?),
            },
        })
    }
}

/// Configuration for a single option.
#[derive(Debug, Clone, Deserialize)]
pub struct OptionConfig {
    /// Names as typed on the command line, e.g. `["-v", "--verbose"]`
    pub names: Vec<String>,
    #[serde(default)]
    pub scope: OptionScope,
    /// Binding name (default: `<command>.<first name without dashes>`)
    pub accessor: Option<String>,
    #[serde(rename = "type", default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub multi_valued: bool,
    pub title: Option<String>,
    pub description: Option<String>,
    pub arity: Option<usize>,
    #[serde(default)]
    pub hidden: bool,
    /// Redefines an option declared further up the hierarchy
    #[serde(default, rename = "override")]
    pub overrides: bool,
    #[serde(default)]
    pub sealed: bool,
    #[serde(default)]
    pub restrictions: Vec<RestrictionConfig>,
}

impl OptionConfig {
    pub fn to_option(&self, command: &str) -> Result<OptionMetadata, ConfigError> {
        let accessor_name = self.accessor.clone().unwrap_or_else(|| {
            let first = self.names.first().map(String::as_str).unwrap_or("option");
            format!("{}.{}", command, first.trim_start_matches('-'))
        });
        let mut accessor = Accessor::new(accessor_name, self.value_type.clone());
        if self.multi_valued {
            accessor = accessor.multi_valued();
        }

        let mut option = OptionMetadata::new(self.scope, self.names.iter().cloned(), accessor);
        if let Some(title) = &self.title {
            option = option.with_title(title.clone());
        }
        if let Some(description) = &self.description {
            option = option.with_description(description.clone());
        }
        if let Some(arity) = self.arity {
            option = option.with_arity(arity);
        }
        if self.hidden {
            option = option.hidden();
        }
        if self.overrides {
            option = option.overriding();
        }
        if self.sealed {
            option = option.sealed();
        }
        for restriction in &self.restrictions {
            let restriction = restriction.to_restriction(option.title())?;
            option = option.with_restriction(restriction);
        }
        Ok(option)
    }
}

/// Configuration for a command's positional arguments.
#[derive(Debug, Clone, Deserialize)]
pub struct ArgumentsConfig {
    #[serde(default)]
    pub titles: Vec<String>,
    pub accessor: Option<String>,
    #[serde(rename = "type", default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub multi_valued: bool,
    pub description: Option<String>,
    /// Fixed number of positionals; omit for any number
    pub arity: Option<usize>,
    #[serde(default)]
    pub restrictions: Vec<RestrictionConfig>,
}

impl ArgumentsConfig {
    pub fn to_arguments(&self, command: &str) -> Result<ArgumentsMetadata, ConfigError> {
        let accessor_name = self
            .accessor
            .clone()
            .unwrap_or_else(|| format!("{}.arguments", command));
        let mut accessor = Accessor::new(accessor_name, self.value_type.clone());
        if self.multi_valued {
            accessor = accessor.multi_valued();
        }
        let mut arguments = ArgumentsMetadata::new(self.titles.iter().cloned(), accessor);
        if let Some(description) = &self.description {
            arguments = arguments.with_description(description.clone());
        }
        if let Some(arity) = self.arity {
            arguments = arguments.with_arity(arity);
        }
        for restriction in &self.restrictions {
            let restriction = restriction.to_restriction(&arguments.title())?;
            arguments = arguments.with_restriction(restriction);
        }
        Ok(arguments)
    }
}

/// Configuration for a command.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    /// Name of the implementing type handed to the command factory
    #[serde(rename = "type")]
    pub command_type: Option<String>,
    /// Group paths this command belongs to
    #[serde(default)]
    pub groups: Vec<String>,
    /// Options, most derived declaration first
    #[serde(default)]
    pub options: Vec<OptionConfig>,
    /// Names of the option that takes otherwise unrecognized tokens
    pub default_option: Option<Vec<String>>,
    pub arguments: Option<ArgumentsConfig>,
}

impl CommandConfig {
    pub fn to_command(&self) -> Result<CommandMetadata, ConfigError> {
        let mut builder = CommandMetadata::builder(self.name.clone());
        if let Some(description) = &self.description {
            builder = builder.description(description.clone());
        }
        if self.hidden {
            builder = builder.hidden();
        }
        if let Some(command_type) = &self.command_type {
            builder = builder.command_type(command_type.clone());
        }
        for group in &self.groups {
            builder = builder.group(group.clone());
        }
        for option in &self.options {
            builder = builder.option(option.to_option(&self.name)?);
        }
        if let Some(names) = &self.default_option {
            builder = builder.default_option(names.iter().cloned());
        }
        if let Some(arguments) = &self.arguments {
            builder = builder.arguments(arguments.to_arguments(&self.name)?);
        }
        Ok(builder.build()?)
    }
}

/// Configuration for an explicitly declared group.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    /// Group name; whitespace separates sub-group paths
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    pub default_command: Option<String>,
    #[serde(default)]
    pub commands: Vec<String>,
}

impl GroupConfig {
    pub fn to_declaration(&self) -> GroupDeclaration {
        let mut group = GroupDeclaration::new(self.name.clone());
        if let Some(description) = &self.description {
            group = group.description(description.clone());
        }
        if self.hidden {
            group = group.hidden();
        }
        if let Some(command) = &self.default_command {
            group = group.default_command(command.clone());
        }
        for command in &self.commands {
            group = group.command(command.clone());
        }
        group
    }
}

fn default_schema_version() -> u32 {
    1
}

/// Top-level configuration for a program.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Schema version for the config format (default: 1)
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Program name
    pub name: String,
    pub description: Option<String>,
    /// Shell variable prefix for env output (default: "CLIFRAME_")
    pub prefix: Option<String>,
    #[serde(default)]
    pub parser: ParserConfig,
    /// Command run when none is named at the top level
    pub default_command: Option<String>,
    /// Global restrictions; omit for the defaults, `[]` for none
    pub restrictions: Option<Vec<GlobalRestriction>>,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
}

impl Config {
    /// Parse a JSON string into a Config.
    pub fn from_json(json: &str) -> Result<Config, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Validate what the metadata builders cannot see.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema_version < MIN_SCHEMA_VERSION || self.schema_version > MAX_SCHEMA_VERSION {
            return Err(ConfigError::UnsupportedSchemaVersion(self.schema_version));
        }
        if self.commands.is_empty() {
            return Err(ConfigError::NoCommands(self.name.clone()));
        }
        Ok(())
    }

    /// Get the effective shell variable prefix.
    pub fn effective_prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or(DEFAULT_PREFIX)
    }

    /// Validate and assemble the immutable metadata model.
    pub fn build(&self) -> Result<GlobalMetadata, ConfigError> {
        self.validate()?;

        let mut builder =
            GlobalMetadataBuilder::new(self.name.clone()).parser(self.parser.to_parser_metadata()?);
        if let Some(description) = &self.description {
            builder = builder.description(description.clone());
        }
        for command in &self.commands {
            builder = builder.command(command.to_command()?);
        }
        for group in &self.groups {
            builder = builder.group(group.to_declaration());
        }
        if let Some(command) = &self.default_command {
            builder = builder.default_command(command.clone());
        }
        if let Some(restrictions) = &self.restrictions {
            builder = builder.restrictions(restrictions.clone());
        }
        Ok(builder.build()?)
    }
}
