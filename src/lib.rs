//! cliframe - metadata model and parsing core for declarative command lines.
//!
//! This library builds an immutable model of a program's groups, commands,
//! options and arguments (from the builder API or a JSON schema), then
//! parses token vectors against it: alias expansion, group and command
//! resolution, pluggable option syntaxes, staged restriction checks and
//! binding of typed values to accessors.

pub mod alias;
pub mod config;
pub mod groups;
pub mod merge;
pub mod metadata;
pub mod output;
pub mod parser;
pub mod restrictions;
pub mod state;
pub mod strategies;
pub mod types;

pub use alias::{AliasError, AliasFile, AliasResolver, UserAliasSource};
pub use config::{Config, ConfigError};
pub use groups::{GlobalMetadataBuilder, GroupDeclaration};
pub use merge::{merge_option_set, override_option_set};
pub use metadata::{
    Accessor, AliasMetadata, ArgumentsMetadata, CommandGroupMetadata, CommandId, CommandMetadata,
    ErrorHandling, GlobalMetadata, GroupId, MetadataError, OptionMetadata, OptionScope,
    ParserMetadata,
};
pub use output::{
    generate_error_output, generate_output, render_env, render_error_json, render_json,
    render_metadata_json,
};
pub use parser::{Binding, CommandFactory, ParseError, ParseResult, Parser};
pub use restrictions::{GlobalRestriction, Restriction};
pub use strategies::OptionParser;
pub use types::{DefaultTypeConverter, TypeConverter, Value, ValueType};
