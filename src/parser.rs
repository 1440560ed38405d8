//! The parsing engine.
//!
//! A parse runs alias expansion, then walks the tokens through four states:
//!
//! 1. global options
//! 2. the group path, with group options interleaved
//! 3. the command name (or the default command of the current scope)
//! 4. the command body: options, default-option values and positionals
//!
//! Values are then converted and validated, and the final and global
//! restrictions run over the complete state.

use crate::alias::AliasResolver;
use crate::metadata::{
    Accessor, CommandId, CommandMetadata, GlobalMetadata, GroupId, OptionMetadata, OptionScope,
};
use crate::restrictions::Target;
use crate::state::{ParseState, ParsedOption};
use crate::strategies::{negated_name, Tokens};
use crate::types::Value;
use thiserror::Error;

/// Errors raised while parsing one invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("no command specified{}", in_group(.group))]
    CommandMissing { group: Option<String> },

    #[error("command '{name}' not recognized{}", in_group(.group))]
    CommandUnrecognized { name: String, group: Option<String> },

    #[error("group '{0}' not recognized")]
    GroupUnrecognized(String),

    #[error("required option '{title}' is missing")]
    OptionMissing { title: String, names: Vec<String> },

    #[error("option '{title}' requires {expected} value(s) but only {found} were given")]
    OptionMissingValue {
        title: String,
        expected: usize,
        found: usize,
    },

    #[error("required arguments '{title}' are missing")]
    ArgumentsMissing { title: String },

    #[error("too many arguments for '{title}': expected {expected}, found {found}")]
    TooManyArguments {
        title: String,
        expected: usize,
        found: usize,
    },

    #[error("too few arguments for '{title}': expected {expected}, found {found}")]
    TooFewArguments {
        title: String,
        expected: usize,
        found: usize,
    },

    #[error("'{value}' is not a valid value for '{title}': {reason}")]
    IllegalValue {
        title: String,
        value: String,
        reason: String,
    },

    #[error("value '{value}' for '{title}' is not allowed: {reason}")]
    RestrictionViolated {
        title: String,
        value: String,
        reason: String,
    },

    #[error("options {} violate group '{tag}': {reason}", .options.join(", "))]
    OptionGroupViolated {
        tag: String,
        options: Vec<String>,
        reason: String,
    },

    #[error("alias '{alias}' expands cyclically: {}", .chain.join(" -> "))]
    CyclicAlias { alias: String, chain: Vec<String> },

    #[error("restriction on '{title}' cannot be applied: {reason}")]
    InvalidRestriction { title: String, reason: String },

    #[error("unexpected arguments: {}", .0.join(" "))]
    UnexpectedTokens(Vec<String>),

    #[error("failed to load user aliases: {0}")]
    AliasSource(String),

    #[error("{} errors: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<ParseError>),
}

fn in_group(group: &Option<String>) -> String {
    match group {
        Some(group) => format!(" in group '{}'", group),
        None => String::new(),
    }
}

fn join_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ParseError {
    /// Titles of the options this error is about, for usage hints.
    pub fn option_titles(&self) -> Vec<&str> {
        match self {
            ParseError::OptionMissing { title, .. }
            | ParseError::OptionMissingValue { title, .. }
            | ParseError::IllegalValue { title, .. }
            | ParseError::RestrictionViolated { title, .. }
            | ParseError::InvalidRestriction { title, .. } => vec![title.as_str()],
            ParseError::OptionGroupViolated { options, .. } => options.iter().map(String::as_str).collect(),
            ParseError::Multiple(errors) => errors.iter().flat_map(ParseError::option_titles).collect(),
            _ => Vec::new(),
        }
    }

    /// The individual errors, flattening [`ParseError::Multiple`].
    pub fn errors(&self) -> Vec<&ParseError> {
        match self {
            ParseError::Multiple(errors) => errors.iter().flat_map(ParseError::errors).collect(),
            other => vec![other],
        }
    }
}

/// Converted values of every occurrence of one option.
#[derive(Debug, Clone)]
pub struct OptionValues<'m> {
    option: &'m OptionMetadata,
    values: Vec<Value>,
}

impl<'m> OptionValues<'m> {
    pub fn option(&self) -> &'m OptionMetadata {
        self.option
    }

    /// One value per occurrence, in command line order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// The value of the last occurrence.
    pub fn last(&self) -> Option<&Value> {
        self.values.last()
    }
}

/// A value to store through an accessor.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding<'m> {
    pub accessor: &'m Accessor,
    pub value: Value,
}

/// The resolved invocation.
#[derive(Debug, Clone)]
pub struct ParseResult<'m> {
    metadata: &'m GlobalMetadata,
    group: Option<GroupId>,
    command: CommandId,
    options: Vec<OptionValues<'m>>,
    arguments: Vec<Value>,
    unparsed: Vec<String>,
}

impl<'m> ParseResult<'m> {
    pub fn metadata(&self) -> &'m GlobalMetadata {
        self.metadata
    }

    pub fn command_id(&self) -> CommandId {
        self.command
    }

    pub fn command(&self) -> &'m CommandMetadata {
        self.metadata.command(self.command)
    }

    /// Innermost group named on the command line, if any.
    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    pub fn group_path(&self) -> Vec<&'m str> {
        self.group
            .map(|g| self.metadata.group_path(g))
            .unwrap_or_default()
    }

    /// Options that occurred, in order of first occurrence.
    pub fn options(&self) -> &[OptionValues<'m>] {
        &self.options
    }

    /// Look an option up by title or by any of its names.
    pub fn option(&self, key: &str) -> Option<&OptionValues<'m>> {
        self.options
            .iter()
            .find(|o| o.option.title() == key || o.option.has_name(key))
    }

    /// Value of the last occurrence of the option named `key`.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.option(key).and_then(OptionValues::last)
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// Tokens left over when unexpected arguments are tolerated.
    pub fn unparsed(&self) -> &[String] {
        &self.unparsed
    }

    /// `(accessor, value)` pairs for the selected command.
    ///
    /// Multi-valued accessors receive a list of every occurrence; others
    /// receive the last one. Merged global and group options only bind to
    /// accessors the selected command declared itself.
    pub fn bindings(&self) -> Vec<Binding<'m>> {
        let command = self.command();
        let own: Vec<&Accessor> = command.all_options().flat_map(|o| o.accessors()).collect();
        let mut bindings = Vec::new();

        for entry in &self.options {
            let Some(last) = entry.values.last() else {
                continue;
            };
            for accessor in entry.option.accessors() {
                if entry.option.scope() != OptionScope::Command && !own.contains(&accessor) {
                    continue;
                }
                let value = if accessor.is_multi_valued() {
                    Value::List(entry.values.clone())
                } else {
                    last.clone()
                };
                bindings.push(Binding { accessor, value });
            }
        }

        if let Some(arguments) = command.arguments() {
            if !self.arguments.is_empty() {
                for accessor in arguments.accessors() {
                    let value = match self.arguments.as_slice() {
                        [single] if !accessor.is_multi_valued() => single.clone(),
                        all => Value::List(all.to_vec()),
                    };
                    bindings.push(Binding { accessor, value });
                }
            }
        }
        bindings
    }

    /// Standard-form tokens that parse back to the same values.
    pub fn to_tokens(&self) -> Vec<String> {
        let parser = self.metadata.parser();
        let mut tokens = Vec::new();
        let emit = |entry: &OptionValues<'m>, tokens: &mut Vec<String>| {
            let option = entry.option;
            let Some(name) = option.names().first() else {
                return;
            };
            for value in &entry.values {
                match value {
                    Value::Bool(true) if option.is_flag() => tokens.push(name.clone()),
                    Value::Bool(false) if option.is_flag() => match parser.flag_negation_prefix() {
                        Some(prefix) => tokens.push(negated_name(prefix, name)),
                        None => tokens.push(format!("{}=false", name)),
                    },
                    other => {
                        tokens.push(name.clone());
                        tokens.extend(other.to_tokens());
                    }
                }
            }
        };

        for entry in self.options.iter().filter(|o| o.option.scope() == OptionScope::Global) {
            emit(entry, &mut tokens);
        }
        tokens.extend(self.group_path().into_iter().map(str::to_string));
        tokens.push(self.command().name().to_string());
        for entry in self.options.iter().filter(|o| o.option.scope() != OptionScope::Global) {
            emit(entry, &mut tokens);
        }
        if !self.arguments.is_empty() {
            tokens.push(parser.arguments_separator().to_string());
            tokens.extend(self.arguments.iter().flat_map(Value::to_tokens));
        }
        tokens
    }
}

/// Turns a resolved invocation into a runnable command.
pub trait CommandFactory {
    type Command;
    type Error: From<ParseError>;

    fn create(&self, result: &ParseResult<'_>) -> Result<Self::Command, Self::Error>;
}

/// Parser over an immutable metadata model.
///
/// The parser holds no per-invocation state, so one instance can serve any
/// number of parses, including concurrent ones.
#[derive(Debug, Clone, Copy)]
pub struct Parser<'m> {
    metadata: &'m GlobalMetadata,
}

impl<'m> Parser<'m> {
    pub fn new(metadata: &'m GlobalMetadata) -> Self {
        Self { metadata }
    }

    pub fn metadata(&self) -> &'m GlobalMetadata {
        self.metadata
    }

    /// Parse `args` (without the program name).
    pub fn parse<S: AsRef<str>>(&self, args: &[S]) -> Result<ParseResult<'m>, ParseError> {
        let expanded = AliasResolver::new(self.metadata)?.expand(args)?;
        let mut tokens = Tokens::new(&expanded);
        let mut state = ParseState::new(self.metadata);

        self.parse_options(&mut tokens, &mut state)?;
        self.parse_group_path(&mut tokens, &mut state)?;
        let command = match self.resolve_command(&mut tokens, &state) {
            Ok(command) => command,
            Err(error) => return Err(state.conclude_with(error)),
        };
        state.select_command(command);
        self.parse_body(command, &mut tokens, &mut state)?;
        self.finish(command, state)
    }

    /// Parse `args` and hand the result to `factory`.
    pub fn parse_with<F, S>(&self, factory: &F, args: &[S]) -> Result<F::Command, F::Error>
    where
        F: CommandFactory,
        S: AsRef<str>,
    {
        let result = self.parse(args)?;
        factory.create(&result)
    }

    fn parse_options(&self, tokens: &mut Tokens<'_>, state: &mut ParseState<'m>) -> Result<(), ParseError> {
        while self.parse_one_option(tokens, state)? {}
        Ok(())
    }

    /// Offer the token at the cursor to each strategy in turn.
    fn parse_one_option(&self, tokens: &mut Tokens<'_>, state: &mut ParseState<'m>) -> Result<bool, ParseError> {
        match tokens.peek() {
            None => return Ok(false),
            Some(token) if token == self.metadata.parser().arguments_separator() => return Ok(false),
            Some(_) => {}
        }
        for strategy in self.metadata.parser().option_parsers() {
            if strategy.parse_option(tokens, state)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Exact command name first, then an unambiguous prefix when enabled.
    fn match_name<T: Copy>(&self, candidates: &[T], token: &str, name: impl Fn(T) -> &'m str) -> Option<T> {
        if let Some(found) = candidates.iter().copied().find(|c| name(*c) == token) {
            return Some(found);
        }
        if !self.metadata.parser().allow_abbreviated_commands() || token.is_empty() {
            return None;
        }
        let mut matches = candidates.iter().copied().filter(|c| name(*c).starts_with(token));
        match (matches.next(), matches.next()) {
            (Some(found), None) => Some(found),
            _ => None,
        }
    }

    fn parse_group_path(&self, tokens: &mut Tokens<'_>, state: &mut ParseState<'m>) -> Result<(), ParseError> {
        let metadata = self.metadata;
        while let Some(token) = tokens.peek() {
            let candidates = match state.group() {
                None => metadata.command_groups(),
                Some(group) => metadata.group(group).sub_groups(),
            };
            // Group names are never abbreviated.
            let Some(group) = candidates.iter().copied().find(|id| metadata.group(*id).name() == token)
            else {
                break;
            };
            tokens.advance();
            state.enter_group(group);
            self.parse_options(tokens, state)?;
        }
        Ok(())
    }

    fn resolve_command(&self, tokens: &mut Tokens<'_>, state: &ParseState<'m>) -> Result<CommandId, ParseError> {
        let metadata = self.metadata;
        let (candidates, default) = match state.group() {
            Some(group) => (
                metadata.group(group).commands(),
                metadata.group(group).default_command(),
            ),
            None => (metadata.default_group_commands(), metadata.default_command()),
        };
        let group_name = state.group().map(|g| metadata.group_path(g).join(" "));

        match tokens.peek() {
            Some(token) if token != metadata.parser().arguments_separator() => {
                if let Some(command) = self.match_name(candidates, token, |id| metadata.command(id).name()) {
                    tokens.advance();
                    return Ok(command);
                }
                if let Some(command) = default {
                    tracing::debug!(token, "no command named, using the default command");
                    return Ok(command);
                }
                if state.group().is_none() && candidates.is_empty() && !metadata.command_groups().is_empty() {
                    return Err(ParseError::GroupUnrecognized(token.to_string()));
                }
                Err(ParseError::CommandUnrecognized {
                    name: token.to_string(),
                    group: group_name,
                })
            }
            _ => default.ok_or(ParseError::CommandMissing { group: group_name }),
        }
    }

    fn parse_body(
        &self,
        command: CommandId,
        tokens: &mut Tokens<'_>,
        state: &mut ParseState<'m>,
    ) -> Result<(), ParseError> {
        let metadata = self.metadata.command(command);
        let separator = self.metadata.parser().arguments_separator();
        // The in-scope instance, so occurrences count towards the same option.
        let default_option = metadata.default_option().map(|default| {
            default
                .names()
                .first()
                .and_then(|name| state.find_exact_option(name))
                .unwrap_or(default)
        });

        while let Some(token) = tokens.peek() {
            if token == separator {
                tokens.advance();
                for rest in tokens.take_remaining() {
                    Self::positional(metadata, &rest, state)?;
                }
                break;
            }
            if self.parse_one_option(tokens, state)? {
                continue;
            }
            tokens.advance();
            match default_option {
                Some(option) => state.record_option(option, vec![token.to_string()])?,
                None => Self::positional(metadata, token, state)?,
            }
        }
        Ok(())
    }

    fn positional(command: &CommandMetadata, token: &str, state: &mut ParseState<'m>) -> Result<(), ParseError> {
        if command.arguments().is_some() {
            state.record_argument(token)
        } else {
            state.record_unparsed(token);
            Ok(())
        }
    }

    /// Convert and post-validate one raw token; `None` when a collected error replaced it.
    fn convert_value(
        &self,
        target: Target<'m>,
        index: usize,
        raw: &str,
        state: &mut ParseState<'m>,
    ) -> Result<Option<Value>, ParseError> {
        let converter = self.metadata.parser().type_converter();
        let value = match converter.convert(target.value_type(), raw) {
            Ok(value) => value,
            Err(error) => {
                state.report(ParseError::IllegalValue {
                    title: target.title(index),
                    value: raw.to_string(),
                    reason: error.to_string(),
                })?;
                return Ok(None);
            }
        };
        let restrictions = match target {
            Target::Option(option) => option.restrictions(),
            Target::Arguments(arguments) => arguments.restrictions(),
        };
        for restriction in restrictions {
            if let Err(error) = restriction.post_validate(target, index, &value, converter, &mut state.cache) {
                state.report(error)?;
                return Ok(None);
            }
        }
        Ok(Some(value))
    }

    fn convert_option(&self, occurrence: &ParsedOption<'m>, state: &mut ParseState<'m>) -> Result<Option<Value>, ParseError> {
        let target = Target::Option(occurrence.option);
        if let [raw] = occurrence.raw.as_slice() {
            return self.convert_value(target, occurrence.index, raw, state);
        }
        let mut values = Vec::with_capacity(occurrence.raw.len());
        for raw in &occurrence.raw {
            match self.convert_value(target, occurrence.index, raw, state)? {
                Some(value) => values.push(value),
                None => return Ok(None),
            }
        }
        Ok(Some(Value::List(values)))
    }

    fn finish(&self, command: CommandId, mut state: ParseState<'m>) -> Result<ParseResult<'m>, ParseError> {
        let metadata = self.metadata.command(command);

        let mut options: Vec<OptionValues<'m>> = Vec::new();
        let parsed = state.parsed_options().to_vec();
        for occurrence in &parsed {
            let Some(value) = self.convert_option(occurrence, &mut state)? else {
                continue;
            };
            match options.iter_mut().find(|o| std::ptr::eq(o.option, occurrence.option)) {
                Some(entry) => entry.values.push(value),
                None => options.push(OptionValues {
                    option: occurrence.option,
                    values: vec![value],
                }),
            }
        }

        let mut arguments = Vec::new();
        if let Some(spec) = metadata.arguments() {
            let raw = state.arguments().to_vec();
            if let Some(expected) = spec.arity() {
                if raw.len() > expected {
                    state.report(ParseError::TooManyArguments {
                        title: spec.title(),
                        expected,
                        found: raw.len(),
                    })?;
                } else if raw.len() < expected {
                    state.report(ParseError::TooFewArguments {
                        title: spec.title(),
                        expected,
                        found: raw.len(),
                    })?;
                }
            }
            for (index, token) in raw.iter().enumerate() {
                if let Some(value) = self.convert_value(Target::Arguments(spec), index, token, &mut state)? {
                    arguments.push(value);
                }
            }
        }

        let in_scope = state.options_in_scope().to_vec();
        for option in in_scope {
            for restriction in option.restrictions() {
                if let Err(error) = restriction.final_validate_option(option, &state) {
                    state.report(error)?;
                }
            }
        }
        if let Some(spec) = metadata.arguments() {
            for restriction in spec.restrictions() {
                if let Err(error) = restriction.final_validate_arguments(spec, &state) {
                    state.report(error)?;
                }
            }
        }
        for restriction in self.metadata.restrictions() {
            for error in restriction.validate(&state) {
                state.report(error)?;
            }
        }
        state.take_errors()?;

        tracing::debug!(
            command = metadata.name(),
            options = options.len(),
            arguments = arguments.len(),
            "parse complete"
        );
        Ok(ParseResult {
            metadata: self.metadata,
            group: state.group(),
            command,
            options,
            arguments,
            unparsed: state.unparsed().to_vec(),
        })
    }
}
