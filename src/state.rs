//! Per-invocation parse state.
//!
//! A [`ParseState`] is created for every call to the parser and never
//! shared; the metadata model it borrows is immutable.

use crate::metadata::{CommandId, ErrorHandling, GlobalMetadata, GroupId, OptionMetadata};
use crate::parser::ParseError;
use crate::restrictions::{ConversionCache, Target};
use crate::strategies::{find_option, OptionMatch};

/// One occurrence of an option with its raw value tokens.
#[derive(Debug, Clone)]
pub struct ParsedOption<'m> {
    pub option: &'m OptionMetadata,
    pub raw: Vec<String>,
    /// Zero-based occurrence index of this option
    pub index: usize,
}

#[derive(Debug)]
pub struct ParseState<'m> {
    metadata: &'m GlobalMetadata,
    group: Option<GroupId>,
    command: Option<CommandId>,
    in_scope: Vec<&'m OptionMetadata>,
    options: Vec<ParsedOption<'m>>,
    arguments: Vec<String>,
    unparsed: Vec<String>,
    missing_values: Vec<(&'m OptionMetadata, usize)>,
    errors: Vec<ParseError>,
    pub(crate) cache: ConversionCache,
}

impl<'m> ParseState<'m> {
    /// Fresh state with the global options in scope.
    pub fn new(metadata: &'m GlobalMetadata) -> Self {
        Self {
            metadata,
            group: None,
            command: None,
            in_scope: metadata.options().iter().collect(),
            options: Vec::new(),
            arguments: Vec::new(),
            unparsed: Vec::new(),
            missing_values: Vec::new(),
            errors: Vec::new(),
            cache: ConversionCache::default(),
        }
    }

    pub fn metadata(&self) -> &'m GlobalMetadata {
        self.metadata
    }

    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    pub fn command(&self) -> Option<CommandId> {
        self.command
    }

    /// Descend into `group`; its options join the scope.
    pub fn enter_group(&mut self, group: GroupId) {
        let metadata = self.metadata;
        tracing::debug!(group = metadata.group(group).name(), "entered group");
        self.group = Some(group);
        self.push_scope(metadata.group(group).options().iter());
    }

    /// Select the command whose body is parsed next.
    pub fn select_command(&mut self, command: CommandId) {
        let metadata = self.metadata;
        let metadata = metadata.command(command);
        tracing::debug!(command = metadata.name(), "selected command");
        self.command = Some(command);
        self.push_scope(metadata.command_options().iter());
        // Group options of a command outside any group are still its own.
        if self.group.is_none() {
            self.push_scope(metadata.group_options().iter());
        }
    }

    fn push_scope(&mut self, options: impl Iterator<Item = &'m OptionMetadata>) {
        for option in options {
            // Global and group scope already carry the merged definition.
            let known = self
                .in_scope
                .iter()
                .any(|o| std::ptr::eq(*o, option) || o.name_set() == option.name_set());
            if !known {
                self.in_scope.push(option);
            }
        }
    }

    /// Options the strategies may currently recognize.
    pub fn options_in_scope(&self) -> &[&'m OptionMetadata] {
        &self.in_scope
    }

    pub fn find_option(&self, token: &str) -> Option<OptionMatch<'m>> {
        find_option(&self.in_scope, token, self.metadata.parser())
    }

    /// Exact name lookup with no abbreviation or negation.
    pub fn find_exact_option(&self, name: &str) -> Option<&'m OptionMetadata> {
        self.in_scope.iter().copied().find(|o| o.has_name(name))
    }

    /// Apply the error policy: fail fast, or keep the error and carry on.
    pub fn report(&mut self, error: ParseError) -> Result<(), ParseError> {
        match self.metadata.parser().error_handling() {
            ErrorHandling::FailFast => Err(error),
            ErrorHandling::CollectAll => {
                tracing::debug!(%error, "collected parse error");
                self.errors.push(error);
                Ok(())
            }
        }
    }

    /// Record one occurrence of `option`, pre-validating its raw values.
    pub fn record_option(&mut self, option: &'m OptionMetadata, raw: Vec<String>) -> Result<(), ParseError> {
        let index = self.occurrences(option);
        for value in &raw {
            for restriction in option.restrictions() {
                if let Err(error) = restriction.pre_validate(Target::Option(option), index, value) {
                    return self.report(error);
                }
            }
        }
        tracing::trace!(option = option.title(), ?raw, "recorded option");
        self.options.push(ParsedOption { option, raw, index });
        Ok(())
    }

    /// Record a positional argument of the selected command.
    pub fn record_argument(&mut self, raw: &str) -> Result<(), ParseError> {
        let index = self.arguments.len();
        let metadata = self.metadata;
        let arguments = self.command.and_then(|id| metadata.command(id).arguments());
        if let Some(arguments) = arguments {
            for restriction in arguments.restrictions() {
                if let Err(error) = restriction.pre_validate(Target::Arguments(arguments), index, raw) {
                    // Keep the position so later titles stay aligned.
                    self.arguments.push(raw.to_string());
                    return self.report(error);
                }
            }
        }
        self.arguments.push(raw.to_string());
        Ok(())
    }

    /// An option ran out of tokens before its arity was met.
    pub fn record_missing_value(&mut self, option: &'m OptionMetadata, found: usize) {
        tracing::trace!(option = option.title(), found, "option value missing");
        self.missing_values.push((option, found));
    }

    pub fn record_unparsed(&mut self, token: &str) {
        self.unparsed.push(token.to_string());
    }

    /// Number of recorded occurrences of `option`.
    pub fn occurrences(&self, option: &OptionMetadata) -> usize {
        self.options
            .iter()
            .filter(|p| std::ptr::eq(p.option, option))
            .count()
    }

    pub fn parsed_options(&self) -> &[ParsedOption<'m>] {
        &self.options
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn unparsed(&self) -> &[String] {
        &self.unparsed
    }

    pub fn missing_values(&self) -> &[(&'m OptionMetadata, usize)] {
        &self.missing_values
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    /// Final error of an aborted parse, together with anything collected so far.
    pub fn conclude_with(mut self, error: ParseError) -> ParseError {
        self.errors.push(error);
        if self.errors.len() == 1 {
            self.errors.remove(0)
        } else {
            ParseError::Multiple(self.errors)
        }
    }

    /// Collected errors as a single result.
    pub fn take_errors(&mut self) -> Result<(), ParseError> {
        let mut errors = std::mem::take(&mut self.errors);
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ParseError::Multiple(errors)),
        }
    }
}
