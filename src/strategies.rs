//! Pluggable option syntaxes.
//!
//! Each [`OptionParser`] looks at the token under the cursor and either
//! consumes it (plus any value tokens) and records an occurrence in the
//! [`ParseState`], or leaves the cursor untouched and reports `false` so the
//! next strategy may try.

use crate::metadata::{OptionMetadata, ParserMetadata};
use crate::parser::ParseError;
use crate::state::ParseState;
use std::fmt;

/// Cursor over the (alias-expanded) token vector.
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    items: &'a [String],
    position: usize,
}

impl<'a> Tokens<'a> {
    pub fn new(items: &'a [String]) -> Self {
        Self { items, position: 0 }
    }

    pub fn peek(&self) -> Option<&'a str> {
        self.peek_at(0)
    }

    /// Token `offset` places after the cursor.
    pub fn peek_at(&self, offset: usize) -> Option<&'a str> {
        self.items.get(self.position + offset).map(String::as_str)
    }

    pub fn advance(&mut self) {
        if self.position < self.items.len() {
            self.position += 1;
        }
    }

    pub fn next_token(&mut self) -> Option<&'a str> {
        let token = self.peek();
        self.advance();
        token
    }

    /// Consume up to `count` tokens.
    pub fn take(&mut self, count: usize) -> Vec<String> {
        let end = (self.position + count).min(self.items.len());
        let taken = self.items[self.position..end].to_vec();
        self.position = end;
        taken
    }

    /// Consume everything left.
    pub fn take_remaining(&mut self) -> Vec<String> {
        let rest = self.remaining().to_vec();
        self.position = self.items.len();
        rest
    }

    pub fn remaining(&self) -> &'a [String] {
        &self.items[self.position..]
    }

    pub fn is_empty(&self) -> bool {
        self.position >= self.items.len()
    }
}

/// An option found for a token.
#[derive(Debug, Clone, Copy)]
pub struct OptionMatch<'m> {
    pub option: &'m OptionMetadata,
    /// The token used the flag negation prefix
    pub negated: bool,
}

/// Negated spelling of `name` under `prefix`, e.g. `--no-` + `--verbose`
/// gives `--no-verbose`.
pub fn negated_name(prefix: &str, name: &str) -> String {
    format!("{}{}", prefix, name.trim_start_matches('-'))
}

/// Find the option `token` refers to among `allowed`.
///
/// Tried in order: an exact name, a negated flag name, then (if enabled) an
/// unambiguous prefix of exactly one option's names.
pub fn find_option<'m>(
    allowed: &[&'m OptionMetadata],
    token: &str,
    config: &ParserMetadata,
) -> Option<OptionMatch<'m>> {
    if let Some(option) = allowed.iter().copied().find(|o| o.has_name(token)) {
        return Some(OptionMatch {
            option,
            negated: false,
        });
    }

    if let Some(prefix) = config.flag_negation_prefix() {
        let negated = allowed.iter().copied().filter(|o| o.is_flag()).find(|o| {
            o.names().iter().any(|n| token == negated_name(prefix, n))
        });
        if let Some(option) = negated {
            return Some(OptionMatch {
                option,
                negated: true,
            });
        }
    }

    if config.allow_abbreviated_options() && !token.trim_start_matches('-').is_empty() {
        // Candidates are counted per option, not per name.
        let mut candidates = allowed
            .iter()
            .copied()
            .filter(|o| o.names().iter().any(|n| n.starts_with(token)));
        if let (Some(option), None) = (candidates.next(), candidates.next()) {
            tracing::trace!(token, option = option.title(), "abbreviated option");
            return Some(OptionMatch {
                option,
                negated: false,
            });
        }
    }

    None
}

/// Consume the value tokens of a matched option and record the occurrence.
fn consume_values<'m>(
    matched: OptionMatch<'m>,
    tokens: &mut Tokens<'_>,
    state: &mut ParseState<'m>,
) -> Result<(), ParseError> {
    let arity = matched.option.effective_arity();
    if arity == 0 {
        let raw = if matched.negated { "false" } else { "true" };
        return state.record_option(matched.option, vec![raw.to_string()]);
    }
    let values = tokens.take(arity);
    if values.len() < arity {
        state.record_missing_value(matched.option, values.len());
        return Ok(());
    }
    state.record_option(matched.option, values)
}

/// A syntax for writing options on the command line.
pub trait OptionParser: Send + Sync + fmt::Debug {
    /// Try to consume an option at the cursor.
    ///
    /// Returns `Ok(false)` without moving the cursor when the token is not
    /// in this syntax.
    fn parse_option<'m>(
        &self,
        tokens: &mut Tokens<'_>,
        state: &mut ParseState<'m>,
    ) -> Result<bool, ParseError>;
}

/// `-x value`, `--long value`, `--long=value` and repeatable flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardOptionParser;

impl OptionParser for StandardOptionParser {
    fn parse_option<'m>(
        &self,
        tokens: &mut Tokens<'_>,
        state: &mut ParseState<'m>,
    ) -> Result<bool, ParseError> {
        let Some(token) = tokens.peek() else {
            return Ok(false);
        };

        if let Some(matched) = state.find_option(token) {
            tokens.advance();
            consume_values(matched, tokens, state)?;
            return Ok(true);
        }

        if let Some((name, value)) = token.split_once('=') {
            if let Some(matched) = state.find_option(name) {
                if matched.option.effective_arity() <= 1 && !matched.negated {
                    tokens.advance();
                    state.record_option(matched.option, vec![value.to_string()])?;
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }
}

/// GNU long options: `--name=value` for single valued options and bare
/// `--flag` for flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongGetOptParser;

impl OptionParser for LongGetOptParser {
    fn parse_option<'m>(
        &self,
        tokens: &mut Tokens<'_>,
        state: &mut ParseState<'m>,
    ) -> Result<bool, ParseError> {
        let Some(token) = tokens.peek() else {
            return Ok(false);
        };
        if !token.starts_with("--") {
            return Ok(false);
        }

        match token.split_once('=') {
            Some((name, value)) => match state.find_option(name) {
                Some(matched) if matched.option.effective_arity() == 1 => {
                    tokens.advance();
                    state.record_option(matched.option, vec![value.to_string()])?;
                    Ok(true)
                }
                _ => Ok(false),
            },
            None => match state.find_option(token) {
                Some(matched) if matched.option.effective_arity() == 0 => {
                    tokens.advance();
                    consume_values(matched, tokens, state)?;
                    Ok(true)
                }
                _ => Ok(false),
            },
        }
    }
}

/// Classic getopt short options: bundled flags `-abc` and attached values
/// `-ofile`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassicGetOptParser;

impl ClassicGetOptParser {
    /// Resolve each character of a bundle, stopping at the first option
    /// that takes a value.
    fn resolve_bundle<'m>(
        bundle: &str,
        state: &ParseState<'m>,
    ) -> Option<Vec<(&'m OptionMetadata, Option<String>)>> {
        let mut resolved = Vec::new();
        let mut chars = bundle.char_indices();
        while let Some((index, c)) = chars.next() {
            let option = state.find_exact_option(&format!("-{}", c))?;
            if option.effective_arity() == 0 {
                resolved.push((option, None));
                continue;
            }
            let rest = &bundle[index + c.len_utf8()..];
            resolved.push((option, (!rest.is_empty()).then(|| rest.to_string())));
            break;
        }
        Some(resolved)
    }
}

impl OptionParser for ClassicGetOptParser {
    fn parse_option<'m>(
        &self,
        tokens: &mut Tokens<'_>,
        state: &mut ParseState<'m>,
    ) -> Result<bool, ParseError> {
        let Some(token) = tokens.peek() else {
            return Ok(false);
        };
        let Some(bundle) = token.strip_prefix('-') else {
            return Ok(false);
        };
        if bundle.starts_with('-') || bundle.chars().count() < 2 {
            return Ok(false);
        }
        let Some(resolved) = Self::resolve_bundle(bundle, state) else {
            return Ok(false);
        };

        tokens.advance();
        for (option, attached) in resolved {
            let arity = option.effective_arity();
            match attached {
                _ if arity == 0 => state.record_option(option, vec!["true".to_string()])?,
                Some(value) if arity == 1 => state.record_option(option, vec![value])?,
                Some(value) => {
                    let mut values = vec![value];
                    values.extend(tokens.take(arity - 1));
                    if values.len() < arity {
                        state.record_missing_value(option, values.len());
                    } else {
                        state.record_option(option, values)?;
                    }
                }
                None => {
                    let values = tokens.take(arity);
                    if values.len() < arity {
                        state.record_missing_value(option, values.len());
                    } else {
                        state.record_option(option, values)?;
                    }
                }
            }
        }
        Ok(true)
    }
}

/// `-x a,b,c` for options whose arity is above one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListValueOptionParser;

impl OptionParser for ListValueOptionParser {
    fn parse_option<'m>(
        &self,
        tokens: &mut Tokens<'_>,
        state: &mut ParseState<'m>,
    ) -> Result<bool, ParseError> {
        let (Some(token), Some(list)) = (tokens.peek(), tokens.peek_at(1)) else {
            return Ok(false);
        };
        let Some(matched) = state.find_option(token) else {
            return Ok(false);
        };
        let arity = matched.option.effective_arity();
        if arity < 2 {
            return Ok(false);
        }
        let values: Vec<String> = list.split(',').map(str::to_string).collect();
        if values.len() != arity {
            return Ok(false);
        }
        tokens.advance();
        tokens.advance();
        state.record_option(matched.option, values)?;
        Ok(true)
    }
}
