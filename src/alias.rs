//! Alias expansion.
//!
//! Only the first token of an invocation is ever expanded. Built-in
//! aliases come from [`ParserMetadata`](crate::metadata::ParserMetadata);
//! user aliases come from a [`UserAliasSource`] and shadow built-in ones of
//! the same name.

use crate::metadata::{AliasMetadata, GlobalMetadata};
use crate::parser::ParseError;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prefix that forces the built-in command of the same name.
pub const FORCE_BUILT_IN: char = '!';

#[derive(Debug, Error)]
pub enum AliasError {
    #[error("failed to read alias file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
}

/// A source of user-defined aliases, consulted once per parse.
pub trait UserAliasSource: Send + Sync + fmt::Debug {
    fn load(&self) -> Result<Vec<AliasMetadata>, AliasError>;
}

/// Properties-style alias file.
///
/// ```text
/// # comment
/// alias.co=checkout
/// alias.lg = log --format "%h %s"
/// ```
///
/// A missing file defines no aliases.
#[derive(Debug, Clone)]
pub struct AliasFile {
    path: PathBuf,
    prefix: String,
}

impl AliasFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            prefix: "alias.".to_string(),
        }
    }

    /// Key prefix that marks an alias line, `alias.` by default.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse alias definitions from file content.
    pub fn parse(content: &str, prefix: &str) -> Result<Vec<AliasMetadata>, AliasError> {
        let mut aliases = Vec::new();
        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(AliasError::Syntax {
                    line: number + 1,
                    message: format!("expected key=value, got '{}'", line),
                });
            };
            let Some(name) = key.trim().strip_prefix(prefix) else {
                continue;
            };
            let tokens = split_tokens(value.trim()).map_err(|message| AliasError::Syntax {
                line: number + 1,
                message,
            })?;
            let alias = AliasMetadata::new(name, tokens);
            if alias.validate().is_err() {
                return Err(AliasError::Syntax {
                    line: number + 1,
                    message: format!("alias '{}' needs a name and at least one token", name),
                });
            }
            aliases.push(alias);
        }
        Ok(aliases)
    }
}

impl UserAliasSource for AliasFile {
    fn load(&self) -> Result<Vec<AliasMetadata>, AliasError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no user alias file");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(AliasError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        Self::parse(&content, &self.prefix)
    }
}

/// Split `input` into tokens with shell-like quoting.
///
/// Whitespace separates tokens; single quotes are literal, double quotes
/// allow `\"` and `\\`, and a backslash outside quotes escapes the next
/// character.
pub fn split_tokens(input: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err("unterminated single quote".to_string()),
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\')) => current.push(c),
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err("unterminated double quote".to_string()),
                        },
                        Some(c) => current.push(c),
                        None => return Err("unterminated double quote".to_string()),
                    }
                }
            }
            '\\' => {
                in_token = true;
                match chars.next() {
                    Some(c) => current.push(c),
                    None => return Err("trailing backslash".to_string()),
                }
            }
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Expands the leading alias of a token vector.
#[derive(Debug)]
pub struct AliasResolver<'m> {
    metadata: &'m GlobalMetadata,
    aliases: HashMap<String, Vec<String>>,
}

impl<'m> AliasResolver<'m> {
    /// Collect built-in aliases and load user aliases over them.
    pub fn new(metadata: &'m GlobalMetadata) -> Result<Self, ParseError> {
        let mut aliases: HashMap<String, Vec<String>> = metadata
            .parser()
            .aliases()
            .iter()
            .map(|a| (a.name().to_string(), a.arguments().to_vec()))
            .collect();

        if let Some(source) = metadata.parser().user_aliases() {
            let user = source
                .load()
                .map_err(|e| ParseError::AliasSource(e.to_string()))?;
            for alias in user {
                tracing::trace!(alias = alias.name(), "loaded user alias");
                aliases.insert(alias.name().to_string(), alias.arguments().to_vec());
            }
        }

        Ok(Self { metadata, aliases })
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.aliases.get(name).map(Vec::as_slice)
    }

    /// Whether `name` may be replaced by its alias.
    fn expandable(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
            && (self.metadata.parser().aliases_override_built_ins() || !self.metadata.is_built_in(name))
    }

    /// Expand the first token, repeatedly when chaining is enabled.
    ///
    /// Fails with [`ParseError::CyclicAlias`] when a chain revisits an alias.
    pub fn expand<S: AsRef<str>>(&self, args: &[S]) -> Result<Vec<String>, ParseError> {
        let mut tokens: Vec<String> = args.iter().map(|a| a.as_ref().to_string()).collect();
        let mut chain: Vec<String> = Vec::new();

        loop {
            let Some(first) = tokens.first() else {
                break;
            };
            if !self.expandable(first) {
                break;
            }
            if chain.iter().any(|c| c == first) {
                let mut cycle = chain.clone();
                cycle.push(first.clone());
                return Err(ParseError::CyclicAlias {
                    alias: first.clone(),
                    chain: cycle,
                });
            }

            let name = first.clone();
            let replacement = self.get(&name).unwrap_or_default().to_vec();
            tracing::debug!(alias = %name, ?replacement, "expanded alias");
            tokens.splice(0..1, replacement);
            chain.push(name);

            if let Some(forced) = tokens.first().and_then(|t| t.strip_prefix(FORCE_BUILT_IN)) {
                let forced = forced.to_string();
                tokens[0] = forced;
                break;
            }
            if !self.metadata.parser().aliases_may_chain() {
                break;
            }
        }

        Ok(tokens)
    }
}
