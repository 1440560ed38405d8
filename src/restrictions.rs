//! Validation rules attached to options and arguments.
//!
//! A [`Restriction`] may act in up to three phases:
//!
//! - **pre**: on the raw token, as soon as it is consumed
//! - **post**: on the converted value, once the command body is complete
//! - **final**: on the complete parse state (required, option groups)
//!
//! Phases a variant does not implement are no-ops. [`Restriction::phases`]
//! reports which ones apply, and [`Restriction::help_hint`] gives renderers
//! a sentence describing the rule.

use crate::metadata::{ArgumentsMetadata, MetadataError, OptionMetadata};
use crate::parser::ParseError;
use crate::state::ParseState;
use crate::types::{ConversionError, TypeConverter, Value, ValueType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The option or arguments a restriction is being applied to.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Option(&'a OptionMetadata),
    Arguments(&'a ArgumentsMetadata),
}

impl<'a> Target<'a> {
    /// Title of the value at occurrence or position `index`.
    pub fn title(&self, index: usize) -> String {
        match self {
            Target::Option(option) => option.title().to_string(),
            Target::Arguments(arguments) => arguments.title_at(index),
        }
    }

    pub fn value_type(&self) -> &'a ValueType {
        match self {
            Target::Option(option) => option.value_type(),
            Target::Arguments(arguments) => arguments.value_type(),
        }
    }
}

/// Which validation phases a restriction takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Phases {
    pub pre: bool,
    pub post: bool,
    pub fin: bool,
}

/// Kind of constraint an option group tag imposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    /// At most one member may occur
    MutuallyExclusive,
    /// Exactly one member must occur
    RequireOnlyOne,
    /// At least one member must occur
    RequireSome,
}

/// What a path argument must refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    #[default]
    Any,
    File,
    Directory,
}

/// Inclusive port number range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    pub const OS_ALLOCATED: PortRange = PortRange { min: 0, max: 0 };
    pub const SYSTEM: PortRange = PortRange { min: 1, max: 1023 };
    pub const USER: PortRange = PortRange {
        min: 1024,
        max: 49151,
    };
    pub const DYNAMIC: PortRange = PortRange {
        min: 49152,
        max: 65535,
    };
    pub const ANY: PortRange = PortRange { min: 0, max: 65535 };

    pub fn contains(&self, port: i64) -> bool {
        port >= i64::from(self.min) && port <= i64::from(self.max)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

/// A user supplied restriction.
///
/// Both phases default to accepting everything; the error string becomes
/// the reason of a [`ParseError::RestrictionViolated`].
pub trait CustomRestriction: Send + Sync + fmt::Debug {
    fn pre_validate(&self, _raw: &str) -> Result<(), String> {
        Ok(())
    }

    fn post_validate(&self, _value: &Value) -> Result<(), String> {
        Ok(())
    }

    fn help_hint(&self) -> Option<String> {
        None
    }
}

/// A validation rule.
#[derive(Debug, Clone)]
pub enum Restriction {
    /// The option or arguments must occur at least once
    Required,
    /// Raw value must contain a non-whitespace character
    NotBlank,
    /// Raw value must not be the empty string
    NotEmpty,
    /// Raw value length, in characters
    Length {
        min: Option<usize>,
        max: Option<usize>,
    },
    /// Raw value must match the expression somewhere
    Pattern {
        regex: Regex,
        description: Option<String>,
    },
    /// Raw value must be one of `values`
    AllowedRawValues {
        values: Vec<String>,
        ignore_case: bool,
    },
    /// Converted value must equal one of `values` after conversion
    AllowedValues { values: Vec<String> },
    /// Numeric bounds on the converted value
    Range {
        min: Option<f64>,
        max: Option<f64>,
        min_inclusive: bool,
        max_inclusive: bool,
    },
    /// Converted value must be a port in one of the ranges
    Port { ranges: Vec<PortRange> },
    /// Raw value is a path with existence and permission requirements
    Path {
        kind: PathKind,
        must_exist: bool,
        readable: bool,
        writable: bool,
        executable: bool,
    },
    /// Membership of a tagged option group
    Group { kind: GroupKind, tag: String },
    /// Apply `restriction` only to the listed occurrences or positions
    Partial {
        indices: Vec<usize>,
        restriction: Box<Restriction>,
    },
    Custom(Arc<dyn CustomRestriction>),
}

/// Per-invocation cache of converted allowed values.
///
/// Keyed by the address of the restriction inside the metadata model, which
/// stays put for the lifetime of one parse.
#[derive(Debug, Default)]
pub struct ConversionCache {
    allowed: HashMap<usize, Vec<Value>>,
}

impl ConversionCache {
    fn allowed_values(
        &mut self,
        key: &Restriction,
        converter: &dyn TypeConverter,
        value_type: &ValueType,
        raw: &[String],
    ) -> Result<&[Value], ConversionError> {
        let address = key as *const Restriction as usize;
        if !self.allowed.contains_key(&address) {
            let converted = raw
                .iter()
                .map(|r| converter.convert(value_type, r))
                .collect::<Result<Vec<_>, _>>()?;
            self.allowed.insert(address, converted);
        }
        Ok(self.allowed.get(&address).map(Vec::as_slice).unwrap_or(&[]))
    }
}

fn violated(target: Target<'_>, index: usize, value: impl fmt::Display, reason: String) -> ParseError {
    ParseError::RestrictionViolated {
        title: target.title(index),
        value: value.to_string(),
        reason,
    }
}

fn invalid(target: Target<'_>, index: usize, reason: String) -> ParseError {
    ParseError::InvalidRestriction {
        title: target.title(index),
        reason,
    }
}

/// Nearest ancestor of `path` that exists, used for permission checks on
/// paths that are yet to be created.
fn nearest_existing(path: &Path) -> Option<PathBuf> {
    let mut current = Some(path);
    while let Some(p) = current {
        if p.exists() {
            return Some(p.to_path_buf());
        }
        current = p.parent();
        if current == Some(Path::new("")) {
            return Some(PathBuf::from("."));
        }
    }
    None
}

fn is_readable(path: &Path) -> bool {
    if path.is_dir() {
        std::fs::read_dir(path).is_ok()
    } else {
        std::fs::File::open(path).is_ok()
    }
}

fn is_writable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.exists()
}

/// Patterns compare by source text and custom restrictions by identity.
impl PartialEq for Restriction {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Required, Self::Required)
            | (Self::NotBlank, Self::NotBlank)
            | (Self::NotEmpty, Self::NotEmpty) => true,
            (Self::Length { min: a, max: b }, Self::Length { min: c, max: d }) => a == c && b == d,
            (
                Self::Pattern { regex: a, description: b },
                Self::Pattern { regex: c, description: d },
            ) => a.as_str() == c.as_str() && b == d,
            (
                Self::AllowedRawValues { values: a, ignore_case: b },
                Self::AllowedRawValues { values: c, ignore_case: d },
            ) => a == c && b == d,
            (Self::AllowedValues { values: a }, Self::AllowedValues { values: b }) => a == b,
            (
                Self::Range { min: a, max: b, min_inclusive: c, max_inclusive: d },
                Self::Range { min: e, max: f, min_inclusive: g, max_inclusive: h },
            ) => a == e && b == f && c == g && d == h,
            (Self::Port { ranges: a }, Self::Port { ranges: b }) => a == b,
            (
                Self::Path { kind: a, must_exist: b, readable: c, writable: d, executable: e },
                Self::Path { kind: f, must_exist: g, readable: h, writable: i, executable: j },
            ) => a == f && b == g && c == h && d == i && e == j,
            (Self::Group { kind: a, tag: b }, Self::Group { kind: c, tag: d }) => a == c && b == d,
            (
                Self::Partial { indices: a, restriction: b },
                Self::Partial { indices: c, restriction: d },
            ) => a == c && b == d,
            (Self::Custom(a), Self::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Restriction {
    pub fn mutually_exclusive(tag: impl Into<String>) -> Self {
        Restriction::Group {
            kind: GroupKind::MutuallyExclusive,
            tag: tag.into(),
        }
    }

    pub fn require_only_one(tag: impl Into<String>) -> Self {
        Restriction::Group {
            kind: GroupKind::RequireOnlyOne,
            tag: tag.into(),
        }
    }

    pub fn require_some(tag: impl Into<String>) -> Self {
        Restriction::Group {
            kind: GroupKind::RequireSome,
            tag: tag.into(),
        }
    }

    pub fn range(min: Option<f64>, max: Option<f64>) -> Self {
        Restriction::Range {
            min,
            max,
            min_inclusive: true,
            max_inclusive: true,
        }
    }

    pub fn pattern(expression: &str) -> Result<Self, regex::Error> {
        Ok(Restriction::Pattern {
            regex: Regex::new(expression)?,
            description: None,
        })
    }

    pub fn phases(&self) -> Phases {
        match self {
            Restriction::Required | Restriction::Group { .. } => Phases {
                fin: true,
                ..Phases::default()
            },
            Restriction::NotBlank
            | Restriction::NotEmpty
            | Restriction::Length { .. }
            | Restriction::Pattern { .. }
            | Restriction::AllowedRawValues { .. }
            | Restriction::Path { .. } => Phases {
                pre: true,
                ..Phases::default()
            },
            Restriction::AllowedValues { .. } | Restriction::Range { .. } | Restriction::Port { .. } => {
                Phases {
                    post: true,
                    ..Phases::default()
                }
            }
            Restriction::Partial { restriction, .. } => restriction.phases(),
            Restriction::Custom(_) => Phases {
                pre: true,
                post: true,
                fin: false,
            },
        }
    }

    /// Build-time check that this restriction makes sense on `option`.
    pub fn check_option(&self, option: &OptionMetadata) -> Result<(), MetadataError> {
        self.check(option.title(), option.value_type(), false)
    }

    /// Build-time check that this restriction makes sense on `arguments`.
    pub fn check_arguments(&self, arguments: &ArgumentsMetadata) -> Result<(), MetadataError> {
        self.check(&arguments.title(), arguments.value_type(), true)
    }

    fn check(&self, title: &str, value_type: &ValueType, arguments: bool) -> Result<(), MetadataError> {
        let fail = |reason: &str| MetadataError::InvalidRestriction {
            title: title.to_string(),
            reason: reason.to_string(),
        };
        match self {
            Restriction::Range { .. } | Restriction::Port { .. } if !value_type.is_numeric() => {
                Err(fail(&format!("numeric restriction on a {} value", value_type)))
            }
            Restriction::Length { min: Some(min), max: Some(max) } if min > max => {
                Err(fail("minimum length exceeds maximum length"))
            }
            Restriction::Group { .. } if arguments => {
                Err(fail("option group restrictions cannot apply to arguments"))
            }
            Restriction::Partial { indices, .. } if indices.is_empty() => {
                Err(fail("partial restriction lists no indices"))
            }
            Restriction::Partial { restriction, .. }
                if matches!(**restriction, Restriction::Group { .. }) =>
            {
                Err(fail("option group restrictions cannot be partial"))
            }
            Restriction::Partial { restriction, .. } => {
                restriction.check(title, value_type, arguments)
            }
            _ => Ok(()),
        }
    }

    /// Validate a raw token before conversion.
    pub fn pre_validate(&self, target: Target<'_>, index: usize, raw: &str) -> Result<(), ParseError> {
        match self {
            Restriction::NotBlank if raw.trim().is_empty() => Err(violated(
                target,
                index,
                raw,
                "value may not be blank".to_string(),
            )),
            Restriction::NotEmpty if raw.is_empty() => Err(violated(
                target,
                index,
                raw,
                "value may not be empty".to_string(),
            )),
            Restriction::Length { min, max } => {
                let len = raw.chars().count();
                if let Some(min) = min {
                    if len < *min {
                        return Err(violated(
                            target,
                            index,
                            raw,
                            format!("length {} is less than the minimum of {}", len, min),
                        ));
                    }
                }
                if let Some(max) = max {
                    if len > *max {
                        return Err(violated(
                            target,
                            index,
                            raw,
                            format!("length {} exceeds the maximum of {}", len, max),
                        ));
                    }
                }
                Ok(())
            }
            Restriction::Pattern { regex, description } if !regex.is_match(raw) => {
                let reason = match description {
                    Some(d) => d.clone(),
                    None => format!("value must match the pattern {}", regex.as_str()),
                };
                Err(violated(target, index, raw, reason))
            }
            Restriction::AllowedRawValues { values, ignore_case } => {
                let allowed = if *ignore_case {
                    let lowered = raw.to_lowercase();
                    values.iter().any(|v| v.to_lowercase() == lowered)
                } else {
                    values.iter().any(|v| v == raw)
                };
                if allowed {
                    Ok(())
                } else {
                    Err(violated(
                        target,
                        index,
                        raw,
                        format!("value must be one of: {}", values.join(", ")),
                    ))
                }
            }
            Restriction::Path {
                kind,
                must_exist,
                readable,
                writable,
                executable,
            } => self.check_path(target, index, raw, *kind, *must_exist, *readable, *writable, *executable),
            Restriction::Partial {
                indices,
                restriction,
            } if indices.contains(&index) => restriction.pre_validate(target, index, raw),
            Restriction::Custom(custom) => custom
                .pre_validate(raw)
                .map_err(|reason| violated(target, index, raw, reason)),
            _ => Ok(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_path(
        &self,
        target: Target<'_>,
        index: usize,
        raw: &str,
        kind: PathKind,
        must_exist: bool,
        readable: bool,
        writable: bool,
        executable: bool,
    ) -> Result<(), ParseError> {
        let path = Path::new(raw);
        let fail = |reason: &str| violated(target, index, raw, reason.to_string());

        if !path.exists() {
            if must_exist {
                return Err(fail("path does not exist"));
            }
            // Not created yet: judge by the closest ancestor that is.
            let Some(ancestor) = nearest_existing(path) else {
                return Ok(());
            };
            if readable && !is_readable(&ancestor) {
                return Err(fail("path cannot be created in an unreadable location"));
            }
            if writable && !is_writable(&ancestor) {
                return Err(fail("path cannot be created in a read-only location"));
            }
            if executable && !is_executable(&ancestor) {
                return Err(fail("path cannot be created in a non-executable location"));
            }
            return Ok(());
        }

        match kind {
            PathKind::File if !path.is_file() => return Err(fail("path is not a file")),
            PathKind::Directory if !path.is_dir() => return Err(fail("path is not a directory")),
            _ => {}
        }
        if readable && !is_readable(path) {
            return Err(fail("path is not readable"));
        }
        if writable && !is_writable(path) {
            return Err(fail("path is not writable"));
        }
        if executable && !is_executable(path) {
            return Err(fail("path is not executable"));
        }
        Ok(())
    }

    /// Validate a converted value.
    pub fn post_validate(
        &self,
        target: Target<'_>,
        index: usize,
        value: &Value,
        converter: &dyn TypeConverter,
        cache: &mut ConversionCache,
    ) -> Result<(), ParseError> {
        match self {
            Restriction::AllowedValues { values } => {
                let allowed = cache
                    .allowed_values(self, converter, target.value_type(), values)
                    .map_err(|e| invalid(target, index, format!("allowed value {}", e)))?;
                if allowed.contains(value) {
                    Ok(())
                } else {
                    Err(violated(
                        target,
                        index,
                        value,
                        format!("value must be one of: {}", values.join(", ")),
                    ))
                }
            }
            Restriction::Range {
                min,
                max,
                min_inclusive,
                max_inclusive,
            } => {
                let Some(number) = value.as_f64() else {
                    return Err(invalid(
                        target,
                        index,
                        format!("range restriction on non-numeric value '{}'", value),
                    ));
                };
                let below = match min {
                    Some(min) if *min_inclusive => number < *min,
                    Some(min) => number <= *min,
                    None => false,
                };
                let above = match max {
                    Some(max) if *max_inclusive => number > *max,
                    Some(max) => number >= *max,
                    None => false,
                };
                if below || above {
                    Err(violated(target, index, value, self.describe_range()))
                } else {
                    Ok(())
                }
            }
            Restriction::Port { ranges } => {
                let Some(port) = value.as_int() else {
                    return Err(invalid(
                        target,
                        index,
                        format!("port restriction on non-integer value '{}'", value),
                    ));
                };
                if ranges.iter().any(|r| r.contains(port)) {
                    Ok(())
                } else {
                    let listed: Vec<String> = ranges.iter().map(|r| r.to_string()).collect();
                    Err(violated(
                        target,
                        index,
                        value,
                        format!("port must be in the range(s) {}", listed.join(", ")),
                    ))
                }
            }
            Restriction::Partial {
                indices,
                restriction,
            } if indices.contains(&index) => {
                restriction.post_validate(target, index, value, converter, cache)
            }
            Restriction::Custom(custom) => custom
                .post_validate(value)
                .map_err(|reason| violated(target, index, value, reason)),
            _ => Ok(()),
        }
    }

    /// Validate an option against the complete parse state.
    pub fn final_validate_option(
        &self,
        option: &OptionMetadata,
        state: &ParseState<'_>,
    ) -> Result<(), ParseError> {
        match self {
            Restriction::Required if state.occurrences(option) == 0 => Err(ParseError::OptionMissing {
                title: option.title().to_string(),
                names: option.names().to_vec(),
            }),
            Restriction::Group { kind, tag } => self.check_group(option, *kind, tag, state),
            Restriction::Partial {
                indices,
                restriction,
            } if matches!(**restriction, Restriction::Required) => {
                let count = state.occurrences(option);
                match indices.iter().find(|i| **i >= count) {
                    Some(_) => Err(ParseError::OptionMissing {
                        title: option.title().to_string(),
                        names: option.names().to_vec(),
                    }),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    fn check_group(
        &self,
        option: &OptionMetadata,
        kind: GroupKind,
        tag: &str,
        state: &ParseState<'_>,
    ) -> Result<(), ParseError> {
        let members: Vec<&OptionMetadata> = state
            .options_in_scope()
            .iter()
            .copied()
            .filter(|o| {
                o.restrictions().iter().any(|r| {
                    matches!(r, Restriction::Group { kind: k, tag: t } if *k == kind && t == tag)
                })
            })
            .collect();

        // The whole group is judged once, by its first member.
        if !members.first().is_some_and(|first| std::ptr::eq(*first, option)) {
            return Ok(());
        }

        let present: Vec<String> = members
            .iter()
            .filter(|o| state.occurrences(o) > 0)
            .map(|o| o.title().to_string())
            .collect();
        let reason = match kind {
            GroupKind::MutuallyExclusive if present.len() > 1 => "only one of these options may be given",
            GroupKind::RequireOnlyOne if present.len() != 1 => "exactly one of these options must be given",
            GroupKind::RequireSome if present.is_empty() => "at least one of these options must be given",
            _ => return Ok(()),
        };
        let options = if present.is_empty() {
            members.iter().map(|o| o.title().to_string()).collect()
        } else {
            present
        };
        Err(ParseError::OptionGroupViolated {
            tag: tag.to_string(),
            options,
            reason: reason.to_string(),
        })
    }

    /// Validate arguments against the complete parse state.
    pub fn final_validate_arguments(
        &self,
        arguments: &ArgumentsMetadata,
        state: &ParseState<'_>,
    ) -> Result<(), ParseError> {
        let count = state.arguments().len();
        match self {
            Restriction::Required if count == 0 => Err(ParseError::ArgumentsMissing {
                title: arguments.title(),
            }),
            Restriction::Partial {
                indices,
                restriction,
            } if matches!(**restriction, Restriction::Required) => {
                match indices.iter().find(|i| **i >= count) {
                    Some(index) => Err(ParseError::ArgumentsMissing {
                        title: arguments.title_at(*index),
                    }),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    fn describe_range(&self) -> String {
        let Restriction::Range {
            min,
            max,
            min_inclusive,
            max_inclusive,
        } = self
        else {
            return String::new();
        };
        match (min, max) {
            (Some(min), Some(max)) => format!(
                "value must be in the range {}{}, {}{}",
                if *min_inclusive { "[" } else { "(" },
                min,
                max,
                if *max_inclusive { "]" } else { ")" }
            ),
            (Some(min), None) => format!(
                "value must be {} {}",
                if *min_inclusive { "at least" } else { "greater than" },
                min
            ),
            (None, Some(max)) => format!(
                "value must be {} {}",
                if *max_inclusive { "at most" } else { "less than" },
                max
            ),
            (None, None) => "value is unrestricted".to_string(),
        }
    }

    /// A sentence a help renderer may print next to the option.
    pub fn help_hint(&self) -> Option<String> {
        match self {
            Restriction::Required => Some("This value is required".to_string()),
            Restriction::NotBlank => Some("This value may not be blank".to_string()),
            Restriction::NotEmpty => Some("This value may not be empty".to_string()),
            Restriction::Length { min, max } => Some(match (min, max) {
                (Some(min), Some(max)) => format!("Length must be between {} and {} characters", min, max),
                (Some(min), None) => format!("Length must be at least {} characters", min),
                (None, Some(max)) => format!("Length must be at most {} characters", max),
                (None, None) => return None,
            }),
            Restriction::Pattern { regex, description } => Some(match description {
                Some(d) => d.clone(),
                None => format!("Value must match the pattern {}", regex.as_str()),
            }),
            Restriction::AllowedRawValues { values, ignore_case } => Some(format!(
                "Value must be one of {}{}",
                values.join(", "),
                if *ignore_case { " (case insensitive)" } else { "" }
            )),
            Restriction::AllowedValues { values } => {
                Some(format!("Value must be one of {}", values.join(", ")))
            }
            Restriction::Range { .. } => {
                let mut hint = self.describe_range();
                hint[..1].make_ascii_uppercase();
                Some(hint)
            }
            Restriction::Port { ranges } => {
                let listed: Vec<String> = ranges.iter().map(|r| r.to_string()).collect();
                Some(format!("Port must be in the range(s) {}", listed.join(", ")))
            }
            Restriction::Path { kind, must_exist, .. } => {
                let noun = match kind {
                    PathKind::Any => "path",
                    PathKind::File => "file",
                    PathKind::Directory => "directory",
                };
                Some(if *must_exist {
                    format!("Value must be an existing {}", noun)
                } else {
                    format!("Value is a {}", noun)
                })
            }
            Restriction::Group { kind, tag } => Some(match kind {
                GroupKind::MutuallyExclusive => format!("Mutually exclusive with other '{}' options", tag),
                GroupKind::RequireOnlyOne => format!("Exactly one of the '{}' options is required", tag),
                GroupKind::RequireSome => format!("At least one of the '{}' options is required", tag),
            }),
            Restriction::Partial { indices, restriction } => restriction.help_hint().map(|hint| {
                let listed: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
                format!("{} (applies to position(s) {})", hint, listed.join(", "))
            }),
            Restriction::Custom(custom) => custom.help_hint(),
        }
    }
}

/// Rules evaluated once over the whole parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GlobalRestriction {
    /// Tokens nothing could consume are an error
    NoUnexpectedArguments,
    /// An option cut short by the end of input is an error
    NoMissingOptionValues,
}

impl GlobalRestriction {
    pub fn defaults() -> Vec<GlobalRestriction> {
        vec![
            GlobalRestriction::NoUnexpectedArguments,
            GlobalRestriction::NoMissingOptionValues,
        ]
    }

    pub fn validate(&self, state: &ParseState<'_>) -> Vec<ParseError> {
        match self {
            GlobalRestriction::NoUnexpectedArguments if !state.unparsed().is_empty() => {
                vec![ParseError::UnexpectedTokens(state.unparsed().to_vec())]
            }
            GlobalRestriction::NoMissingOptionValues => state
                .missing_values()
                .iter()
                .map(|(option, found)| ParseError::OptionMissingValue {
                    title: option.title().to_string(),
                    expected: option.effective_arity(),
                    found: *found,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Accessor, OptionScope};
    use crate::types::DefaultTypeConverter;

    fn string_option() -> OptionMetadata {
        OptionMetadata::new(
            OptionScope::Command,
            ["--name"],
            Accessor::new("Cmd.name", ValueType::String),
        )
    }

    fn int_option() -> OptionMetadata {
        OptionMetadata::new(
            OptionScope::Command,
            ["--port"],
            Accessor::new("Cmd.port", ValueType::Integer),
        )
    }

    fn post(restriction: &Restriction, option: &OptionMetadata, value: Value) -> Result<(), ParseError> {
        let mut cache = ConversionCache::default();
        restriction.post_validate(
            Target::Option(option),
            0,
            &value,
            &DefaultTypeConverter,
            &mut cache,
        )
    }

    #[test]
    fn test_not_blank() {
        let option = string_option();
        let target = Target::Option(&option);
        assert!(Restriction::NotBlank.pre_validate(target, 0, "x").is_ok());
        assert!(matches!(
            Restriction::NotBlank.pre_validate(target, 0, "   "),
            Err(ParseError::RestrictionViolated { .. })
        ));
    }

    #[test]
    fn test_length_bounds() {
        let option = string_option();
        let target = Target::Option(&option);
        let r = Restriction::Length {
            min: Some(2),
            max: Some(4),
        };
        assert!(r.pre_validate(target, 0, "ab").is_ok());
        assert!(r.pre_validate(target, 0, "a").is_err());
        assert!(r.pre_validate(target, 0, "abcde").is_err());
    }

    #[test]
    fn test_pattern() {
        let option = string_option();
        let r = Restriction::pattern("^[a-z]+$").unwrap();
        assert!(r.pre_validate(Target::Option(&option), 0, "abc").is_ok());
        let err = r.pre_validate(Target::Option(&option), 0, "ABC").unwrap_err();
        match err {
            ParseError::RestrictionViolated { title, value, .. } => {
                assert_eq!(title, "name");
                assert_eq!(value, "ABC");
            }
            other => panic!("Expected RestrictionViolated, got {:?}", other),
        }
    }

    #[test]
    fn test_allowed_raw_values_ignore_case() {
        let option = string_option();
        let r = Restriction::AllowedRawValues {
            values: vec!["Fast".into(), "Slow".into()],
            ignore_case: true,
        };
        assert!(r.pre_validate(Target::Option(&option), 0, "FAST").is_ok());
        assert!(r.pre_validate(Target::Option(&option), 0, "medium").is_err());

        let strict = Restriction::AllowedRawValues {
            values: vec!["Fast".into()],
            ignore_case: false,
        };
        assert!(strict.pre_validate(Target::Option(&option), 0, "fast").is_err());
    }

    #[test]
    fn test_allowed_values_compares_converted() {
        let option = int_option();
        let r = Restriction::AllowedValues {
            values: vec!["1".into(), "02".into()],
        };
        assert!(post(&r, &option, Value::Int(2)).is_ok());
        assert!(post(&r, &option, Value::Int(3)).is_err());
    }

    #[test]
    fn test_allowed_values_cache_reused() {
        let option = int_option();
        let r = Restriction::AllowedValues {
            values: vec!["1".into()],
        };
        let mut cache = ConversionCache::default();
        for _ in 0..2 {
            r.post_validate(
                Target::Option(&option),
                0,
                &Value::Int(1),
                &DefaultTypeConverter,
                &mut cache,
            )
            .unwrap();
        }
        assert_eq!(cache.allowed.len(), 1);
    }

    #[test]
    fn test_allowed_values_unconvertible_is_invalid_restriction() {
        let option = int_option();
        let r = Restriction::AllowedValues {
            values: vec!["one".into()],
        };
        assert!(matches!(
            post(&r, &option, Value::Int(1)),
            Err(ParseError::InvalidRestriction { .. })
        ));
    }

    #[test]
    fn test_range() {
        let option = int_option();
        let r = Restriction::range(Some(1.0), Some(10.0));
        assert!(post(&r, &option, Value::Int(1)).is_ok());
        assert!(post(&r, &option, Value::Int(10)).is_ok());
        assert!(post(&r, &option, Value::Int(11)).is_err());

        let exclusive = Restriction::Range {
            min: Some(1.0),
            max: None,
            min_inclusive: false,
            max_inclusive: true,
        };
        assert!(post(&exclusive, &option, Value::Int(1)).is_err());
    }

    #[test]
    fn test_range_on_string_is_invalid() {
        let option = string_option();
        let r = Restriction::range(Some(1.0), None);
        assert!(matches!(
            post(&r, &option, Value::Str("x".into())),
            Err(ParseError::InvalidRestriction { .. })
        ));
        assert!(matches!(
            r.check_option(&option),
            Err(MetadataError::InvalidRestriction { .. })
        ));
    }

    #[test]
    fn test_port_ranges() {
        let option = int_option();
        let r = Restriction::Port {
            ranges: vec![PortRange::USER],
        };
        assert!(post(&r, &option, Value::Int(8080)).is_ok());
        assert!(post(&r, &option, Value::Int(80)).is_err());
        assert!(post(&r, &option, Value::Int(70000)).is_err());
    }

    #[test]
    fn test_partial_applies_to_index_only() {
        let option = string_option();
        let r = Restriction::Partial {
            indices: vec![1],
            restriction: Box::new(Restriction::NotEmpty),
        };
        assert!(r.pre_validate(Target::Option(&option), 0, "").is_ok());
        assert!(r.pre_validate(Target::Option(&option), 1, "").is_err());
    }

    #[test]
    fn test_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.txt");
        std::fs::write(&file, "x").unwrap();
        let option = string_option();
        let r = Restriction::Path {
            kind: PathKind::File,
            must_exist: true,
            readable: true,
            writable: false,
            executable: false,
        };
        let target = Target::Option(&option);
        assert!(r.pre_validate(target, 0, file.to_str().unwrap()).is_ok());
        let missing = dir.path().join("missing.txt");
        assert!(r.pre_validate(target, 0, missing.to_str().unwrap()).is_err());
        assert!(r.pre_validate(target, 0, dir.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_path_writable_uses_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let future = dir.path().join("sub").join("out.txt");
        let option = string_option();
        let r = Restriction::Path {
            kind: PathKind::File,
            must_exist: false,
            readable: false,
            writable: true,
            executable: false,
        };
        assert!(r
            .pre_validate(Target::Option(&option), 0, future.to_str().unwrap())
            .is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_path_permissions_use_ancestor() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        let future = locked.join("out.txt");
        let option = string_option();
        let target = Target::Option(&option);
        let path = |readable: bool, executable: bool| Restriction::Path {
            kind: PathKind::File,
            must_exist: false,
            readable,
            writable: false,
            executable,
        };

        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o600)).unwrap();
        let result = path(false, true).pre_validate(target, 0, future.to_str().unwrap());
        assert!(matches!(result, Err(ParseError::RestrictionViolated { .. })));

        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        // Permission bits do not stop a privileged user from listing the directory.
        if std::fs::read_dir(&locked).is_err() {
            assert!(path(true, false)
                .pre_validate(target, 0, future.to_str().unwrap())
                .is_err());
        }

        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o700)).unwrap();
        assert!(path(true, true)
            .pre_validate(target, 0, future.to_str().unwrap())
            .is_ok());
    }

    #[test]
    fn test_custom_restriction() {
        #[derive(Debug)]
        struct Even;
        impl CustomRestriction for Even {
            fn post_validate(&self, value: &Value) -> Result<(), String> {
                match value.as_int() {
                    Some(i) if i % 2 == 0 => Ok(()),
                    _ => Err("value must be even".to_string()),
                }
            }
        }
        let option = int_option();
        let r = Restriction::Custom(Arc::new(Even));
        assert!(post(&r, &option, Value::Int(4)).is_ok());
        assert!(post(&r, &option, Value::Int(3)).is_err());
    }

    #[test]
    fn test_phases() {
        assert!(Restriction::Required.phases().fin);
        assert!(Restriction::NotBlank.phases().pre);
        assert!(Restriction::range(None, None).phases().post);
        let partial = Restriction::Partial {
            indices: vec![0],
            restriction: Box::new(Restriction::NotBlank),
        };
        assert!(partial.phases().pre);
    }

    #[test]
    fn test_help_hints() {
        assert_eq!(
            Restriction::range(Some(1.0), Some(5.0)).help_hint().unwrap(),
            "Value must be in the range [1, 5]"
        );
        assert!(Restriction::mutually_exclusive("verbosity")
            .help_hint()
            .unwrap()
            .contains("verbosity"));
    }

    #[test]
    fn test_partial_group_rejected() {
        let r = Restriction::Partial {
            indices: vec![0],
            restriction: Box::new(Restriction::require_some("g")),
        };
        match r.check_option(&string_option()) {
            Err(MetadataError::InvalidRestriction { title, reason }) => {
                assert_eq!(title, "name");
                assert!(reason.contains("partial"));
            }
            other => panic!("Expected InvalidRestriction, got {:?}", other),
        }
    }

    #[test]
    fn test_group_rejected_on_arguments() {
        let arguments = ArgumentsMetadata::new(["file"], Accessor::new("Cmd.files", ValueType::Path));
        assert!(Restriction::mutually_exclusive("x")
            .check_arguments(&arguments)
            .is_err());
    }
}
