//! Reconciling option definitions contributed by several declarations.
//!
//! Two entry points:
//!
//! - [`merge_option_set`] folds structurally identical options from
//!   unrelated commands into one option per definition, so a value parsed
//!   once reaches every accessor that declared it.
//! - [`override_option_set`] resolves one command's hierarchy, where a
//!   derived declaration may override its parent's option of the same names.

use crate::metadata::{MetadataError, OptionMetadata};
use std::collections::HashMap;

fn first_accessor(option: &OptionMetadata) -> String {
    option
        .accessors()
        .first()
        .map(|a| a.name().to_string())
        .unwrap_or_else(|| option.title().to_string())
}

/// Merge options by structural equality and reject name clashes.
///
/// The result keeps the first-seen order. Merged definitions carry the
/// union of their accessors and restrictions. Two distinct definitions that
/// share a name, or equal definitions bound to different value types, fail
/// with [`MetadataError::ConflictingOptionDefinition`].
pub fn merge_option_set(options: Vec<OptionMetadata>) -> Result<Vec<OptionMetadata>, MetadataError> {
    let mut merged: Vec<OptionMetadata> = Vec::new();

    for option in options {
        match merged.iter_mut().find(|m| m.same_definition(&option)) {
            Some(existing) if existing.value_type() != option.value_type() => {
                return Err(MetadataError::ConflictingOptionDefinition {
                    name: option
                        .names()
                        .first()
                        .cloned()
                        .unwrap_or_else(|| option.title().to_string()),
                    first: first_accessor(existing),
                    second: first_accessor(&option),
                });
            }
            Some(existing) => {
                existing.absorb_accessors(&option);
                existing.absorb_restrictions(&option);
            }
            None => merged.push(option),
        }
    }

    let mut owners: HashMap<&str, usize> = HashMap::new();
    for (index, option) in merged.iter().enumerate() {
        for name in option.names() {
            if let Some(&other) = owners.get(name.as_str()) {
                return Err(MetadataError::ConflictingOptionDefinition {
                    name: name.clone(),
                    first: first_accessor(&merged[other]),
                    second: first_accessor(option),
                });
            }
            owners.insert(name.as_str(), index);
        }
    }

    Ok(merged)
}

/// Resolve options declared across a command hierarchy.
///
/// `options` must be ordered from the most derived declaration to the least
/// derived one: when two options carry the same name set, the one seen later
/// is the parent and the one recorded earlier is the child.
pub fn override_option_set(
    options: Vec<OptionMetadata>,
) -> Result<Vec<OptionMetadata>, MetadataError> {
    let mut resolved: Vec<OptionMetadata> = Vec::new();

    for option in options {
        let names = option.name_set();
        let mut slot = None;

        for (index, existing) in resolved.iter().enumerate() {
            let existing_names = existing.name_set();
            if existing_names.is_disjoint(&names) {
                continue;
            }
            if existing_names != names {
                return Err(MetadataError::OverlappingOptionDefinition {
                    first: existing.to_string(),
                    second: option.to_string(),
                });
            }
            slot = Some(index);
            break;
        }

        let Some(index) = slot else {
            resolved.push(option);
            continue;
        };

        if resolved[index].same_definition(&option) {
            // Same option injected twice through composition.
            resolved[index].absorb_accessors(&option);
            continue;
        }

        let merged = override_option(&option, &resolved[index])?;
        resolved[index] = merged;
    }

    Ok(resolved)
}

/// Apply `child` over `parent`.
pub fn override_option(
    parent: &OptionMetadata,
    child: &OptionMetadata,
) -> Result<OptionMetadata, MetadataError> {
    if parent.is_sealed() {
        return Err(MetadataError::SealedOptionOverride {
            title: parent.title().to_string(),
            child: child.to_string(),
        });
    }
    if !child.is_override() {
        return Err(MetadataError::UndeclaredOverride {
            title: child.title().to_string(),
            parent: parent.to_string(),
        });
    }
    if !child.value_type().is_narrowing_of(parent.value_type()) {
        return Err(MetadataError::IncompatibleOptionType {
            title: child.title().to_string(),
            parent: parent.value_type().clone(),
            child: child.value_type().clone(),
        });
    }

    tracing::debug!(
        option = child.title(),
        parent = %first_accessor(parent),
        child = %first_accessor(child),
        "option overridden"
    );
    Ok(OptionMetadata::overridden_by(parent, child))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Accessor, OptionScope};
    use crate::restrictions::Restriction;
    use crate::types::ValueType;

    fn opt(names: &[&str], accessor: &str, ty: ValueType) -> OptionMetadata {
        OptionMetadata::new(
            OptionScope::Command,
            names.iter().copied(),
            Accessor::new(accessor, ty),
        )
    }

    #[test]
    fn test_merge_identical_unions_accessors() {
        let a = opt(&["-v"], "A.verbose", ValueType::Boolean).with_title("verbose");
        let b = opt(&["-v"], "B.verbose", ValueType::Boolean).with_title("verbose");
        let merged = merge_option_set(vec![a, b]).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].accessors().len(), 2);
    }

    #[test]
    fn test_merge_same_option_twice_is_idempotent() {
        let a = opt(&["-v"], "A.verbose", ValueType::Boolean);
        let merged = merge_option_set(vec![a.clone(), a.clone()]).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].accessors(), a.accessors());
    }

    #[test]
    fn test_merge_conflicting_names() {
        let a = opt(&["-v"], "A.verbose", ValueType::Boolean);
        let b = opt(&["-v", "--version"], "B.version", ValueType::Boolean);
        let err = merge_option_set(vec![a, b]).unwrap_err();
        match err {
            MetadataError::ConflictingOptionDefinition {
                name,
                first,
                second,
            } => {
                assert_eq!(name, "-v");
                assert_eq!(first, "A.verbose");
                assert_eq!(second, "B.version");
            }
            other => panic!("Expected ConflictingOptionDefinition, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_rejects_value_type_mismatch() {
        let a = opt(&["-n"], "A.count", ValueType::Boolean);
        let b = opt(&["-n"], "B.count", ValueType::Integer);
        match merge_option_set(vec![a, b]) {
            Err(MetadataError::ConflictingOptionDefinition { name, first, second }) => {
                assert_eq!(name, "-n");
                assert_eq!(first, "A.count");
                assert_eq!(second, "B.count");
            }
            other => panic!("Expected ConflictingOptionDefinition, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_unions_restrictions() {
        let a = opt(&["--name"], "A.name", ValueType::String).with_restriction(Restriction::NotBlank);
        let b = opt(&["--name"], "B.name", ValueType::String)
            .with_restriction(Restriction::NotBlank)
            .with_restriction(Restriction::Length {
                min: None,
                max: Some(8),
            });
        let merged = merge_option_set(vec![a, b]).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged[0].restrictions(),
            &[
                Restriction::NotBlank,
                Restriction::Length {
                    min: None,
                    max: Some(8)
                }
            ]
        );
    }

    #[test]
    fn test_merge_disjoint_options_kept() {
        let a = opt(&["-a"], "X.a", ValueType::Boolean);
        let b = opt(&["-b"], "X.b", ValueType::Boolean);
        assert_eq!(merge_option_set(vec![a, b]).unwrap().len(), 2);
    }

    #[test]
    fn test_override_requires_declaration() {
        let child = opt(&["-v"], "Child.verbose", ValueType::Integer).with_title("level");
        let parent = opt(&["-v"], "Base.verbose", ValueType::Integer);
        let err = override_option_set(vec![child, parent]).unwrap_err();
        assert!(matches!(err, MetadataError::UndeclaredOverride { .. }));
    }

    #[test]
    fn test_override_sealed_parent() {
        let child = opt(&["-v"], "Child.verbose", ValueType::Integer)
            .with_title("level")
            .overriding();
        let parent = opt(&["-v"], "Base.verbose", ValueType::Integer).sealed();
        let err = override_option_set(vec![child, parent]).unwrap_err();
        assert!(matches!(err, MetadataError::SealedOptionOverride { .. }));
    }

    #[test]
    fn test_override_incompatible_type() {
        let child = opt(&["-v"], "Child.verbose", ValueType::String).overriding();
        let parent = opt(&["-v"], "Base.verbose", ValueType::Integer);
        let err = override_option_set(vec![child, parent]).unwrap_err();
        assert!(matches!(
            err,
            MetadataError::IncompatibleOptionType {
                parent: ValueType::Integer,
                child: ValueType::String,
                ..
            }
        ));
    }

    #[test]
    fn test_override_success_merges() {
        let child = opt(&["-l", "--level"], "Child.level", ValueType::Integer)
            .with_title("level")
            .overriding();
        let parent = opt(&["--level", "-l"], "Base.level", ValueType::Long)
            .with_description("verbosity level")
            .with_restriction(Restriction::Required);
        let resolved = override_option_set(vec![child, parent]).unwrap();

        assert_eq!(resolved.len(), 1);
        let merged = &resolved[0];
        assert_eq!(merged.title(), "level");
        assert_eq!(merged.description(), Some("verbosity level"));
        assert!(merged.is_override());
        assert_eq!(merged.restrictions().len(), 1);
        let accessors: Vec<&str> = merged.accessors().iter().map(|a| a.name()).collect();
        assert_eq!(accessors, vec!["Child.level", "Base.level"]);
    }

    #[test]
    fn test_override_duplicate_definition_merges() {
        let a = opt(&["-v"], "Mixin.verbose", ValueType::Boolean).with_title("verbose");
        let b = opt(&["-v"], "Base.verbose", ValueType::Boolean).with_title("verbose");
        let resolved = override_option_set(vec![a, b]).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].accessors().len(), 2);
    }

    #[test]
    fn test_override_partial_overlap_fails() {
        let a = opt(&["-v", "--verbose"], "A.verbose", ValueType::Boolean).overriding();
        let b = opt(&["-v", "--version"], "B.version", ValueType::Boolean);
        let err = override_option_set(vec![a, b]).unwrap_err();
        assert!(matches!(err, MetadataError::OverlappingOptionDefinition { .. }));
    }

    #[test]
    fn test_override_keeps_unrelated_options() {
        let a = opt(&["-a"], "A.a", ValueType::Boolean);
        let b = opt(&["-b"], "B.b", ValueType::Boolean);
        let resolved = override_option_set(vec![a, b]).unwrap();
        let titles: Vec<&str> = resolved.iter().map(|o| o.title()).collect();
        assert_eq!(titles, vec!["a", "b"]);
    }
}
