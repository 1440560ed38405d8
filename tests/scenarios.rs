//! End-to-end parses against metadata built from the builder API and JSON schemas.

use cliframe::{
    Accessor, CommandFactory, CommandMetadata, Config, GlobalMetadata, GlobalMetadataBuilder,
    OptionMetadata, OptionScope, ParseError, ParseResult, Parser, Restriction, Value, ValueType,
};
use std::io::Write;

fn from_json(json: &str) -> GlobalMetadata {
    Config::from_json(json).unwrap().build().unwrap()
}

#[test]
fn test_single_dash_long_names() {
    let run = CommandMetadata::builder("run")
        .option(
            OptionMetadata::new(
                OptionScope::Command,
                ["-log", "-verbose"],
                Accessor::new("Run.verbose", ValueType::Integer),
            )
            .with_arity(1),
        )
        .option(
            OptionMetadata::new(
                OptionScope::Command,
                ["-debug"],
                Accessor::new("Run.debug", ValueType::Boolean),
            )
            .with_arity(0),
        )
        .build()
        .unwrap();
    let md = GlobalMetadataBuilder::new("prog")
        .command(run)
        .default_command("run")
        .build()
        .unwrap();

    let result = Parser::new(&md).parse(&["-debug", "-log", "2"]).unwrap();
    assert_eq!(result.command().name(), "run");
    assert_eq!(result.value("debug"), Some(&Value::Bool(true)));
    assert_eq!(result.value("verbose"), Some(&Value::Int(2)));

    let bindings: Vec<(&str, Value)> = result
        .bindings()
        .into_iter()
        .map(|b| (b.accessor.name(), b.value))
        .collect();
    assert!(bindings.contains(&("Run.verbose", Value::Int(2))));
    assert!(bindings.contains(&("Run.debug", Value::Bool(true))));
}

#[test]
fn test_required_arguments_missing() {
    let md = from_json(
        r#"{"name": "cp", "default_command": "copy", "commands": [{"name": "copy",
            "arguments": {"titles": ["source", "target"],
                          "restrictions": [{"kind": "required"}]}}]}"#,
    );
    let err = Parser::new(&md).parse::<&str>(&[]).unwrap_err();
    assert_eq!(
        err,
        ParseError::ArgumentsMissing {
            title: "source target".to_string()
        }
    );
}

#[test]
fn test_fixed_arity_requires_all_arguments() {
    let md = from_json(
        r#"{"name": "cp", "commands": [{"name": "cp",
            "arguments": {"titles": ["source", "target"], "arity": 2}}]}"#,
    );
    let err = Parser::new(&md).parse(&["cp"]).unwrap_err();
    assert_eq!(
        err,
        ParseError::TooFewArguments {
            title: "source target".to_string(),
            expected: 2,
            found: 0,
        }
    );
    assert!(Parser::new(&md).parse(&["cp", "a", "b"]).is_ok());
}

const REMOTE: &str = r#"{
    "name": "git",
    "groups": [
        {"name": "remote", "default_command": "list"},
        {"name": "remote show", "default_command": "show"}
    ],
    "commands": [
        {"name": "list", "groups": ["remote"]},
        {"name": "show", "options": [{"names": ["-n"], "type": "boolean"}]},
        {"name": "prune", "groups": ["remote show"]}
    ]
}"#;

#[test]
fn test_sub_group_default_command() {
    let md = from_json(REMOTE);
    let result = Parser::new(&md).parse(&["remote", "show"]).unwrap();
    assert_eq!(result.command().name(), "show");
    assert_eq!(result.group_path(), vec!["remote", "show"]);

    let result = Parser::new(&md).parse(&["remote", "show", "prune"]).unwrap();
    assert_eq!(result.command().name(), "prune");

    let result = Parser::new(&md).parse(&["remote"]).unwrap();
    assert_eq!(result.command().name(), "list");
}

#[test]
fn test_unknown_group_at_top_level() {
    let md = from_json(REMOTE);
    let err = Parser::new(&md).parse(&["remot"]).unwrap_err();
    assert_eq!(err, ParseError::GroupUnrecognized("remot".to_string()));
}

#[test]
fn test_mutually_exclusive_options() {
    let md = from_json(
        r#"{"name": "prog", "commands": [{"name": "run", "options": [
            {"names": ["-verbose"], "type": "boolean",
             "restrictions": [{"kind": "mutually-exclusive", "tag": "output"}]},
            {"names": ["-quiet"], "type": "boolean",
             "restrictions": [{"kind": "mutually-exclusive", "tag": "output"}]}
        ]}]}"#,
    );

    let err = Parser::new(&md)
        .parse(&["run", "-verbose", "-quiet"])
        .unwrap_err();
    match err {
        ParseError::OptionGroupViolated { tag, options, .. } => {
            assert_eq!(tag, "output");
            assert!(options.contains(&"verbose".to_string()));
            assert!(options.contains(&"quiet".to_string()));
        }
        other => panic!("Expected OptionGroupViolated, got {:?}", other),
    }

    assert!(Parser::new(&md).parse(&["run", "-quiet"]).is_ok());
}

#[test]
fn test_collect_all_reports_every_error() {
    let md = from_json(
        r#"{"name": "prog", "parser": {"error_handling": "collect-all"},
            "commands": [{"name": "serve", "options": [
                {"names": ["--port"], "type": "integer",
                 "restrictions": [{"kind": "port", "ranges": ["user"]}]},
                {"names": ["--host"], "restrictions": [{"kind": "required"}]}
            ]}]}"#,
    );

    let err = Parser::new(&md)
        .parse(&["serve", "--port", "80", "extra"])
        .unwrap_err();
    let errors = err.errors();
    assert_eq!(errors.len(), 3);
    assert!(matches!(errors[0], ParseError::RestrictionViolated { .. }));
    assert!(matches!(errors[1], ParseError::OptionMissing { .. }));
    assert!(matches!(errors[2], ParseError::UnexpectedTokens(_)));
}

#[test]
fn test_user_alias_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# personal aliases").unwrap();
    writeln!(file, "alias.ls = list -v").unwrap();
    let schema = format!(
        r#"{{"name": "prog", "parser": {{"alias_file": {}}},
            "commands": [{{"name": "list", "options": [{{"names": ["-v"], "type": "boolean"}}]}}]}}"#,
        serde_json::to_string(&file.path()).unwrap()
    );
    let md = from_json(&schema);

    let result = Parser::new(&md).parse(&["ls"]).unwrap();
    assert_eq!(result.command().name(), "list");
    assert_eq!(result.value("-v"), Some(&Value::Bool(true)));
}

#[derive(Debug, PartialEq)]
enum Action {
    Copy { source: String, target: String, force: bool },
}

#[derive(Debug, PartialEq)]
enum FactoryError {
    Parse(ParseError),
    Unsupported(String),
}

impl From<ParseError> for FactoryError {
    fn from(error: ParseError) -> Self {
        FactoryError::Parse(error)
    }
}

struct ActionFactory;

impl CommandFactory for ActionFactory {
    type Command = Action;
    type Error = FactoryError;

    fn create(&self, result: &ParseResult<'_>) -> Result<Action, FactoryError> {
        match result.command().command_type() {
            "Copy" => {
                let [source, target] = result.arguments() else {
                    return Err(FactoryError::Unsupported("copy needs two paths".to_string()));
                };
                Ok(Action::Copy {
                    source: source.to_string(),
                    target: target.to_string(),
                    force: result
                        .value("force")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                })
            }
            other => Err(FactoryError::Unsupported(other.to_string())),
        }
    }
}

#[test]
fn test_command_factory() {
    let md = from_json(
        r#"{"name": "fs", "commands": [
            {"name": "cp", "type": "Copy",
             "options": [{"names": ["-f", "--force"], "type": "boolean"}],
             "arguments": {"titles": ["source", "target"], "arity": 2}},
            {"name": "rm", "type": "Remove"}
        ]}"#,
    );
    let parser = Parser::new(&md);

    assert_eq!(
        parser.parse_with(&ActionFactory, &["cp", "-f", "a", "b"]),
        Ok(Action::Copy {
            source: "a".to_string(),
            target: "b".to_string(),
            force: true
        })
    );
    assert_eq!(
        parser.parse_with(&ActionFactory, &["rm"]),
        Err(FactoryError::Unsupported("Remove".to_string()))
    );
    assert!(matches!(
        parser.parse_with(&ActionFactory, &["mv"]),
        Err(FactoryError::Parse(ParseError::CommandUnrecognized { .. }))
    ));
}

#[test]
fn test_builder_restrictions() {
    let serve = CommandMetadata::builder("serve")
        .option(
            OptionMetadata::new(
                OptionScope::Command,
                ["--workers"],
                Accessor::new("Serve.workers", ValueType::Integer),
            )
            .with_restriction(Restriction::range(Some(1.0), Some(64.0))),
        )
        .build()
        .unwrap();
    let md = GlobalMetadataBuilder::new("srv").command(serve).build().unwrap();
    let parser = Parser::new(&md);

    assert_eq!(
        parser.parse(&["serve", "--workers", "8"]).unwrap().value("workers"),
        Some(&Value::Int(8))
    );
    assert!(matches!(
        parser.parse(&["serve", "--workers", "0"]),
        Err(ParseError::RestrictionViolated { .. })
    ));
    assert!(matches!(
        parser.parse(&["serve", "--workers", "many"]),
        Err(ParseError::IllegalValue { .. })
    ));
}
