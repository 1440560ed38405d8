//! Rendering parse results as JSON or as sourceable shell exports.

use crate::metadata::{GlobalMetadata, OptionMetadata};
use crate::parser::{ParseError, ParseResult};
use crate::types::Value;
use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Escape a string for safe use in a shell double-quoted context.
///
/// Escapes: $, `, \, ", and !
fn escape_shell_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '$' => escaped.push_str("\\$"),
            '`' => escaped.push_str("\\`"),
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '!' => escaped.push_str("\\!"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Convert an accessor name to a valid shell variable name.
///
/// `Remote.dry-run` becomes `REMOTE_DRY_RUN`.
fn to_shell_var_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Shell form of a value; lists are space separated.
fn shell_value(value: &Value) -> String {
    match value {
        Value::List(items) => items.iter().map(shell_value).collect::<Vec<_>>().join(" "),
        other => other.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct OptionReport<'a> {
    title: &'a str,
    names: &'a [String],
    values: &'a [Value],
}

#[derive(Debug, Serialize)]
struct ResultReport<'a> {
    program: &'a str,
    groups: Vec<&'a str>,
    command: &'a str,
    command_type: &'a str,
    options: Vec<OptionReport<'a>>,
    arguments: &'a [Value],
    unparsed: &'a [String],
    bindings: serde_json::Map<String, serde_json::Value>,
    tokens: Vec<String>,
}

/// JSON document describing a resolved invocation.
pub fn render_json(result: &ParseResult<'_>) -> Result<serde_json::Value> {
    let mut bindings = serde_json::Map::new();
    for binding in result.bindings() {
        bindings.insert(
            binding.accessor.name().to_string(),
            serde_json::to_value(&binding.value)?,
        );
    }

    let report = ResultReport {
        program: result.metadata().name(),
        groups: result.group_path(),
        command: result.command().name(),
        command_type: result.command().command_type(),
        options: result
            .options()
            .iter()
            .map(|o| OptionReport {
                title: o.option().title(),
                names: o.option().names(),
                values: o.values(),
            })
            .collect(),
        arguments: result.arguments(),
        unparsed: result.unparsed(),
        bindings,
        tokens: result.to_tokens(),
    };
    Ok(serde_json::to_value(report)?)
}

/// Shell `export` statements for a resolved invocation.
///
/// Emits `<PREFIX>COMMAND`, `<PREFIX>GROUP` when a group was named, one
/// variable per bound accessor, and `<PREFIX>UNPARSED` for leftovers.
pub fn render_env(result: &ParseResult<'_>, prefix: &str) -> String {
    let mut output = String::new();
    let mut export = |name: &str, value: &str| {
        output.push_str(&format!(
            "export {}{}=\"{}\"\n",
            prefix,
            to_shell_var_name(name),
            escape_shell_value(value)
        ));
    };

    export("command", result.command().name());
    let groups = result.group_path();
    if !groups.is_empty() {
        export("group", &groups.join(" "));
    }

    let mut bindings = result.bindings();
    // Sort for deterministic output
    bindings.sort_by(|a, b| a.accessor.name().cmp(b.accessor.name()));
    for binding in &bindings {
        export(binding.accessor.name(), &shell_value(&binding.value));
    }

    if !result.unparsed().is_empty() {
        export("unparsed", &result.unparsed().join(" "));
    }
    output
}

/// JSON document describing a parse failure.
pub fn render_error_json(error: &ParseError) -> serde_json::Value {
    let errors: Vec<String> = error.errors().iter().map(|e| e.to_string()).collect();
    serde_json::json!({
        "error": error.to_string(),
        "errors": errors,
        "options": error.option_titles(),
    })
}

#[derive(Debug, Serialize)]
struct OptionSummary<'a> {
    title: &'a str,
    names: &'a [String],
    #[serde(rename = "type")]
    value_type: String,
    arity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    hints: Vec<String>,
}

impl<'a> From<&'a OptionMetadata> for OptionSummary<'a> {
    fn from(option: &'a OptionMetadata) -> Self {
        Self {
            title: option.title(),
            names: option.names(),
            value_type: option.value_type().to_string(),
            arity: option.effective_arity(),
            description: option.description(),
            hints: option
                .restrictions()
                .iter()
                .filter_map(|r| r.help_hint())
                .collect(),
        }
    }
}

/// JSON summary of a built metadata model; hidden entries are left out.
pub fn render_metadata_json(metadata: &GlobalMetadata) -> serde_json::Value {
    let global: Vec<OptionSummary> = metadata
        .options()
        .iter()
        .filter(|o| !o.is_hidden())
        .map(OptionSummary::from)
        .collect();

    let groups: Vec<serde_json::Value> = metadata
        .groups()
        .filter(|(_, g)| !g.is_hidden())
        .map(|(id, group)| {
            let commands: Vec<&str> = group
                .commands()
                .iter()
                .map(|c| metadata.command(*c).name())
                .collect();
            let options: Vec<OptionSummary> = group
                .options()
                .iter()
                .filter(|o| !o.is_hidden())
                .map(OptionSummary::from)
                .collect();
            serde_json::json!({
                "path": metadata.group_path(id).join(" "),
                "description": group.description(),
                "default_command": group.default_command().map(|c| metadata.command(c).name()),
                "commands": commands,
                "options": options,
            })
        })
        .collect();

    let commands: Vec<serde_json::Value> = metadata
        .commands()
        .filter(|(_, c)| !c.is_hidden())
        .map(|(_, command)| {
            let options: Vec<OptionSummary> = command
                .command_options()
                .iter()
                .filter(|o| !o.is_hidden())
                .map(OptionSummary::from)
                .collect();
            serde_json::json!({
                "name": command.name(),
                "description": command.description(),
                "groups": command.groups(),
                "options": options,
                "arguments": command.arguments().map(|a| a.title()),
            })
        })
        .collect();

    serde_json::json!({
        "name": metadata.name(),
        "description": metadata.description(),
        "default_command": metadata.default_command().map(|c| metadata.command(c).name()),
        "options": global,
        "groups": groups,
        "commands": commands,
    })
}

/// Generate a temporary file holding `content`.
///
/// Returns the path to the temporary file. The file will persist
/// until it's manually deleted.
pub fn generate_output(content: &str) -> Result<PathBuf> {
    write_temp_file(content)
}

/// Generate an error output file.
///
/// When sourced, the file will print the error message to stderr and exit 1.
pub fn generate_error_output(message: &str) -> Result<PathBuf> {
    let content = generate_error_string(message);
    write_temp_file(&content)
}

/// Generate an error output as a string (for testing).
pub fn generate_error_string(message: &str) -> String {
    // Escape the message for safe use in double quotes
    let escaped = escape_shell_value(message);
    format!("echo \"cliframe: {}\" >&2\nexit 1\n", escaped)
}

/// Write content to a temporary file and return its path.
fn write_temp_file(content: &str) -> Result<PathBuf> {
    let mut file = NamedTempFile::new()?;
    file.write_all(content.as_bytes())?;
    let path = file.into_temp_path().keep()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::parser::Parser;

    const CONFIG: &str = r#"{
        "name": "git",
        "parser": {"flag_negation_prefix": "--no-"},
        "groups": [{"name": "remote", "description": "Manage remotes"}],
        "commands": [
            {"name": "add", "type": "RemoteAdd", "groups": ["remote"], "options": [
                {"names": ["-v", "--verbose"], "scope": "global", "accessor": "Git.verbose", "type": "boolean"},
                {"names": ["-t", "--track"], "accessor": "RemoteAdd.track", "multi_valued": true},
                {"names": ["--message"], "accessor": "RemoteAdd.message",
                 "restrictions": [{"kind": "not-blank"}]}
            ], "arguments": {"titles": ["name", "url"], "accessor": "RemoteAdd.remote", "arity": 2}},
            {"name": "secret", "hidden": true}
        ]
    }"#;

    fn metadata() -> GlobalMetadata {
        Config::from_json(CONFIG).unwrap().build().unwrap()
    }

    #[test]
    fn test_render_env() {
        let md = metadata();
        let result = Parser::new(&md)
            .parse(&["-v", "remote", "add", "-t", "main", "-t", "dev", "origin", "git@host:x"])
            .unwrap();
        let output = render_env(&result, "GIT_");

        assert!(output.starts_with("export GIT_COMMAND=\"add\"\n"));
        assert!(output.contains("export GIT_GROUP=\"remote\"\n"));
        assert!(output.contains("export GIT_GIT_VERBOSE=\"true\"\n"));
        assert!(output.contains("export GIT_REMOTEADD_TRACK=\"main dev\"\n"));
        assert!(output.contains("export GIT_REMOTEADD_REMOTE=\"origin git@host:x\"\n"));
        assert!(!output.contains("UNPARSED"));
    }

    #[test]
    fn test_render_env_escapes_values() {
        let md = metadata();
        let result = Parser::new(&md)
            .parse(&["remote", "add", "--message", "$var \"quoted\" `cmd` \\path!", "a", "b"])
            .unwrap();
        let output = render_env(&result, "T_");
        assert!(output.contains(
            "export T_REMOTEADD_MESSAGE=\"\\$var \\\"quoted\\\" \\`cmd\\` \\\\path\\!\""
        ));
    }

    #[test]
    fn test_render_json() {
        let md = metadata();
        let result = Parser::new(&md)
            .parse(&["remote", "add", "-t", "main", "origin", "url"])
            .unwrap();
        let json = render_json(&result).unwrap();

        assert_eq!(json["program"], "git");
        assert_eq!(json["groups"], serde_json::json!(["remote"]));
        assert_eq!(json["command"], "add");
        assert_eq!(json["command_type"], "RemoteAdd");
        assert_eq!(json["options"][0]["title"], "track");
        assert_eq!(json["options"][0]["values"], serde_json::json!(["main"]));
        assert_eq!(json["arguments"], serde_json::json!(["origin", "url"]));
        assert_eq!(json["bindings"]["RemoteAdd.track"], serde_json::json!(["main"]));
        assert_eq!(
            json["tokens"],
            serde_json::json!(["remote", "add", "-t", "main", "--", "origin", "url"])
        );
    }

    #[test]
    fn test_render_error_json() {
        let error = ParseError::Multiple(vec![
            ParseError::OptionMissing {
                title: "name".to_string(),
                names: vec!["--name".to_string()],
            },
            ParseError::GroupUnrecognized("remot".to_string()),
        ]);
        let json = render_error_json(&error);
        assert_eq!(json["errors"].as_array().unwrap().len(), 2);
        assert_eq!(json["options"], serde_json::json!(["name"]));
    }

    #[test]
    fn test_render_metadata_json_skips_hidden() {
        let md = metadata();
        let json = render_metadata_json(&md);
        let commands = json["commands"].as_array().unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0]["name"], "add");
        assert_eq!(commands[0]["arguments"], "name url");
        assert_eq!(json["options"][0]["title"], "verbose");
        assert_eq!(json["groups"][0]["path"], "remote");
        assert_eq!(json["groups"][0]["commands"], serde_json::json!(["add"]));
        let message = &commands[0]["options"][1];
        assert_eq!(message["title"], "message");
        assert_eq!(message["hints"], serde_json::json!(["This value may not be blank"]));
        assert!(commands[0]["options"][0].get("hints").is_none());
    }

    #[test]
    fn test_shell_var_name() {
        assert_eq!(to_shell_var_name("Remote.dry-run"), "REMOTE_DRY_RUN");
        assert_eq!(to_shell_var_name("count"), "COUNT");
    }

    #[test]
    fn test_generate_error_string_escapes_special_chars() {
        let output = generate_error_string("bad value: $HOME `test`");
        assert!(output.contains("echo \"cliframe: bad value: \\$HOME \\`test\\`\" >&2"));
        assert!(output.contains("exit 1"));
    }

    #[test]
    fn test_generate_output_creates_file() {
        let path = generate_output("export A=\"b\"\n").unwrap();
        assert!(path.exists());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "export A=\"b\"\n");

        // Clean up
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_generate_error_output_creates_file() {
        let path = generate_error_output("test error").unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("cliframe: test error"));
        assert!(contents.contains("exit 1"));

        std::fs::remove_file(path).unwrap();
    }
}
