//! cliframe - parse command lines against a declarative JSON schema.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cliframe::{
    generate_error_output, generate_output, render_env, render_error_json, render_json,
    render_metadata_json, AliasResolver, Config, Parser as CommandLineParser,
};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

/// Parse command lines against a declarative command schema.
#[derive(Parser, Debug)]
#[command(name = "cliframe", version, about, disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Resolved invocation as a JSON document
    Json,
    /// Shell export statements
    Env,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse arguments and print the resolved invocation
    Parse {
        /// JSON schema, or @path to a file holding it
        #[arg(long)]
        schema: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,

        /// Environment variable prefix for env output (overrides schema)
        #[arg(long)]
        prefix: Option<String>,

        /// Write the output to a temporary file and print its path
        #[arg(long)]
        to_file: bool,

        /// Arguments to parse
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Validate a schema and print a summary of the built model
    Check {
        /// JSON schema, or @path to a file holding it
        #[arg(long)]
        schema: String,
    },

    /// Print the alias-expanded arguments
    Aliases {
        /// JSON schema, or @path to a file holding it
        #[arg(long)]
        schema: String,

        /// User alias file (overrides schema)
        #[arg(long)]
        alias_file: Option<PathBuf>,

        /// Arguments to expand
        #[arg(last = true)]
        args: Vec<String>,
    },
}

/// Read a schema given inline or as `@path`.
fn load_schema(schema: &str) -> Result<Config> {
    let json = match schema.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read schema file '{}'", path))?,
        None => schema.to_string(),
    };
    Config::from_json(&json).context("failed to parse schema JSON")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn emit(content: &str, to_file: bool) -> Result<()> {
    if to_file {
        let path = generate_output(content).context("failed to generate output file")?;
        println!("{}", path.display());
    } else {
        print!("{}", content);
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Parse {
            schema,
            format,
            prefix,
            to_file,
            args,
        } => {
            let cfg = load_schema(&schema)?;
            let metadata = cfg.build().context("invalid schema")?;
            let effective_prefix = prefix.as_deref().unwrap_or_else(|| cfg.effective_prefix());

            let parsed = match CommandLineParser::new(&metadata).parse(args.as_slice()) {
                Ok(parsed) => parsed,
                Err(err) if to_file && format == Format::Env => {
                    // Sourcing the file reports the error and exits the caller.
                    let path = generate_error_output(&err.to_string())
                        .context("failed to generate error output file")?;
                    println!("{}", path.display());
                    return Ok(());
                }
                Err(err) if format == Format::Json => {
                    println!("{}", serde_json::to_string_pretty(&render_error_json(&err))?);
                    return Err(err).context("failed to parse arguments");
                }
                Err(err) => return Err(err).context("failed to parse arguments"),
            };

            let content = match format {
                Format::Json => {
                    let json = render_json(&parsed).context("failed to render result")?;
                    format!("{}\n", serde_json::to_string_pretty(&json)?)
                }
                Format::Env => render_env(&parsed, effective_prefix),
            };
            emit(&content, to_file)?;
        }
        Commands::Check { schema } => {
            let cfg = load_schema(&schema)?;
            let metadata = cfg.build().context("invalid schema")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&render_metadata_json(&metadata))?
            );
        }
        Commands::Aliases {
            schema,
            alias_file,
            args,
        } => {
            let mut cfg = load_schema(&schema)?;
            if alias_file.is_some() {
                cfg.parser.alias_file = alias_file;
            }
            let metadata = cfg.build().context("invalid schema")?;
            let resolver = AliasResolver::new(&metadata).context("failed to load aliases")?;
            let expanded = resolver.expand(args.as_slice()).context("failed to expand aliases")?;
            println!("{}", serde_json::to_string(&expanded)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const SCHEMA: &str = r#"{"name":"test","commands":[{"name":"run"}]}"#;

    #[test]
    fn test_parse_subcommand_parses_schema() {
        let cli = Cli::try_parse_from(["cliframe", "parse", "--schema", SCHEMA, "--"]).unwrap();

        match cli.command {
            Commands::Parse {
                schema,
                format,
                prefix,
                to_file,
                args,
            } => {
                assert_eq!(schema, SCHEMA);
                assert_eq!(format, Format::Json);
                assert!(prefix.is_none());
                assert!(!to_file);
                assert!(args.is_empty());
            }
            _ => panic!("Expected Parse command"),
        }
    }

    #[test]
    fn test_parse_subcommand_parses_format_and_args() {
        let cli = Cli::try_parse_from([
            "cliframe", "parse", "--schema", SCHEMA, "--format", "env", "--to-file", "--",
            "run", "-v", "--output", "file.txt",
        ])
        .unwrap();

        match cli.command {
            Commands::Parse {
                format,
                to_file,
                args,
                ..
            } => {
                assert_eq!(format, Format::Env);
                assert!(to_file);
                assert_eq!(args, vec!["run", "-v", "--output", "file.txt"]);
            }
            _ => panic!("Expected Parse command"),
        }
    }

    #[test]
    fn test_parse_subcommand_requires_schema() {
        let result = Cli::try_parse_from(["cliframe", "parse", "--"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_subcommand_rejects_unknown_format() {
        let result = Cli::try_parse_from(["cliframe", "parse", "--schema", SCHEMA, "--format", "xml"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_check_subcommand() {
        let cli = Cli::try_parse_from(["cliframe", "check", "--schema", "@schema.json"]).unwrap();
        match cli.command {
            Commands::Check { schema } => assert_eq!(schema, "@schema.json"),
            _ => panic!("Expected Check command"),
        }
    }

    #[test]
    fn test_aliases_subcommand() {
        let cli = Cli::try_parse_from([
            "cliframe",
            "aliases",
            "--schema",
            SCHEMA,
            "--alias-file",
            "/tmp/aliases",
            "--",
            "co",
        ])
        .unwrap();
        match cli.command {
            Commands::Aliases {
                alias_file, args, ..
            } => {
                assert_eq!(alias_file, Some(PathBuf::from("/tmp/aliases")));
                assert_eq!(args, vec!["co"]);
            }
            _ => panic!("Expected Aliases command"),
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        let result = Cli::try_parse_from(["cliframe"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_help() {
        // Verify the command can generate help without panicking
        Cli::command().debug_assert();
    }

    #[test]
    fn test_load_schema_inline() {
        let cfg = load_schema(SCHEMA).unwrap();
        assert_eq!(cfg.name, "test");
    }

    #[test]
    fn test_load_schema_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, SCHEMA.as_bytes()).unwrap();
        let cfg = load_schema(&format!("@{}", file.path().display())).unwrap();
        assert_eq!(cfg.commands.len(), 1);
    }

    #[test]
    fn test_load_schema_missing_file() {
        assert!(load_schema("@/nonexistent/schema.json").is_err());
    }

    #[test]
    fn test_prefix_priority_cli_overrides_schema() {
        let schema = r#"{"name":"test","prefix":"SCHEMA_","commands":[{"name":"run"}]}"#;
        let cli =
            Cli::try_parse_from(["cliframe", "parse", "--schema", schema, "--prefix", "CLI_", "--"])
                .unwrap();

        match cli.command {
            Commands::Parse { schema, prefix, .. } => {
                let cfg = Config::from_json(&schema).unwrap();
                let effective = prefix.as_deref().unwrap_or_else(|| cfg.effective_prefix());
                assert_eq!(effective, "CLI_");
            }
            _ => panic!("Expected Parse command"),
        }
    }
}
