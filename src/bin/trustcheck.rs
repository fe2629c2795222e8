//! trustcheck CLI
//!
//! Validate, format, diff and simulate IAM trust policies from the command line.
//!
//! Exit codes: 0 success, 1 findings/denial, 2 I/O or parse failure.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use trustcheck::iam::{AssumeRoleRequest, PolicyEngine, RequestPrincipal, WEB_IDENTITY_ACTION};
use trustcheck::{
    diff, serializer, Override, PolicyDocument, PolicyError, ValidationResult, Validator,
    ValidatorConfig,
};

#[derive(Parser, Debug)]
#[command(name = "trustcheck", version)]
#[command(about = "Validate, format, diff and simulate IAM trust policies")]
struct Cli {
    /// Validator configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug detail to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report validation findings
    Validate {
        file: PathBuf,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Output format (text, json)
        #[arg(long, default_value = "text", value_parser = parse_format)]
        format: Format,
    },

    /// Show structural changes from one policy to another
    Diff {
        old: PathBuf,
        new: PathBuf,

        /// Output format (text, json)
        #[arg(long, default_value = "text", value_parser = parse_format)]
        format: Format,
    },

    /// Print the canonical JSON form
    Fmt {
        file: PathBuf,

        /// Print even when validation finds errors
        #[arg(long)]
        force: bool,
    },

    /// Evaluate a web identity request against the policy
    Simulate {
        file: PathBuf,

        /// Identity-provider ARN that issued the token
        #[arg(long)]
        provider: String,

        /// Action requested
        #[arg(long, default_value = WEB_IDENTITY_ACTION)]
        action: String,

        /// Token claim as `key=value` (repeatable)
        #[arg(long = "claim", value_parser = parse_claim)]
        claims: Vec<(String, String)>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Text,
    Json,
}

/// Parse output format from CLI string
fn parse_format(s: &str) -> Result<Format, String> {
    match s.to_lowercase().as_str() {
        "text" => Ok(Format::Text),
        "json" => Ok(Format::Json),
        _ => Err(format!("Invalid format '{}'. Valid options: text, json", s)),
    }
}

/// Parse a `key=value` claim from CLI string
fn parse_claim(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid claim '{}'. Expected key=value", s)),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Validate {
            file,
            strict,
            format,
        } => {
            let config = if strict { config.with_strict(true) } else { config };
            let doc = read_document(&file, &config)?;
            let result = Validator::new(config).validate(&doc);
            print_findings(&file, &result, format)?;
            Ok(exit_code(!result.has_errors()))
        }

        Command::Diff { old, new, format } => {
            let a = read_document(&old, &config)?;
            let b = read_document(&new, &config)?;
            let changes = diff::diff(&a, &b);
            info!("{} change(s) between {:?} and {:?}", changes.len(), old, new);
            match format {
                Format::Text => print!("{}", diff::render(&changes)),
                Format::Json => println!("{}", serde_json::to_string_pretty(&changes)?),
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Fmt { file, force } => {
            let doc = read_document(&file, &config)?;
            let validator = Validator::new(config);
            let mode = if force { Override::Force } else { Override::Refuse };

            match serializer::serialize_draft(&doc, &validator, mode) {
                Ok(bytes) => {
                    std::io::stdout()
                        .write_all(&bytes)
                        .context("writing to stdout")?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(PolicyError::NotValidated { .. }) => {
                    report_refusal(&file, &validator.validate(&doc));
                    Ok(ExitCode::from(1))
                }
                Err(e) => Err(e.into()),
            }
        }

        Command::Simulate {
            file,
            provider,
            action,
            claims,
        } => {
            let doc = read_document(&file, &config)?;
            let validator = Validator::new(config);
            let policy = match validator.seal(&doc) {
                Ok(policy) => policy,
                Err(PolicyError::NotValidated { .. }) => {
                    report_refusal(&file, &validator.validate(&doc));
                    return Ok(ExitCode::from(1));
                }
                Err(e) => return Err(e.into()),
            };

            let request = claims.into_iter().fold(
                AssumeRoleRequest::new(RequestPrincipal::Federated(provider), action),
                |request, (key, value)| request.with_claim(key, value),
            );
            debug!("Simulating {:?}", request);

            let decision = PolicyEngine::new(1).evaluate(&policy, &request);
            println!("{}", decision);
            Ok(exit_code(decision.is_allowed()))
        }
    }
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn load_config(path: Option<&Path>) -> Result<ValidatorConfig> {
    match path {
        Some(path) => ValidatorConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(ValidatorConfig::default()),
    }
}

fn read_document(path: &Path, config: &ValidatorConfig) -> Result<PolicyDocument> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serializer::deserialize_with(&bytes, config.parse_options())
        .with_context(|| format!("parsing {}", path.display()))
}

fn print_findings(file: &Path, result: &ValidationResult, format: Format) -> Result<()> {
    match format {
        Format::Text => {
            for finding in result.findings() {
                println!("{}: {}", file.display(), finding);
            }
            println!(
                "{}: {} error(s), {} warning(s)",
                file.display(),
                result.error_count(),
                result.warning_count()
            );
        }
        Format::Json => {
            let report = json!({
                "file": file.display().to_string(),
                "valid": !result.has_errors(),
                "errors": result.error_count(),
                "warnings": result.warning_count(),
                "findings": result.findings(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn report_refusal(file: &Path, result: &ValidationResult) {
    for finding in result.errors() {
        eprintln!("{}: {}", file.display(), finding);
    }
    eprintln!(
        "{}: refusing to continue with {} validation error(s)",
        file.display(),
        result.error_count()
    );
}
