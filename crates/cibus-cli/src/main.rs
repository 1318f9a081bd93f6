mod logging;
mod settings;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use cibus_blueprint::{ValidationError, blueprint_json_schema, validate};
use cibus_generate::{GenerationEngine, GenerationError, create_output};
use logging::init_logging;
use serde_json::Value;
use settings::{CliSettings, load_settings};
use thiserror::Error;

#[derive(Debug, Error)]
enum CliError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("settings error: {0}")]
    Settings(#[from] toml::de::Error),
    #[error("logging error: {0}")]
    Logging(String),
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Parser, Debug)]
#[command(name = "cibus", version, about = "Fixed-width synthetic record generator")]
struct Cli {
    /// Settings file (defaults to ./cibus.toml when present).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a blueprint and report the corrections applied.
    Validate(ValidateArgs),
    /// Generate fixed-width records from a blueprint.
    Generate(GenerateArgs),
    /// Print the JSON Schema for blueprint documents.
    Schema(SchemaArgs),
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Blueprint JSON file.
    blueprint: PathBuf,
    /// Write the sanitized blueprint here.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Blueprint JSON file.
    blueprint: PathBuf,
    /// Output file for the records.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Rows to generate; defaults to the blueprint's scaled row count.
    #[arg(long)]
    rows: Option<u64>,
    /// Worker threads.
    #[arg(long)]
    workers: Option<usize>,
    /// Run report path; defaults to `<out>.report.json`.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    /// Write the schema here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;
    init_logging(cli.log_json || settings.log_json)?;

    match cli.command {
        Command::Validate(args) => run_validate(args),
        Command::Generate(args) => run_generate(args, &settings),
        Command::Schema(args) => run_schema(args),
    }
}

fn read_blueprint(path: &Path) -> Result<Value, CliError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn run_validate(args: ValidateArgs) -> Result<(), CliError> {
    let raw = read_blueprint(&args.blueprint)?;
    let validated = validate(&raw)?;
    tracing::info!(
        event = "blueprint_validated",
        path = %args.blueprint.display(),
        fields = validated.fields.len(),
        record_length = validated.record_length(),
        warnings = validated.warnings.len()
    );

    if let Some(out) = args.out {
        let sanitized = validated.to_json()?;
        std::fs::write(&out, serde_json::to_vec_pretty(&sanitized)?)?;
        tracing::info!(event = "sanitized_blueprint_written", path = %out.display());
    }
    Ok(())
}

fn run_generate(args: GenerateArgs, settings: &CliSettings) -> Result<(), CliError> {
    let out = args
        .out
        .or_else(|| settings.default_output.clone())
        .ok_or_else(|| {
            CliError::InvalidConfig("an output path is required (--out or default_output)".to_string())
        })?;
    let options = settings.generate_options(args.workers);
    if options.workers == 0 {
        return Err(CliError::InvalidConfig("workers must be at least 1".to_string()));
    }

    let raw = read_blueprint(&args.blueprint)?;
    let validated = validate(&raw)?;
    let engine = GenerationEngine::new(options);

    let mut file = create_output(&out)?;
    let report = engine.run(&validated, args.rows, &mut file)?;

    let report_path = args.report.unwrap_or_else(|| report_path_for(&out));
    std::fs::write(&report_path, serde_json::to_vec_pretty(&report)?)?;
    tracing::info!(
        event = "run_finished",
        run_id = %report.run_id,
        rows_written = report.rows_written,
        output = %out.display(),
        report = %report_path.display()
    );
    Ok(())
}

fn run_schema(args: SchemaArgs) -> Result<(), CliError> {
    let schema = serde_json::to_string_pretty(&blueprint_json_schema())?;
    match args.out {
        Some(path) => std::fs::write(path, schema)?,
        None => println!("{schema}"),
    }
    Ok(())
}

fn report_path_for(out: &Path) -> PathBuf {
    let mut name = out.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".report.json");
    out.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_generate_flags() {
        let cli = Cli::try_parse_from([
            "cibus",
            "generate",
            "blueprints/accounts.blueprint.json",
            "--out",
            "out/accounts.dat",
            "--rows",
            "50",
            "--workers",
            "4",
            "--log-json",
        ])
        .unwrap();
        assert!(cli.log_json);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate command");
        };
        assert_eq!(args.rows, Some(50));
        assert_eq!(args.workers, Some(4));
        assert_eq!(args.out, Some(PathBuf::from("out/accounts.dat")));
    }

    #[test]
    fn report_sits_next_to_output() {
        assert_eq!(
            report_path_for(Path::new("out/accounts.dat")),
            PathBuf::from("out/accounts.dat.report.json")
        );
    }

    #[test]
    fn generate_writes_records_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("accounts.dat");
        let blueprint =
            Path::new(env!("CARGO_MANIFEST_DIR")).join("../../blueprints/accounts.blueprint.json");
        let args = GenerateArgs {
            blueprint,
            out: Some(out.clone()),
            rows: Some(12),
            workers: Some(2),
            report: None,
        };
        run_generate(args, &CliSettings::default()).unwrap();

        let records = std::fs::read(&out).unwrap();
        assert_eq!(records.len(), 12 * 41);
        assert_eq!(records.iter().filter(|byte| **byte == b'\n').count(), 12);
        let report: Value =
            serde_json::from_str(&std::fs::read_to_string(report_path_for(&out)).unwrap()).unwrap();
        assert_eq!(report["rows_written"], 12);
    }
}
