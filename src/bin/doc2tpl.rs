use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use table_templater::{
    DEFAULT_BASE_URL, DEFAULT_MODEL, Diagnostic, InferenceConfig, MatchReport, OpenAiClient,
    PlaceholderStyle, ReplaceReport, TemplateOptions, inspect_tables, match_file, replace_file,
    template_file,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "doc2tpl",
    version,
    about = "Turn filled-in document tables into reusable templates"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the unique tables found in a document as JSON.
    Tables(TablesArgs),
    /// Match table fields against a vocabulary and write match batches.
    Match(MatchArgs),
    /// Apply stored match batches to a document.
    Replace(ReplaceArgs),
    /// Match and replace in one run.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct TablesArgs {
    /// Input HTML or JSON document.
    #[arg(short, long)]
    input: PathBuf,
}

#[derive(Debug, Args)]
struct InferenceArgs {
    /// Base URL of an OpenAI-compatible API.
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Model name sent with every request.
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// API key; falls back to the DOC2TPL_API_KEY environment variable.
    #[arg(long)]
    api_key: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,

    /// Sampling temperature.
    #[arg(long, default_value_t = 0.0)]
    temperature: f32,

    /// Replacement template for the field extraction request.
    #[arg(long)]
    extract_prompt: Option<PathBuf>,

    /// Replacement template for the label matching request.
    #[arg(long)]
    match_prompt: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct PlaceholderArgs {
    /// Placeholder delimiters as open,close (example: {{,}}).
    #[arg(long, default_value = "[,]")]
    placeholder: String,

    /// Use the original label when no vocabulary key matched.
    #[arg(long)]
    label_fallback: bool,

    /// Only template the first copy of repeated tables.
    #[arg(long)]
    no_duplicates: bool,
}

#[derive(Debug, Args)]
struct MatchArgs {
    /// Input HTML or JSON document.
    #[arg(short, long)]
    input: PathBuf,

    /// Vocabulary document listing the canonical field names.
    #[arg(long)]
    vocabulary: PathBuf,

    /// Directory for match batches; cleared before the run.
    #[arg(short, long)]
    output_dir: PathBuf,

    #[command(flatten)]
    inference: InferenceArgs,

    /// Enable verbose diagnostic output.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Args)]
struct ReplaceArgs {
    /// Input HTML or JSON document.
    #[arg(short, long)]
    input: PathBuf,

    /// Output document path.
    #[arg(short, long)]
    output: PathBuf,

    /// Directory holding match batches.
    #[arg(short, long)]
    matches: PathBuf,

    #[command(flatten)]
    placeholder: PlaceholderArgs,

    /// Enable verbose diagnostic output.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Input HTML or JSON document.
    #[arg(short, long)]
    input: PathBuf,

    /// Output document path.
    #[arg(short, long)]
    output: PathBuf,

    /// Vocabulary document listing the canonical field names.
    #[arg(long)]
    vocabulary: PathBuf,

    /// Directory for match batches; cleared before the run.
    #[arg(short, long)]
    matches: PathBuf,

    #[command(flatten)]
    inference: InferenceArgs,

    #[command(flatten)]
    placeholder: PlaceholderArgs,

    /// Enable verbose diagnostic output.
    #[arg(short, long)]
    verbose: bool,
}

fn parse_options(
    inference: Option<&InferenceArgs>,
    placeholder: Option<&PlaceholderArgs>,
) -> Result<TemplateOptions> {
    let mut options = TemplateOptions::default();
    if let Some(args) = inference {
        options.temperature = args.temperature;
        options.extract_prompt.clone_from(&args.extract_prompt);
        options.match_prompt.clone_from(&args.match_prompt);
    }
    if let Some(args) = placeholder {
        options.placeholder = PlaceholderStyle::from_str(&args.placeholder)
            .map_err(|error| anyhow!("invalid placeholder style: {error}"))
            .context("failed to parse --placeholder")?;
        options.label_fallback = args.label_fallback;
        options.replace_duplicates = !args.no_duplicates;
    }
    Ok(options)
}

fn build_client(args: &InferenceArgs) -> Result<OpenAiClient> {
    let config = InferenceConfig {
        base_url: args.base_url.clone(),
        model: args.model.clone(),
        api_key: args.api_key.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
    }
    .with_env_key();
    OpenAiClient::new(&config).context("failed to configure the inference client")
}

fn log_diagnostics(diagnostics: &[Diagnostic], verbose: bool) {
    if diagnostics.is_empty() {
        return;
    }

    eprintln!("warning: {} issue(s) detected", diagnostics.len());
    if verbose {
        for diagnostic in diagnostics {
            eprintln!(
                "  - {:?} table={:?} position={:?}: {}",
                diagnostic.code, diagnostic.ordinal, diagnostic.position, diagnostic.message
            );
        }
    }
}

fn log_match(report: &MatchReport, verbose: bool) {
    log_diagnostics(&report.diagnostics, verbose);
    eprintln!(
        "matched {} field(s) in {} of {} table(s)",
        report.stats.fields_matched, report.stats.tables_with_matches, report.stats.tables_processed
    );
}

fn log_replace(report: &ReplaceReport, verbose: bool) {
    log_diagnostics(&report.diagnostics, verbose);
    eprintln!(
        "replaced {} cell(s), skipped {}",
        report.stats.cells_replaced, report.stats.cells_skipped
    );
}

fn run_tables(args: &TablesArgs) -> Result<bool> {
    let tables = inspect_tables(&args.input)
        .with_context(|| format!("failed to read tables from '{}'", args.input.display()))?;
    println!("{}", serde_json::to_string_pretty(&tables)?);
    Ok(!tables.is_empty())
}

fn run_match(args: &MatchArgs) -> Result<bool> {
    let options = parse_options(Some(&args.inference), None)?;
    let mut client = build_client(&args.inference)?;
    let report = match_file(
        &args.input,
        &mut client,
        &args.vocabulary,
        &args.output_dir,
        &options,
    )
    .with_context(|| format!("failed to match tables in '{}'", args.input.display()))?;
    log_match(&report, args.verbose);
    Ok(report.stats.tables_with_matches > 0)
}

fn run_replace(args: &ReplaceArgs) -> Result<bool> {
    let options = parse_options(None, Some(&args.placeholder))?;
    let report = replace_file(&args.input, &args.output, &args.matches, &options)
        .with_context(|| format!("failed to template '{}'", args.input.display()))?;
    log_replace(&report, args.verbose);
    Ok(report.stats.cells_replaced > 0)
}

fn run_all(args: &RunArgs) -> Result<bool> {
    let options = parse_options(Some(&args.inference), Some(&args.placeholder))?;
    let mut client = build_client(&args.inference)?;
    let (matched, replaced) = template_file(
        &args.input,
        &args.output,
        &mut client,
        &args.vocabulary,
        &args.matches,
        &options,
    )
    .with_context(|| format!("failed to template '{}'", args.input.display()))?;
    log_match(&matched, args.verbose);
    log_replace(&replaced, args.verbose);
    Ok(replaced.stats.cells_replaced > 0)
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("table_templater=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();
    let outcome = match &cli.command {
        Commands::Tables(args) => run_tables(args),
        Commands::Match(args) => run_match(args),
        Commands::Replace(args) => run_replace(args),
        Commands::Run(args) => run_all(args),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
