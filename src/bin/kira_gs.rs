use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_genomic_study::client::FhirHttpClient;
use kira_genomic_study::config::{ConfigLoader, ConfigOverrides};
use kira_genomic_study::error::KiraError;
use kira_genomic_study::normalize::normalize;
use kira_genomic_study::output::{JsonOutput, JsonStyle};
use kira_genomic_study::pipeline::StudyPipeline;
use kira_genomic_study::study::{ParsedStudy, load_study};

#[derive(Parser)]
#[command(name = "kira-gs")]
#[command(about = "Parse FHIR R5 GenomicStudy resources, resolve file references and download them")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Extract analyses and file references without network access")]
    Parse(ParseArgs),
    #[command(about = "Resolve the patient and file references, then download attachments")]
    Fetch(FetchArgs),
}

#[derive(Args, Clone)]
struct OutputArgs {
    /// Output file path (default: stdout)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Pretty print JSON output
    #[arg(long)]
    pretty: bool,
}

impl OutputArgs {
    fn style(&self) -> JsonStyle {
        if self.pretty {
            JsonStyle::Pretty
        } else {
            JsonStyle::Compact
        }
    }
}

#[derive(Args, Clone)]
struct ParseArgs {
    /// Path to the GenomicStudy JSON file
    input_file: PathBuf,

    /// Base API URL to prepend to file references
    #[arg(long)]
    api_link: Option<String>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Clone)]
struct FetchArgs {
    /// Path to the GenomicStudy JSON file
    input_file: PathBuf,

    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    token: Option<String>,

    /// Root directory for downloaded files
    #[arg(long)]
    output_dir: Option<String>,

    #[arg(long)]
    config: Option<String>,

    /// Emit the storage-ready document instead of the raw fetch result
    #[arg(long)]
    normalize: bool,

    #[command(flatten)]
    output: OutputArgs,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::StudyRead(_)
        | KiraError::MalformedInput(_)
        | KiraError::MissingBaseUrl
        | KiraError::ConfigRead(_)
        | KiraError::ConfigParse(_)
        | KiraError::InvalidBaseUrl(_) => 2,
        err if err.is_remote() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Parse(args) => run_parse(args),
        Commands::Fetch(args) => run_fetch(args),
    }
}

fn run_parse(args: ParseArgs) -> miette::Result<()> {
    let document = load_study(&args.input_file)?;
    let mut parsed = ParsedStudy::from_document(&document)?;
    if let Some(api_link) = args.api_link.as_deref() {
        parsed = parsed.with_api_link(api_link);
    }
    JsonOutput::emit(&parsed, args.output.style(), args.output.output.as_deref())
        .into_diagnostic()
}

fn run_fetch(args: FetchArgs) -> miette::Result<()> {
    let config = ConfigLoader::resolve(
        args.config.as_deref(),
        ConfigOverrides {
            base_url: args.base_url.clone(),
            auth_token: args.token.clone(),
            output_dir: args.output_dir.clone(),
        },
    )?;
    let document = load_study(&args.input_file)?;

    let client = FhirHttpClient::new(
        &config.base_url,
        config.auth_token.as_deref(),
        config.timeout,
    )?;
    let pipeline = StudyPipeline::new(client, config.output_dir);
    let result = pipeline.process_study(&document)?;

    let style = args.output.style();
    let path = args.output.output.as_deref();
    if args.normalize {
        let normalized = normalize(&result)?;
        JsonOutput::emit(&normalized, style, path).into_diagnostic()
    } else {
        JsonOutput::emit(&result, style, path).into_diagnostic()
    }
}
