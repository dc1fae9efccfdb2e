use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use citation_pulse::clock::SystemClock;
use citation_pulse::config::{ConfigLoader, ResolvedConfig, seconds};
use citation_pulse::crossref::CrossrefHttpClient;
use citation_pulse::domain::SubjectId;
use citation_pulse::engine::{Engine, MetricsRequest, SilentProgress};
use citation_pulse::error::{FetchFailure, PulseError};
use citation_pulse::fetcher::{EndpointKind, RecordFetcher};
use citation_pulse::identity::IdentityEnricher;
use citation_pulse::jobs::RefreshQueue;
use citation_pulse::orcid::OrcidHttpClient;
use citation_pulse::output::{JsonOutput, OutputMode, TextOutput};
use citation_pulse::store::{FileSeriesStore, SeriesStore};

type HttpEngine = Engine<OrcidHttpClient, CrossrefHttpClient, FileSeriesStore, SystemClock>;

#[derive(Parser)]
#[command(name = "cpulse")]
#[command(about = "Per-year citation series and bibliometric indicators from ORCID and Crossref")]
#[command(version, author)]
struct Cli {
    /// Config file (defaults to ./citation-pulse.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Compute citation metrics for one subject")]
    Metrics(MetricsArgs),
    #[command(about = "Resolve identities for several subjects at once")]
    Identity(SubjectsArgs),
    #[command(about = "Fetch one raw registry record")]
    Record(RecordArgs),
    #[command(about = "Recompute and store series in the background")]
    Refresh(SubjectsArgs),
    #[command(about = "Inspect stored series")]
    Series(SeriesArgs),
}

#[derive(Args)]
struct MetricsArgs {
    subject: String,

    #[arg(long)]
    years_back: Option<u32>,

    #[arg(long)]
    max_publications: Option<usize>,

    /// Seconds allowed for citation lookups
    #[arg(long)]
    time_budget: Option<f64>,

    #[arg(long)]
    force_refresh: bool,

    /// Do not write the fresh series back to the store
    #[arg(long)]
    no_store: bool,
}

#[derive(Args)]
struct SubjectsArgs {
    #[arg(required = true)]
    subjects: Vec<String>,
}

#[derive(Args)]
struct RecordArgs {
    /// profile, works, employments or citations
    kind: String,
    /// ORCID iD, or a DOI for `citations`
    id: String,
}

#[derive(Args)]
struct SeriesArgs {
    #[command(subcommand)]
    command: SeriesCommand,
}

#[derive(Subcommand)]
enum SeriesCommand {
    #[command(about = "List subjects with a stored series")]
    List,
    #[command(about = "Show one stored series")]
    Show { subject: String },
    #[command(about = "Delete one stored series")]
    Clear { subject: String },
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(pulse) = report.downcast_ref::<PulseError>() {
            return ExitCode::from(map_exit_code(pulse));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PulseError) -> u8 {
    match error {
        PulseError::InvalidSubjectId(_)
        | PulseError::InvalidDoi(_)
        | PulseError::InvalidParameter(_)
        | PulseError::ConfigRead(_)
        | PulseError::ConfigParse(_)
        | PulseError::SeriesNotFound(_)
        | PulseError::JobNotFound(_) => 2,
        PulseError::Fetch(FetchFailure::NotFound(_)) => 2,
        PulseError::Fetch(_) | PulseError::OrcidHttp(_) | PulseError::CrossrefHttp(_) => 3,
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
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Metrics(args) => run_metrics(args, &config, output_mode),
        Commands::Identity(args) => run_identity(args, &config, output_mode),
        Commands::Record(args) => run_record(args, &config),
        Commands::Refresh(args) => run_refresh(args, &config, output_mode),
        Commands::Series(args) => run_series(args, &config, output_mode),
    }
}

fn build_engine(config: &ResolvedConfig) -> Result<HttpEngine, PulseError> {
    let fetcher = RecordFetcher::new(
        OrcidHttpClient::new(config)?,
        CrossrefHttpClient::new(config)?,
    );
    Ok(Engine::new(fetcher, FileSeriesStore::new(config)?, SystemClock))
}

fn parse_subjects(raw: &[String]) -> Result<Vec<SubjectId>, PulseError> {
    raw.iter().map(|value| value.parse()).collect()
}

fn run_metrics(
    args: MetricsArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let subject: SubjectId = args.subject.parse()?;
    let mut request = MetricsRequest::from_config(config);
    if let Some(years_back) = args.years_back {
        request.years_back = years_back;
    }
    if let Some(max_publications) = args.max_publications {
        request.max_publications = max_publications;
    }
    request.time_budget = seconds("--time-budget", args.time_budget, request.time_budget)?;
    request.force_refresh = args.force_refresh;
    request.persist = !args.no_store;

    let engine = build_engine(config)?;
    let report = match output_mode {
        OutputMode::Json => engine.compute_citation_metrics(&subject, &request, &JsonOutput)?,
        OutputMode::Text => engine.compute_citation_metrics(&subject, &request, &TextOutput)?,
    };
    match output_mode {
        OutputMode::Json => JsonOutput::print_report(&report).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_report(&report).into_diagnostic()?,
    }

    if let Some(failure) = report.failure {
        return Err(PulseError::Fetch(failure).into());
    }
    Ok(())
}

fn run_identity(
    args: SubjectsArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let subjects = parse_subjects(&args.subjects)?;
    let client = Arc::new(OrcidHttpClient::new(config)?);
    let outcomes = IdentityEnricher::from_config(client, config).enrich(&subjects);
    match output_mode {
        OutputMode::Json => JsonOutput::print_identities(&outcomes),
        OutputMode::Text => TextOutput::print_identities(&outcomes),
    }
    .into_diagnostic()
}

fn run_record(args: RecordArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let kind: EndpointKind = args.kind.parse()?;
    let fetcher = RecordFetcher::new(
        OrcidHttpClient::new(config)?,
        CrossrefHttpClient::new(config)?,
    );
    let record = fetcher.fetch(kind, &args.id)?;
    JsonOutput::print_record(&record).into_diagnostic()
}

fn run_refresh(
    args: SubjectsArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let subjects = parse_subjects(&args.subjects)?;
    let engine = build_engine(config)?;
    let request = MetricsRequest {
        force_refresh: true,
        ..MetricsRequest::from_config(config)
    };

    let queue = RefreshQueue::start(move |subject| {
        engine.compute_citation_metrics(subject, &request, &SilentProgress)
    });
    for subject in subjects {
        let id = queue.enqueue(subject)?;
        if output_mode == OutputMode::Text {
            eprintln!("queued job #{id}");
        }
    }
    let jobs = queue.shutdown();
    match output_mode {
        OutputMode::Json => JsonOutput::print_jobs(&jobs),
        OutputMode::Text => TextOutput::print_jobs(&jobs),
    }
    .into_diagnostic()
}

fn run_series(
    args: SeriesArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let store = FileSeriesStore::new(config)?;
    match args.command {
        SeriesCommand::List => {
            let subjects = store.list()?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_subjects(&subjects),
                OutputMode::Text => TextOutput::print_subjects(&subjects),
            }
            .into_diagnostic()
        }
        SeriesCommand::Show { subject } => {
            let subject: SubjectId = subject.parse()?;
            let series = store
                .read(&subject)?
                .ok_or_else(|| PulseError::SeriesNotFound(subject.to_string()))?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_series(&series),
                OutputMode::Text => TextOutput::print_series(&series),
            }
            .into_diagnostic()
        }
        SeriesCommand::Clear { subject } => {
            let subject: SubjectId = subject.parse()?;
            if !store.remove(&subject)? {
                return Err(PulseError::SeriesNotFound(subject.to_string()).into());
            }
            if output_mode == OutputMode::Text {
                println!("cleared {subject}");
            }
            Ok(())
        }
    }
}
