use std::process::ExitCode;

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use cmorkit::app::{App, ConvertRequest};
use cmorkit::attributes::{Clock, FixedClock, SystemClock};
use cmorkit::config::ConfigLoader;
use cmorkit::domain::SchemaVersion;
use cmorkit::error::CmorError;
use cmorkit::fetch::SystemFetcher;
use cmorkit::locator::{ResourceKind, ResourceLocator};
use cmorkit::output::JsonOutput;
use cmorkit::providers::{PackagedResources, VendoredResources};
use cmorkit::rule::Rule;
use cmorkit::store::CacheStore;

#[derive(Parser)]
#[command(name = "cmorkit")]
#[command(about = "CMIP controlled vocabularies, data request tables, global attributes and unit conversion")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Resolve a resource through user path, cache, remote, packaged and vendored copies")]
    Locate(LocateArgs),
    #[command(about = "Show controlled vocabulary categories or one category")]
    Cv(CvArgs),
    #[command(about = "List data request tables")]
    Tables(TablesArgs),
    #[command(about = "Compute global attributes and the archive directory for a rule")]
    Attrs(AttrsArgs),
    #[command(about = "Convert values between units")]
    Convert(ConvertArgs),
}

#[derive(Args)]
struct LocateArgs {
    resource: ResourceKind,

    #[arg(long)]
    version: Option<String>,

    #[arg(long)]
    path: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct CvArgs {
    schema: SchemaVersion,

    #[arg(long)]
    category: Option<String>,
}

#[derive(Args)]
struct TablesArgs {
    schema: SchemaVersion,
}

#[derive(Args)]
struct AttrsArgs {
    #[arg(long)]
    rule: Utf8PathBuf,

    /// Version date of the archive directory (YYYY-MM-DD), today by default.
    #[arg(long)]
    date: Option<NaiveDate>,
}

#[derive(Args)]
struct ConvertArgs {
    #[arg(long)]
    from: String,

    #[arg(long)]
    to: String,

    #[arg(long)]
    alias: Option<String>,

    /// Variable whose dimensionless mapping supplies the alias.
    #[arg(long)]
    variable: Option<String>,

    #[arg(required = true, allow_negative_numbers = true)]
    values: Vec<f64>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CmorError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CmorError) -> u8 {
    match error {
        CmorError::ResolutionExhausted { .. }
        | CmorError::DirectoryNotFound(_)
        | CmorError::TableNotFound(_)
        | CmorError::VariableNotFound { .. }
        | CmorError::MissingCategory(_)
        | CmorError::MissingCvEntry { .. } => 2,
        CmorError::Fetch(_)
        | CmorError::FetchStatus { .. }
        | CmorError::MissingTool(_)
        | CmorError::NoRemote(_) => 3,
        CmorError::Parse { .. }
        | CmorError::Format { .. }
        | CmorError::DuplicateCvKey { .. }
        | CmorError::UnknownFrequency(_)
        | CmorError::MissingUnit(_)
        | CmorError::MissingTargetUnit(_)
        | CmorError::UndefinedUnit(_)
        | CmorError::UnknownElement { .. }
        | CmorError::MissingDimensionlessMapping { .. }
        | CmorError::EmptyDimensionlessMapping { .. }
        | CmorError::IncompatibleUnits { .. }
        | CmorError::ScaledDimensionless { .. } => 4,
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
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let locator = ResourceLocator::new(
        CacheStore::new()?,
        SystemFetcher::new()?,
        PackagedResources::new(),
        VendoredResources::new(),
    );
    let app = App::new(locator, config);

    match cli.command {
        Commands::Locate(args) => {
            let result = app.locate(args.resource, args.version, args.path)?;
            JsonOutput::print_locate(&result).into_diagnostic()
        }
        Commands::Cv(args) => {
            let result = app.cv(args.schema, args.category.as_deref())?;
            JsonOutput::print_cv(&result).into_diagnostic()
        }
        Commands::Tables(args) => {
            let result = app.tables(args.schema)?;
            JsonOutput::print_tables(&result).into_diagnostic()
        }
        Commands::Attrs(args) => {
            let rule = Rule::from_path(&args.rule)?;
            let clock: Box<dyn Clock> = match args.date {
                Some(date) => Box::new(FixedClock(date)),
                None => Box::new(SystemClock),
            };
            let result = app.attrs(&rule, clock.as_ref())?;
            JsonOutput::print_attrs(&result).into_diagnostic()
        }
        Commands::Convert(args) => {
            let request = ConvertRequest {
                from_unit: args.from,
                to_unit: args.to,
                alias: args.alias,
                variable: args.variable,
            };
            let result = app.convert(args.values, &request)?;
            JsonOutput::print_convert(&result).into_diagnostic()
        }
    }
}
