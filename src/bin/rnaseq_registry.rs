use std::fs;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{ArgGroup, Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use rnaseq_registry::config::ConfigLoader;
use rnaseq_registry::domain::{LoadPolicy, Release, RemapPair};
use rnaseq_registry::error::RegistryError;
use rnaseq_registry::output::{Output, OutputMode};
use rnaseq_registry::query::{DatasetFilter, write_dump};
use rnaseq_registry::registry::{LoadOptions, Registry};
use rnaseq_registry::schema::parse_dataset_file;
use rnaseq_registry::store::Store;

#[derive(Parser)]
#[command(name = "rnaseq-registry")]
#[command(about = "Registry of RNA-Seq datasets, their runs and SRA accessions")]
#[command(version)]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create a new registry database")]
    Create(CreateArgs),
    #[command(about = "Manage components")]
    Component(ComponentArgs),
    #[command(about = "Manage organisms")]
    Organism(OrganismArgs),
    #[command(about = "Load, export, remap and remove datasets")]
    Dataset(DatasetArgs),
}

#[derive(Args)]
struct CreateArgs {
    /// SQLite registry database
    database: Utf8PathBuf,

    /// Replace the database if it already exists
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
#[command(group(ArgGroup::new("action").required(true).args(["list", "add", "get", "remove"])))]
struct ComponentArgs {
    /// SQLite registry database
    database: Utf8PathBuf,

    #[arg(long)]
    list: bool,

    #[arg(long, value_name = "NAME")]
    add: Option<String>,

    #[arg(long, value_name = "NAME")]
    get: Option<String>,

    #[arg(long, value_name = "NAME")]
    remove: Option<String>,
}

#[derive(Args)]
#[command(group(ArgGroup::new("action").required(true).args(["list", "add", "get", "remove", "load"])))]
struct OrganismArgs {
    /// SQLite registry database
    database: Utf8PathBuf,

    #[arg(long)]
    list: bool,

    #[arg(long, value_name = "NAME", requires = "component")]
    add: Option<String>,

    #[arg(long, value_name = "NAME")]
    get: Option<String>,

    #[arg(long, value_name = "NAME")]
    remove: Option<String>,

    /// Tab file of `component<TAB>organism` lines
    #[arg(long, value_name = "FILE")]
    load: Option<Utf8PathBuf>,

    #[arg(long)]
    component: Option<String>,

    /// Species name for --add (defaults to the production name)
    #[arg(long)]
    species: Option<String>,
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["load", "dump_file", "remap", "remove", "list", "get"])
))]
struct DatasetArgs {
    /// SQLite registry database
    database: Utf8PathBuf,

    /// Dataset file (JSON array) to import
    #[arg(long, value_name = "FILE")]
    load: Option<Utf8PathBuf>,

    /// Export the selected datasets to a JSON file
    #[arg(long = "dump_file", alias = "dump-file", value_name = "FILE")]
    dump_file: Option<Utf8PathBuf>,

    /// Move runs from one organism to another
    #[arg(long, value_name = "OLD,NEW")]
    remap: Option<RemapPair>,

    #[arg(long, requires_all = ["organism", "dataset"])]
    remove: bool,

    #[arg(long)]
    list: bool,

    #[arg(long, value_name = "NAME", requires = "organism")]
    get: Option<String>,

    /// Release number (defaults to BUILD_VERSION for --load)
    #[arg(long)]
    release: Option<u32>,

    #[arg(long)]
    organism: Option<String>,

    #[arg(long)]
    component: Option<String>,

    #[arg(long)]
    dataset: Option<String>,

    /// Include retired dataset versions
    #[arg(long = "not_latest", alias = "not-latest")]
    not_latest: bool,

    /// Retire current versions and load the new ones
    #[arg(long, conflicts_with = "ignore")]
    replace: bool,

    /// Silently skip datasets that already have a current version
    #[arg(long)]
    ignore: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<RegistryError>() {
            return ExitCode::from(err.exit_code());
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = Output::new(if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    });

    match cli.command {
        Commands::Create(args) => run_create(args, &output),
        Commands::Component(args) => run_component(args, &output),
        Commands::Organism(args) => run_organism(args, &output),
        Commands::Dataset(args) => run_dataset(args, &output),
    }
}

fn open_registry(database: &Utf8PathBuf) -> miette::Result<Registry> {
    let store = Store::open(database)?;
    Ok(Registry::new(store))
}

fn run_create(args: CreateArgs, output: &Output) -> miette::Result<()> {
    let existed = args.database.as_std_path().exists();
    Store::create(&args.database, args.force)?;
    let message = if existed {
        format!("Recreated the database {} from scratch", args.database)
    } else {
        format!("Created the new database {}", args.database)
    };
    output.print_message(&message).into_diagnostic()
}

fn run_component(args: ComponentArgs, output: &Output) -> miette::Result<()> {
    let mut registry = open_registry(&args.database)?;
    if let Some(name) = args.add {
        let component = registry.add_component(&name)?;
        output.print_components(&[component]).into_diagnostic()
    } else if let Some(name) = args.get {
        let component = registry.get_component(&name)?;
        output.print_components(&[component]).into_diagnostic()
    } else if let Some(name) = args.remove {
        registry.remove_component(&name)?;
        output
            .print_message(&format!("Removed component {name}"))
            .into_diagnostic()
    } else {
        let components = registry.list_components()?;
        output.print_components(&components).into_diagnostic()
    }
}

fn run_organism(args: OrganismArgs, output: &Output) -> miette::Result<()> {
    let mut registry = open_registry(&args.database)?;
    if let Some(name) = args.add {
        let component = args
            .component
            .ok_or_else(|| miette::Report::msg("--add needs a --component"))?;
        let organism = registry
            .add_organism(&name, &component, args.species.as_deref())?;
        output.print_organism(&organism).into_diagnostic()
    } else if let Some(name) = args.get {
        let organism = registry.get_organism(&name)?;
        output.print_organism(&organism).into_diagnostic()
    } else if let Some(name) = args.remove {
        registry.remove_organism(&name)?;
        output
            .print_message(&format!("Removed organism {name}"))
            .into_diagnostic()
    } else if let Some(path) = args.load {
        let entries = ConfigLoader::read_organism_table(&path)?;
        let report = registry.load_organisms(&entries)?;
        output.print_organism_load(&report).into_diagnostic()
    } else {
        let organisms = registry
            .list_organisms(args.component.as_deref())?;
        output.print_organisms(&organisms).into_diagnostic()
    }
}

fn run_dataset(args: DatasetArgs, output: &Output) -> miette::Result<()> {
    let mut registry = open_registry(&args.database)?;
    let filter = DatasetFilter {
        component: args.component.clone(),
        organism: args.organism.clone(),
        dataset: args.dataset.clone(),
        release: args.release,
        include_retired: args.not_latest,
    };

    if let Some(path) = &args.load {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| RegistryError::Filesystem(format!("read {path}: {err}")))?;
        let entries = parse_dataset_file(&content)?;
        let options = LoadOptions {
            policy: load_policy(args.replace, args.ignore),
            release: ConfigLoader::resolve_release(args.release)?,
        };
        let report = registry.load_file_entries(&entries, options)?;
        output.print_load(&report).into_diagnostic()?;
        if !report.is_complete() {
            return Err(RegistryError::PartialLoad {
                failed: report.failed(),
                total: report.total,
            }
            .into());
        }
        Ok(())
    } else if let Some(path) = &args.dump_file {
        let records = registry.dump_datasets(&filter)?;
        write_dump(path, &records)?;
        output
            .print_message(&format!("Dumped {} datasets to {path}", records.len()))
            .into_diagnostic()
    } else if let Some(pair) = &args.remap {
        let report = registry
            .remap(pair, args.dataset.as_deref())?;
        output.print_remap(&report).into_diagnostic()
    } else if args.remove {
        let (Some(organism), Some(dataset)) = (&args.organism, &args.dataset) else {
            return Err(miette::Report::msg("--remove needs --organism and --dataset"));
        };
        let release = args.release.map(Release::new).transpose()?;
        let result = registry
            .remove_dataset(organism, dataset, release)?;
        output.print_remove(&result).into_diagnostic()
    } else if let Some(name) = &args.get {
        let organism = args
            .organism
            .as_deref()
            .ok_or_else(|| miette::Report::msg("--get needs an --organism"))?;
        let entry = registry
            .get_dataset(organism, name, args.release)?;
        output.print_dataset(&entry).into_diagnostic()
    } else {
        let entries = registry.list_datasets(&filter)?;
        output.print_datasets(&entries).into_diagnostic()
    }
}

fn load_policy(replace: bool, ignore: bool) -> LoadPolicy {
    match (replace, ignore) {
        (true, _) => LoadPolicy::Replace,
        (false, true) => LoadPolicy::Ignore,
        (false, false) => LoadPolicy::Skip,
    }
}
