use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use memtype_core::address_space::{AddressSpaceIndex, Query};
use memtype_core::catalog::{ArchitectureProfile, TypeCatalog};
use memtype_core::materialize::{MaterializeOptions, Materializer, PathIndex, Value};
use memtype_core::memory::{write_dump, DumpImage, MappingSource, MemoryReader};
use memtype_core::scan::{find_values, parse_needle};
use memtype_core::types::Address;
use memtype_core::{MemtypeError, MemtypeResult};
use memtype_utils::{info, init_logging, init_logging_with_level, LogFormat, LogLevel};

/// Decode typed values out of process memory or memory dumps.
#[derive(Parser, Debug)]
#[command(name = "memtype")]
#[command(version)]
#[command(about = "Decode typed values out of process memory or memory dumps", long_about = None)]
struct Cli
{
    /// JSON type database; repeat to merge several, later files win
    #[arg(long = "types", global = true)]
    types: Vec<PathBuf>,
    /// Architecture profile: native, 32le, 32be, 64le or 64be
    #[arg(long, global = true, default_value = "native")]
    arch: String,
    /// Static map file; repeat to load several region sets
    #[arg(long = "map", global = true)]
    maps: Vec<PathBuf>,
    /// Read memory of a running process (Linux)
    #[arg(long, global = true, conflicts_with = "dump")]
    pid: Option<u32>,
    /// Read memory from a dump directory written by `memtype dump`
    #[arg(long, global = true)]
    dump: Option<PathBuf>,
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Materialize a type at an address or named region and print it as JSON
    Read
    {
        /// Root type name
        type_name: String,
        /// Address (0x1000 or decimal) or region name
        location: String,
        /// Pointer type that is printed as an address instead of followed
        #[arg(long = "no-follow")]
        no_follow: Vec<String>,
        /// Maximum nesting depth
        #[arg(long, default_value_t = memtype_core::materialize::DEFAULT_MAX_DEPTH)]
        max_depth: usize,
        /// Longest string scanned; 0 scans until a read fails
        #[arg(long, default_value_t = memtype_core::materialize::DEFAULT_MAX_STRING_LEN)]
        max_string: usize,
        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Also print every visited path with its address and value
        #[arg(long, default_value_t = false)]
        paths: bool,
    },
    /// Print the size of a type in bytes
    Size
    {
        type_name: String,
    },
    /// Find the region containing an address, or a region by name
    Lookup
    {
        query: String,
    },
    /// Write the live mappings and their contents to a dump directory
    Dump
    {
        dir: PathBuf,
    },
    /// Search a range for a value in every known scalar encoding
    Find
    {
        /// Start address
        start: String,
        /// Number of bytes to scan
        len: String,
        /// Value to look for (integer in any base, or float)
        value: String,
    },
}

/// A memory source usable for both reads and mappings.
trait Target: MemoryReader + MappingSource + Send + Sync {}

impl<T: MemoryReader + MappingSource + Send + Sync> Target for T {}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main()
{
    let cli = Cli::parse();

    let logging = match cli.log_level.as_deref() {
        Some(level) => level
            .parse::<LogLevel>()
            .and_then(|level| init_logging_with_level(level, LogFormat::from_env())),
        None => init_logging(),
    };
    let _guard = match logging {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn open_target(cli: &Cli) -> MemtypeResult<Option<Arc<dyn Target>>>
{
    if let Some(dir) = &cli.dump {
        info!("Loading memory dump from {}", dir.display());
        return Ok(Some(Arc::new(DumpImage::load(dir)?)));
    }
    if let Some(pid) = cli.pid {
        return open_process(pid).map(Some);
    }
    Ok(None)
}

#[cfg(target_os = "linux")]
fn open_process(pid: u32) -> MemtypeResult<Arc<dyn Target>>
{
    info!("Reading memory of process {}", pid);
    Ok(Arc::new(memtype_core::platform::linux::ProcessMemory::open(pid)?))
}

#[cfg(not(target_os = "linux"))]
fn open_process(_pid: u32) -> MemtypeResult<Arc<dyn Target>>
{
    Err(MemtypeError::MalformedInput("--pid is only supported on Linux".to_string()))
}

fn require(target: Option<Arc<dyn Target>>) -> MemtypeResult<Arc<dyn Target>>
{
    target.ok_or_else(|| MemtypeError::MalformedInput("no memory source, pass --pid or --dump".to_string()))
}

fn load_catalog(cli: &Cli) -> MemtypeResult<TypeCatalog>
{
    let mut catalog = TypeCatalog::with_profile(cli.arch.parse::<ArchitectureProfile>()?);
    for path in &cli.types {
        let count = catalog.load_file(path)?;
        info!("Loaded {} types from {}", count, path.display());
    }
    Ok(catalog)
}

fn load_index(cli: &Cli) -> MemtypeResult<AddressSpaceIndex>
{
    let mut index = AddressSpaceIndex::new();
    for path in &cli.maps {
        index.load_map_file(path)?;
    }
    Ok(index)
}

fn lookup(index: &AddressSpaceIndex, target: Option<&Arc<dyn Target>>, query: &Query) -> memtype_core::ResolvedSymbol
{
    match target {
        Some(target) => index.lookup_with_live(query, target.as_ref()),
        None => index.lookup(query),
    }
}

fn run_command(cli: Cli) -> CliResult<()>
{
    match &cli.command {
        Commands::Read {
            type_name,
            location,
            no_follow,
            max_depth,
            max_string,
            timeout_ms,
            paths,
        } => {
            let catalog = load_catalog(&cli)?;
            let index = load_index(&cli)?;
            let target = require(open_target(&cli)?)?;

            let address = match Query::from(location.as_str()) {
                Query::Address(address) => address,
                query => {
                    let symbol = lookup(&index, Some(&target), &query);
                    if !symbol.exists {
                        return Err(symbol.to_string().into());
                    }
                    symbol.address
                }
            };

            let mut options = MaterializeOptions::default()
                .with_max_depth(*max_depth)
                .with_max_string_len((*max_string > 0).then_some(*max_string));
            options.no_follow.extend(no_follow.iter().cloned());

            let (value, index) = match timeout_ms {
                Some(ms) => read_with_timeout(catalog, target, options, type_name.clone(), address, *ms)?,
                None => Materializer::new(&catalog, target.as_ref())
                    .with_options(options)
                    .materialize(type_name, address)?,
            };
            print_value(&value, &index, *paths)
        }
        Commands::Size { type_name } => {
            let catalog = load_catalog(&cli)?;
            let size = catalog.resolve_size(type_name)?;
            println!("{type_name}: {size} ({size:#x}) bytes");
            Ok(())
        }
        Commands::Lookup { query } => {
            let index = load_index(&cli)?;
            let target = open_target(&cli)?;
            println!("{}", lookup(&index, target.as_ref(), &Query::from(query.as_str())));
            Ok(())
        }
        Commands::Dump { dir } => {
            let target = require(open_target(&cli)?)?;
            let regions = target.current_mappings()?;
            let summary = write_dump(dir, &regions, target.as_ref())?;
            println!(
                "Wrote {} regions ({} bytes) to {}, skipped {}",
                summary.written.len(),
                summary.bytes,
                dir.display(),
                summary.skipped.len()
            );
            Ok(())
        }
        Commands::Find { start, len, value } => {
            let catalog = load_catalog(&cli)?;
            let target = require(open_target(&cli)?)?;
            let start = start.parse::<Address>()?;
            let len = parse_len(len)?;
            let needle = parse_needle(value)?;
            for hit in find_values(target.as_ref(), start, len, &catalog.profile(), needle)? {
                println!(
                    "{}: off {:#x} type {} val {}",
                    hit.address, hit.offset, hit.encoding, hit.value
                );
            }
            Ok(())
        }
    }
}

fn parse_len(text: &str) -> MemtypeResult<usize>
{
    parse_int::parse::<usize>(text).map_err(|err| MemtypeError::MalformedInput(format!("invalid length '{text}': {err}")))
}

/// Run a materialization on a blocking thread and stop waiting after `ms`.
///
/// A read of a live process can block indefinitely; the blocking thread is
/// abandoned on timeout and the process exits.
fn read_with_timeout(
    catalog: TypeCatalog,
    target: Arc<dyn Target>,
    options: MaterializeOptions,
    type_name: String,
    address: Address,
    ms: u64,
) -> CliResult<(Value, PathIndex)>
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_time()
        .build()?;

    let outcome = runtime.block_on(async move {
        let task = tokio::task::spawn_blocking(move || {
            Materializer::new(&catalog, target.as_ref())
                .with_options(options)
                .materialize(&type_name, address)
        });
        let outcome: CliResult<(Value, PathIndex)> = match tokio::time::timeout(Duration::from_millis(ms), task).await {
            Ok(Ok(result)) => result.map_err(Into::into),
            Ok(Err(join)) => Err(join.into()),
            Err(_) => Err(format!("materialize timed out after {ms} ms").into()),
        };
        outcome
    });
    // A reader stuck in a blocking call must not hold up exit
    runtime.shutdown_background();
    outcome
}

fn print_value(value: &Value, index: &PathIndex, paths: bool) -> CliResult<()>
{
    println!("{}", serde_json::to_string_pretty(value)?);
    if paths {
        for entry in index.iter() {
            println!("{} {} {}", entry.address, entry.path, entry.value);
        }
    }
    Ok(())
}
