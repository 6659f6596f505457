use anyhow::Context;
use buildworld_common::{OccupantId, Profile};
use buildworld_host::{GeneratorResolver, SimulatedHost};
use buildworld_kernel::{WorldKind, WorldRecord, name};
use buildworld_lifecycle::{CreateRequest, ManagerConfig, TeleportOutcome, WorldManager};
use buildworld_persist::{RecordStore, YamlRecordStore};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "buildworld-cli", about = "CLI tool for buildworld operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every world of a record store
    List {
        /// Record store directory
        store: PathBuf,
    },
    /// Show one world record in full
    Inspect { store: PathBuf, world: String },
    /// Check the store's schema version and checksum
    Verify { store: PathBuf },
    /// Show what a free-form name becomes when creating a world
    Sanitize { input: String },
    /// Run a scripted session against a simulated server
    Demo {
        /// Working directory for worlds and records
        #[arg(short, long, default_value = "buildworld-demo")]
        dir: PathBuf,
        /// Manager configuration file (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Ticks to run after the scripted steps
        #[arg(short, long, default_value = "100")]
        ticks: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::List { store } => {
            let store = open_existing(&store)?;
            let records = store.load_all()?;
            println!("{} world(s)", records.len());
            print_table(records.iter());
        }
        Commands::Inspect { store, world } => {
            let store = open_existing(&store)?;
            let record = store
                .load_all()?
                .into_iter()
                .find(|r| name::same_name(r.name(), &world))
                .with_context(|| format!("no world named {world:?}"))?;
            print_record(&record);
        }
        Commands::Verify { store } => {
            let store = open_existing(&store)?;
            store.verify_integrity()?;
            let meta = store.meta();
            println!(
                "OK: schema v{}, revision {}, sha256 {}",
                meta.schema_version,
                meta.revision,
                meta.records_sha256.as_deref().unwrap_or("-")
            );
        }
        Commands::Sanitize { input } => match name::sanitize(&input) {
            Ok(sanitized) => println!("{sanitized}"),
            Err(e) => anyhow::bail!(e),
        },
        Commands::Demo { dir, config, ticks } => demo(&dir, config.as_deref(), ticks)?,
    }

    Ok(())
}

/// Open a store that must already exist; `open` would create a fresh one.
fn open_existing(path: &Path) -> anyhow::Result<YamlRecordStore> {
    anyhow::ensure!(path.is_dir(), "record store {} does not exist", path.display());
    YamlRecordStore::open(path).with_context(|| format!("opening {}", path.display()))
}

fn print_table<'a>(records: impl Iterator<Item = &'a WorldRecord>) {
    println!(
        "{:<20} {:<10} {:<16} {:<8} {:<15} {}",
        "NAME", "KIND", "CREATOR", "PRIVATE", "STATUS", "LOADED"
    );
    for r in records {
        println!(
            "{:<20} {:<10} {:<16} {:<8} {:<15} {}",
            r.name(),
            r.kind(),
            r.creator_name(),
            r.visibility().is_private(),
            r.status(),
            r.is_loaded()
        );
    }
}

fn print_record(r: &WorldRecord) {
    println!("name:       {}", r.name());
    println!("kind:       {}", r.kind());
    println!("creator:    {}", r.creator_name());
    if let Some(id) = r.creator_id() {
        println!("creator id: {id}");
    }
    println!("private:    {}", r.visibility().is_private());
    println!("status:     {}", r.status());
    println!("project:    {}", r.project());
    println!("permission: {}", r.permission());
    println!("created at: {}", r.created_at());
    println!("toggles:    {:?}", r.toggles());
    let builders: Vec<&str> = r.builders().iter().map(|b| b.name.as_str()).collect();
    println!(
        "builders:   {} (restricted: {})",
        builders.join(", "),
        r.builders_restricted()
    );
    if let Some(spawn) = r.custom_spawn() {
        println!("spawn:      {:?}", spawn.position);
    }
    if let Some(generator) = r.generator() {
        println!("generator:  {generator}");
    }
}

fn demo(dir: &Path, config: Option<&Path>, ticks: u64) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => ManagerConfig::from_yaml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ManagerConfig::default(),
    };
    let host = SimulatedHost::new(dir.join("worlds"))?;
    let store = YamlRecordStore::open(dir.join("store"))?;
    let mut manager = WorldManager::open(host, Box::new(store), config, GeneratorResolver::new())?;
    tracing::info!(dir = %dir.display(), worlds = manager.list().len(), "demo started");

    let builder = Profile::new(OccupantId::new(), "builder");
    manager.host_mut().join(builder.id, "world")?;

    for (world, kind, private) in [
        ("lobby", WorldKind::Void, false),
        ("plots", WorldKind::Flat, true),
        ("caves", WorldKind::Nether, false),
    ] {
        if manager.find(world).is_none() {
            manager.create(&builder, CreateRequest::new(world, kind).private(private))?;
        }
    }

    match manager.teleport(builder.id, "caves")? {
        TeleportOutcome::Arrived(location) => println!("arrived at {:?}", location.position),
        TeleportOutcome::Scheduled { location, ticks } => {
            println!("loading, arriving at {:?} in {ticks} ticks", location.position)
        }
    }
    manager.advance(ticks);

    manager.save_all();
    manager.flush();
    print_table(manager.list().into_iter());
    for notice in manager.host_mut().take_notices(builder.id) {
        println!("notice: {notice}");
    }
    Ok(())
}
