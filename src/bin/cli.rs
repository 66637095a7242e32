//! Binary entry point for the netpack command-line tool.
#![forbid(unsafe_code)]

#[path = "cli/config.rs"]
mod config;
#[path = "cli/import.rs"]
mod import;
#[path = "cli/ui.rs"]
mod ui;

use std::path::PathBuf;
use std::time::Instant;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use netpack::storage::Synchronous;
use netpack::{costs, Attrs, GraphError, GraphStore, StoreOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use config::{CliConfig, ConfigError};
use import::{run_import, ImportConfig};
use ui::{format_duration, Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "netpack",
    version,
    about = "Build and query transportation network graphs stored in GeoPackage files",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(flatten)]
    open: OpenArgs,

    #[arg(
        long,
        global = true,
        value_enum,
        help = "Output format for structured responses [default: text]"
    )]
    format: Option<OutputFormat>,

    #[arg(
        long,
        global = true,
        value_name = "FILE",
        env = "NETPACK_CONFIG",
        help = "CLI config file (defaults to <config dir>/netpack/cli.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(
        short,
        long,
        global = true,
        action = ArgAction::Count,
        help = "Log more (-v debug, -vv trace)"
    )]
    verbose: u8,

    #[arg(long, global = true, help = "Suppress decorations and progress output")]
    quiet: bool,

    #[arg(long, global = true, value_enum, default_value_t = Theme::Auto, help = "Color theme")]
    theme: Theme,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct OpenArgs {
    #[arg(long, global = true, value_enum, help = "Synchronous mode override")]
    synchronous: Option<SynchronousArg>,

    #[arg(long, global = true, value_name = "KIB", help = "Page cache size override")]
    cache_size_kib: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Create an empty graph container")]
    Init(InitCmd),

    #[command(about = "Load edges from a JSON-lines file, then rebuild indexes")]
    Import(ImportCmd),

    #[command(about = "Print container statistics")]
    Info {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
    },

    #[command(about = "Rebuild the covering, key and spatial indexes")]
    Reindex {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
    },

    #[command(about = "Shortest path between nodes")]
    Route(RouteCmd),

    #[command(about = "Edges or nodes near a coordinate")]
    Nearby(NearbyCmd),
}

#[derive(Args, Debug)]
struct InitCmd {
    #[arg(value_name = "DB")]
    db_path: PathBuf,

    #[arg(long, help = "Spatial reference id of stored geometries")]
    srid: Option<i32>,

    #[arg(long, help = "Skip the spatial index on the graph tables")]
    no_spatial_index: bool,
}

#[derive(Args, Debug)]
struct ImportCmd {
    #[arg(value_name = "DB")]
    db_path: PathBuf,

    #[arg(
        value_name = "EDGES",
        help = "JSON-lines file, one [u, v] or [u, v, {attrs}] per line"
    )]
    edges: PathBuf,

    #[arg(long, help = "Edges committed per transaction")]
    batch_size: Option<usize>,

    #[arg(long, help = "Tag every imported edge with this `_layer` value")]
    layer: Option<String>,

    #[arg(long, help = "Derive `_length` in metres from edge geometries")]
    compute_length: bool,

    #[arg(
        long,
        help = "Bulk-load settings: no fsync, query indexes dropped until the final reindex"
    )]
    bulk: bool,
}

#[derive(Args, Debug)]
struct RouteCmd {
    #[arg(value_name = "DB")]
    db_path: PathBuf,

    #[arg(long = "from", value_name = "KEY", required = true, help = "Source node (repeatable)")]
    sources: Vec<String>,

    #[arg(long = "to", value_name = "KEY", help = "Target node")]
    target: String,

    #[arg(
        long,
        value_name = "ATTR",
        help = "Numeric edge attribute used as cost; hop count when omitted"
    )]
    weight: Option<String>,

    #[arg(long, help = "Ignore paths costlier than this")]
    cutoff: Option<f64>,
}

#[derive(Args, Debug)]
struct NearbyCmd {
    #[arg(value_name = "DB")]
    db_path: PathBuf,

    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    #[arg(long, help = "Search radius (metres for WGS 84 data)")]
    distance: f64,

    #[arg(long, help = "Order hits by distance")]
    sorted: bool,

    #[arg(long, help = "Search nodes instead of edges")]
    nodes: bool,

    #[arg(long, help = "Report at most this many hits")]
    limit: Option<usize>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum SynchronousArg {
    Full,
    Normal,
    Off,
}

impl From<SynchronousArg> for Synchronous {
    fn from(mode: SynchronousArg) -> Self {
        match mode {
            SynchronousArg::Full => Synchronous::Full,
            SynchronousArg::Normal => Synchronous::Normal,
            SynchronousArg::Off => Synchronous::Off,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Message(String),
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cfg = CliConfig::load(cli.config.clone())?;
    debug!(config = ?cfg.path(), "cli.config_loaded");
    let format = cli.format.or(cfg.format()).unwrap_or(OutputFormat::Text);
    let ui = Ui::new(cli.theme, cli.quiet || format == OutputFormat::Json);
    let base = |preset: StoreOptions| apply_open_args(cfg.store_options(preset), &cli.open);

    match &cli.command {
        Command::Init(cmd) => {
            let mut opts = base(StoreOptions::default());
            if let Some(srid) = cmd.srid {
                opts = opts.srid(srid);
            }
            if cmd.no_spatial_index {
                opts = opts.spatial_index(false);
            }
            if cmd.db_path.exists() {
                return Err(CliError::Message(format!("{} already exists", cmd.db_path.display())));
            }
            GraphStore::create(&cmd.db_path, opts.clone())?;
            let report = InitReport {
                path: cmd.db_path.display().to_string(),
                srid: opts.srid,
                spatial_index: opts.spatial_index,
            };
            emit(format, &report, || {
                ui.success(&format!("created {} (srid {})", report.path, report.srid))
            })?;
        }
        Command::Import(cmd) => {
            let preset = if cmd.bulk {
                StoreOptions::bulk_load()
            } else {
                StoreOptions::default()
            };
            let mut opts = base(preset);
            if let Some(batch_size) = cmd.batch_size {
                opts = opts.batch_size(batch_size);
            }
            let compute_length = cmd.compute_length || opts.compute_length;
            let store = GraphStore::create(&cmd.db_path, opts)?;
            if cmd.bulk {
                store.drop_query_indexes()?;
            }
            let started = Instant::now();
            let import_cfg = ImportConfig {
                edges: &cmd.edges,
                batch_size: store.options().batch_size,
                layer: cmd.layer.clone(),
                compute_length,
            };
            let counter = ui.counter("importing");
            let summary = run_import(&store, &import_cfg, &mut |n| counter.inc(n as u64));
            counter.finish_and_clear();
            let summary = summary?;

            let task = ui.task("rebuilding indexes");
            store.reindex()?;
            task.finish();

            let report = ImportReport {
                offered: summary.offered,
                inserted: summary.inserted,
                ignored: summary.offered - summary.inserted,
                nodes_inserted: summary.nodes_inserted,
                batches: summary.batches,
                columns_added: summary.columns_added,
                elapsed_ms: started.elapsed().as_secs_f64() * 1_000.0,
            };
            emit(format, &report, || print_import_text(&ui, &report, started))?;
        }
        Command::Info { db_path } => {
            let store = GraphStore::open(db_path, base(StoreOptions::read_only()))?;
            let report = info_report(&store, db_path)?;
            emit(format, &report, || print_info_text(&ui, &report))?;
        }
        Command::Reindex { db_path } => {
            let store = GraphStore::open(db_path, base(StoreOptions::default()))?;
            let task = ui.task("rebuilding indexes");
            store.reindex()?;
            let elapsed = task.finish();
            let report = ReindexReport {
                path: db_path.display().to_string(),
                elapsed_ms: elapsed.as_secs_f64() * 1_000.0,
            };
            emit(format, &report, || {
                ui.success(&format!("reindexed {} in {}", report.path, format_duration(elapsed)))
            })?;
        }
        Command::Route(cmd) => {
            let store = GraphStore::open(&cmd.db_path, base(StoreOptions::read_only()))?;
            let (distance, path) = match &cmd.weight {
                Some(attr) => store.shortest_path(&cmd.sources, &cmd.target, costs::attribute(attr), cmd.cutoff)?,
                None => store.shortest_path(&cmd.sources, &cmd.target, costs::unit(), cmd.cutoff)?,
            };
            let report = RouteReport {
                target: cmd.target.clone(),
                weight: cmd.weight.clone(),
                distance,
                hops: path.len().saturating_sub(1),
                path,
            };
            emit(format, &report, || print_route_text(&ui, &report))?;
        }
        Command::Nearby(cmd) => {
            if !(cmd.distance.is_finite() && cmd.distance >= 0.0) {
                return Err(CliError::Message("--distance must be a non-negative number".into()));
            }
            let store = GraphStore::open(&cmd.db_path, base(StoreOptions::read_only()))?;
            let mut hits: Vec<NearbyHit> = if cmd.nodes {
                store
                    .nodes_within_distance(cmd.lon, cmd.lat, cmd.distance, cmd.sorted)?
                    .into_iter()
                    .map(|hit| NearbyHit {
                        key: Some(hit.key),
                        u: None,
                        v: None,
                        distance: hit.distance,
                        attrs: attrs_json(&hit.attrs),
                    })
                    .collect()
            } else {
                store
                    .edges_within_distance(cmd.lon, cmd.lat, cmd.distance, cmd.sorted)?
                    .into_iter()
                    .map(|hit| NearbyHit {
                        key: None,
                        u: Some(hit.u),
                        v: Some(hit.v),
                        distance: hit.distance,
                        attrs: attrs_json(&hit.attrs),
                    })
                    .collect()
            };
            if let Some(limit) = cmd.limit {
                hits.truncate(limit);
            }
            emit(format, &hits, || print_nearby_text(&ui, &hits, cmd))?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = if verbose > 0 {
        EnvFilter::new(default)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn apply_open_args(mut opts: StoreOptions, args: &OpenArgs) -> StoreOptions {
    if let Some(mode) = args.synchronous {
        opts = opts.synchronous(mode.into());
    }
    if let Some(kib) = args.cache_size_kib {
        opts = opts.cache_size_kib(kib);
    }
    opts
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), CliError>
where
    T: Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

/// Attributes without the geometry, which is too bulky for reports.
fn attrs_json(attrs: &Attrs) -> Value {
    let mut attrs = attrs.clone();
    attrs.set_geom(None);
    attrs.to_json()
}

#[derive(Debug, Serialize)]
struct InitReport {
    path: String,
    srid: i32,
    spatial_index: bool,
}

#[derive(Debug, Serialize)]
struct ImportReport {
    offered: usize,
    inserted: usize,
    ignored: usize,
    nodes_inserted: usize,
    batches: usize,
    columns_added: usize,
    elapsed_ms: f64,
}

#[derive(Debug, Serialize)]
struct ReindexReport {
    path: String,
    elapsed_ms: f64,
}

#[derive(Debug, Serialize)]
struct TableReport {
    name: String,
    geometry_type: String,
    srid: i32,
    rows: usize,
    spatial_index: bool,
    columns: Vec<String>,
}

#[derive(Debug, Serialize)]
struct InfoReport {
    path: String,
    nodes: usize,
    edges: usize,
    tables: Vec<TableReport>,
}

#[derive(Debug, Serialize)]
struct RouteReport {
    target: String,
    weight: Option<String>,
    distance: f64,
    hops: usize,
    path: Vec<String>,
}

#[derive(Debug, Serialize)]
struct NearbyHit {
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    u: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    v: Option<String>,
    distance: f64,
    attrs: Value,
}

fn info_report(store: &GraphStore, db_path: &std::path::Path) -> Result<InfoReport, CliError> {
    let mut tables = Vec::new();
    for def in store.container().feature_tables()? {
        let table = store.container().feature_table(&def.name)?;
        tables.push(TableReport {
            columns: table.columns()?.into_iter().map(|c| c.name).collect(),
            rows: table.len()?,
            spatial_index: table.has_spatial_index()?,
            name: def.name,
            geometry_type: def.geometry_type,
            srid: def.srid,
        });
    }
    Ok(InfoReport {
        path: db_path.display().to_string(),
        nodes: store.node_count()?,
        edges: store.size()?,
        tables,
    })
}

fn print_import_text(ui: &Ui, report: &ImportReport, started: Instant) {
    ui.success(&format!(
        "imported {} edges and {} nodes in {}",
        report.inserted,
        report.nodes_inserted,
        format_duration(started.elapsed())
    ));
    if report.ignored > 0 {
        ui.warn(&format!("{} edges already present were left untouched", report.ignored));
    }
    ui.section(
        "Import",
        [
            ("edges read", report.offered),
            ("batches", report.batches),
            ("columns added", report.columns_added),
        ],
    );
}

fn print_info_text(ui: &Ui, report: &InfoReport) {
    ui.section(
        "Graph",
        [
            ("path", report.path.clone()),
            ("nodes", report.nodes.to_string()),
            ("edges", report.edges.to_string()),
        ],
    );
    for table in &report.tables {
        ui.section(
            &format!("Table {}", table.name),
            [
                ("geometry", format!("{} (srid {})", table.geometry_type, table.srid)),
                ("rows", table.rows.to_string()),
                ("spatial index", table.spatial_index.to_string()),
                ("columns", table.columns.join(", ")),
            ],
        );
    }
}

fn print_route_text(ui: &Ui, report: &RouteReport) {
    let cost = report.weight.as_deref().unwrap_or("hops");
    ui.section(
        "Route",
        [
            ("target", report.target.clone()),
            (cost, report.distance.to_string()),
            ("hops", report.hops.to_string()),
        ],
    );
    ui.list("Path", report.path.iter().cloned());
}

fn print_nearby_text(ui: &Ui, hits: &[NearbyHit], cmd: &NearbyCmd) {
    if hits.is_empty() {
        ui.info(&format!(
            "nothing within {} of ({}, {})",
            cmd.distance, cmd.lon, cmd.lat
        ));
        return;
    }
    let entries = hits.iter().map(|hit| {
        let label = match (&hit.key, &hit.u, &hit.v) {
            (Some(key), _, _) => key.clone(),
            (None, Some(u), Some(v)) => format!("{u} -> {v}"),
            _ => String::from("?"),
        };
        format!("{label}  ({:.1})", hit.distance)
    });
    ui.list(if cmd.nodes { "Nodes" } else { "Edges" }, entries);
}
