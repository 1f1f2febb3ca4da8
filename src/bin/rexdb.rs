//! Command-line driver: load CSV tables, run recursive queries under either
//! strategy with wall-clock timing, and generate synthetic datasets.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use eyre::{bail, ensure, Result, WrapErr};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rexdb::config::{DEFAULT_BENCH_RUNS, DEFAULT_PAGE_FETCH_MICROS};
use rexdb::datasets;
use rexdb::engine::Engine;
use rexdb::exec::{run_query, Strategy};
use rexdb::sql::parser::parse_queries;

#[derive(Parser)]
#[command(name = "rexdb", about = "Recursive query engine over simulated paged storage")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    Standard,
    Optimized,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Strategy {
        match arg {
            StrategyArg::Standard => Strategy::Standard,
            StrategyArg::Optimized => Strategy::Optimized,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Load every CSV in a directory and run a query file against it.
    Run {
        /// Directory of `<table>.csv` files.
        #[arg(long)]
        data: PathBuf,
        /// File holding one or more queries.
        #[arg(long)]
        queries: PathBuf,
        #[arg(long, value_enum, default_value = "optimized")]
        strategy: StrategyArg,
        /// Percentage of each table's rows to keep.
        #[arg(long, default_value_t = 100.0)]
        scale: f64,
        /// Timed runs per query (first run discarded as warmup).
        #[arg(long, default_value_t = DEFAULT_BENCH_RUNS)]
        runs: usize,
        /// Simulated fetch latency per buffer miss, in microseconds.
        #[arg(long, default_value_t = DEFAULT_PAGE_FETCH_MICROS)]
        fetch_micros: u64,
    },
    /// Write a synthetic dataset as CSV.
    Generate {
        #[arg(long, value_enum)]
        kind: DatasetKind,
        /// Node count for graphs, element count for permutations.
        #[arg(long)]
        n: usize,
        /// Edge count for graphs; defaults to 2n.
        #[arg(long)]
        edges: Option<usize>,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DatasetKind {
    Graph,
    Permutation,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    match Cli::parse().command {
        Command::Run {
            data,
            queries,
            strategy,
            scale,
            runs,
            fetch_micros,
        } => run(data, queries, strategy.into(), scale, runs, fetch_micros),
        Command::Generate {
            kind,
            n,
            edges,
            out,
            seed,
        } => generate(kind, n, edges, out, seed),
    }
}

fn run(
    data: PathBuf,
    queries_path: PathBuf,
    strategy: Strategy,
    scale: f64,
    runs: usize,
    fetch_micros: u64,
) -> Result<()> {
    ensure!(runs >= 1, "need at least one run");
    let engine = Engine::builder().page_fetch_micros(fetch_micros).build();

    let mut entries: Vec<PathBuf> = std::fs::read_dir(&data)
        .wrap_err_with(|| format!("reading data directory {}", data.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    entries.sort();
    ensure!(!entries.is_empty(), "no CSV files in {}", data.display());
    for path in &entries {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            bail!("unusable CSV file name {}", path.display());
        };
        let rows = datasets::load_csv_table(&engine, name, path, scale)?;
        info!(table = name, rows, "loaded");
    }

    let text = std::fs::read_to_string(&queries_path)
        .wrap_err_with(|| format!("reading query file {}", queries_path.display()))?;
    let queries = parse_queries(&text)?;

    for (query_no, query) in queries.iter().enumerate() {
        let mut timings = Vec::with_capacity(runs);
        let mut last_rows = 0;
        for run_no in 0..runs {
            let start = Instant::now();
            let outcome = run_query(&engine, query, strategy)?;
            let elapsed = start.elapsed();
            last_rows = outcome.total_rows;
            if run_no + 1 < runs {
                engine.drop_table(&outcome.result_table)?;
            }
            if run_no > 0 {
                timings.push(elapsed);
            }
            info!(
                query = query_no + 1,
                run = run_no + 1,
                ?elapsed,
                rows = outcome.total_rows,
                passes = outcome.passes.len(),
                "query run"
            );
        }
        let mean = if timings.is_empty() {
            Default::default()
        } else {
            timings.iter().sum::<std::time::Duration>() / timings.len() as u32
        };
        println!(
            "query {}: {} rows into '{}', mean {:?} over {} timed runs ({:?})",
            query_no + 1,
            last_rows,
            query.destination,
            mean,
            timings.len(),
            strategy
        );
    }
    Ok(())
}

fn generate(
    kind: DatasetKind,
    n: usize,
    edges: Option<usize>,
    out: PathBuf,
    seed: u64,
) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let pairs = match kind {
        DatasetKind::Graph => {
            datasets::random_edge_graph(&mut rng, n, edges.unwrap_or(n * 2))
        }
        DatasetKind::Permutation => datasets::random_permutation(&mut rng, n),
    };
    std::fs::write(&out, datasets::pairs_to_csv(&pairs))
        .wrap_err_with(|| format!("writing {}", out.display()))?;
    println!("wrote {} rows to {}", pairs.len(), out.display());
    Ok(())
}
