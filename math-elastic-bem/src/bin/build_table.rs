//! Offline construction of near-field interpolation tables
//!
//! Usage:
//!   cargo run --release --bin build_table -- --kernel H --class coincident --output tables
//!   cargo run --release --bin build_table -- --config nearfield.toml --nodes 12,5 --class edge
//!   cargo run --release --bin build_table -- --help

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use math_audio_elastic_bem::core::integration::SingularClass;
use math_audio_elastic_bem::core::io::native::{NearfieldConfig, load_config};
use math_audio_elastic_bem::core::kernels::KernelKind;
use math_audio_elastic_bem::core::parallel;
use math_audio_elastic_bem::core::table::{TableBuilder, save_table, table_path};

#[derive(Parser, Debug)]
#[command(name = "build_table")]
#[command(about = "Build Chebyshev interpolation tables of singular elasticity integrals", long_about = None)]
struct Args {
    /// Kernels to tabulate (U, T, A, H); all four when omitted
    #[arg(short, long, value_delimiter = ',')]
    kernel: Vec<KernelKind>,

    /// Table classes (coincident, edge); both when omitted
    #[arg(short = 'C', long, value_delimiter = ',')]
    class: Vec<SingularClass>,

    /// Node counts per axis, e.g. 8,8,5 for coincident or 12,5 for edge
    #[arg(short, long, value_delimiter = ',')]
    nodes: Option<Vec<usize>>,

    /// Output directory (defaults to the configured table directory, then `tables`)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON or TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Lower end of the Poisson ratio axis
    #[arg(long)]
    nu_min: Option<f64>,

    /// Upper end of the Poisson ratio axis
    #[arg(long)]
    nu_max: Option<f64>,

    /// Number of parallel threads (default: all cores)
    #[arg(short = 't', long)]
    threads: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if let Some(threads) = args.threads {
        #[cfg(feature = "native")]
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to set up the thread pool")?;
        #[cfg(not(feature = "native"))]
        log::warn!("--threads {} ignored: built without the native feature", threads);
    }

    log::info!(
        "Node integrals run {}",
        if parallel::is_parallel_available() { "in parallel" } else { "sequentially" }
    );

    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => NearfieldConfig::default(),
    };
    if let Some(lo) = args.nu_min {
        config.table.poisson_range[0] = lo;
    }
    if let Some(hi) = args.nu_max {
        config.table.poisson_range[1] = hi;
    }
    config.validate().context("invalid configuration")?;

    let kernels = if args.kernel.is_empty() {
        KernelKind::ALL.to_vec()
    } else {
        args.kernel.clone()
    };
    let classes = if args.class.is_empty() {
        vec![SingularClass::Coincident, SingularClass::EdgeAdjacent]
    } else {
        args.class.clone()
    };
    if args.nodes.is_some() && classes.len() > 1 {
        bail!("--nodes needs a single --class");
    }
    let output = args
        .output
        .clone()
        .or_else(|| config.table.directory.clone())
        .unwrap_or_else(|| PathBuf::from("tables"));

    println!("math-audio-elastic-bem {}", math_audio_elastic_bem::VERSION);
    let evaluator = config.cpu_evaluator()?;
    let builder = TableBuilder::new(&config, &evaluator)?;

    for &class in &classes {
        let sizes = args.nodes.clone().unwrap_or_else(|| config.table.nodes(class));
        for &kernel in &kernels {
            let table = builder
                .build(kernel, class, &sizes)
                .with_context(|| format!("failed to build the {} {} table", kernel, class))?;
            let path = table_path(&output, &table);
            save_table(&table, &path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!(
                "{} {}: {} nodes, {} diverged -> {}",
                kernel,
                class,
                table.grid_len(),
                table.meta().diverged_nodes,
                path.display()
            );
        }
    }

    Ok(())
}
