use std::{error::Error, path::PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use cyberspace::{
    alloc::{dlmalloc::DlHeap, manual::LibcHeap, BudgetHeap},
    alloc::ledger::Entry,
    graph::{self, Layout, LayoutParams, Snapshot},
    HeapAdapter, Workload, WorkloadConfig,
};
use log::info;

#[derive(Parser)]
#[command(version, about = "Record, replay and lay out heap allocation workloads")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a seeded workload, print what survived, then free everything
    Run(RunArgs),
    /// Lay out a snapshot written by `run --snapshot`
    Show(ShowArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum HeapKind {
    /// The process heap (`malloc()`/`free()`)
    Libc,
    /// A private dlmalloc arena
    Dlmalloc,
}

#[derive(Args)]
struct RunArgs {
    #[arg(long, default_value_t = 12345)]
    seed: u64,
    #[arg(short = 'n', long, default_value_t = 1000)]
    operations: usize,
    /// Drain and rerun this many times
    #[arg(long, default_value_t = 1)]
    rounds: usize,
    #[arg(long, value_enum, default_value_t = HeapKind::Libc)]
    heap: HeapKind,
    /// Refuse allocations once this many bytes are outstanding
    #[arg(long)]
    budget: Option<usize>,
    /// JSON workload config
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the final ledger to this file before draining
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Print where each surviving block would be drawn
    #[arg(long)]
    layout: bool,
    /// Print run reports as JSON lines
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    params: LayoutArgs,
}

#[derive(Args)]
struct ShowArgs {
    path: PathBuf,
    #[command(flatten)]
    params: LayoutArgs,
}

#[derive(Args)]
struct LayoutArgs {
    #[arg(long, default_value_t = LayoutParams::default().row_width)]
    row_width: usize,
    #[arg(long, default_value_t = LayoutParams::default().distance_scale)]
    distance_scale: f64,
    #[arg(long, default_value_t = LayoutParams::default().cube_scale)]
    cube_scale: f64,
    /// Mark one block, wrapping around the number of blocks
    #[arg(long)]
    select: Option<usize>,
}

impl From<&LayoutArgs> for LayoutParams {
    fn from(args: &LayoutArgs) -> Self {
        Self {
            row_width: args.row_width.max(1),
            distance_scale: args.distance_scale,
            cube_scale: args.cube_scale,
        }
    }
}

fn print_layout<I>(args: &LayoutArgs, entries: I)
where
    I: IntoIterator<Item = Entry>,
{
    let mut layout = Layout::new(LayoutParams::from(args));
    let placements = layout.place(entries);
    let selected = args
        .select
        .and_then(|index| graph::select(index, placements.len()));
    for placement in &placements {
        let marker = if selected == Some(placement.index) { '>' } else { ' ' };
        println!("{marker} {placement}");
    }
}

fn heap(kind: HeapKind, budget: Option<usize>) -> Box<dyn HeapAdapter> {
    match (kind, budget) {
        (HeapKind::Libc, None) => Box::new(LibcHeap),
        (HeapKind::Libc, Some(budget)) => Box::new(BudgetHeap::new(LibcHeap, budget)),
        (HeapKind::Dlmalloc, None) => Box::new(DlHeap::new()),
        (HeapKind::Dlmalloc, Some(budget)) => Box::new(BudgetHeap::new(DlHeap::new(), budget)),
    }
}

fn run(args: RunArgs) -> Result<(), Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => WorkloadConfig::from_file(path)?,
        None => WorkloadConfig::default(),
    };
    let mut workload = Workload::with_config(heap(args.heap, args.budget), config)?;

    for round in 0..args.rounds {
        info!("round {}/{}", round + 1, args.rounds);
        let report = workload.run(args.seed, args.operations);
        if args.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("{report}");
        }
    }

    if args.layout {
        print_layout(&args.params, workload.ledger().entries());
    }

    if let Some(path) = &args.snapshot {
        Snapshot::of(workload.ledger())
            .with_seed(args.seed)
            .write_to_file(path)?;
        println!("Wrote {} blocks to {}", workload.ledger().len(), path.display());
    }

    println!("Freeing all remaining {} blocks...", workload.tracker().len());
    workload.drain();
    println!("All memory freed.");
    Ok(())
}

fn show(args: ShowArgs) -> Result<(), Box<dyn Error>> {
    let snapshot = Snapshot::from_file(&args.path)?;
    if let Some(seed) = snapshot.seed {
        println!("Snapshot of seed {seed}");
    }
    println!(
        "{} blocks, {} bytes",
        snapshot.entries.len(),
        snapshot.total_bytes()
    );
    print_layout(&args.params, snapshot.entries);
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match Cli::parse().command {
        Command::Run(args) => run(args),
        Command::Show(args) => show(args),
    }
}
