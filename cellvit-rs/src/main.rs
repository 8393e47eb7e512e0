use cellvit_rs::{cell_stats, detect, patches, prob_dist};
use clap::{Parser, Subcommand};
use std::io::{self, Write};

#[derive(Parser)]
#[command(
    name = "cellvit",
    about = "CellViT tooling: detect, sweep, prob-dist, cell-stats, patches"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detection script once per subfolder of --data-folder
    Detect(detect::DetectArgs),
    /// Run detection over every <root>/<split>/<class> folder
    Sweep(detect::SweepArgs),
    /// Per-cell class probability table
    ProbDist(prob_dist::ProbDistArgs),
    /// Per-patch cell type counts
    CellStats(cell_stats::CellStatsArgs),
    /// Load patches through the dataset and collator, reporting batch shapes
    Patches(patches::PatchesArgs),
}

fn progress(prog: f64, msg: &str) {
    let _ = writeln!(
        io::stderr(),
        "{}",
        serde_json::json!({"progress": prog, "message": msg})
    );
    let _ = io::stderr().flush();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    cellvit_rs::init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Detect(args) => detect::run(args, progress)?,
        Commands::Sweep(args) => detect::run_sweep(args, progress)?,
        Commands::ProbDist(args) => prob_dist::run(args, progress)?,
        Commands::CellStats(args) => cell_stats::run(args, progress)?,
        Commands::Patches(args) => patches::run(args, progress)?,
    }
    Ok(())
}
