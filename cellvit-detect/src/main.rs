use cellvit_rs::detect;
use clap::Parser;
use std::io::{self, Write};

#[derive(Parser)]
#[command(
    name = "cellvit-detect",
    about = "Run CellViT cell detection for every folder under a parent folder"
)]
struct Cli {
    #[command(flatten)]
    args: detect::DetectArgs,
}

fn progress(progress: f64, message: &str) {
    let _ = writeln!(
        io::stderr(),
        "{}",
        serde_json::json!({ "progress": progress, "message": message })
    );
    let _ = io::stderr().flush();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    cellvit_rs::init_tracing();
    let cli = Cli::parse();
    detect::run(cli.args, progress)?;
    Ok(())
}
