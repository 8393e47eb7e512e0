use clap::Args;
use std::path::PathBuf;

use crate::driver::{
    self, DriverConfig, ProcessRunner, SweepConfig, DEFAULT_BATCH_SIZE, DEFAULT_MODEL,
    DEFAULT_PYTHON, DEFAULT_SCRIPT_PATH, REPORT_FILE,
};
use crate::error::{CellvitError, Result};

/// Options shared by `detect` and `sweep`.
#[derive(Args, Clone)]
pub struct ScriptArgs {
    #[arg(long, alias = "batch_size", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
    /// Path to the cell detection script to run for every folder
    #[arg(long, alias = "script_path", default_value = DEFAULT_SCRIPT_PATH)]
    pub script_path: String,
    /// Model checkpoint passed as --model
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,
    #[arg(long, default_value_t = 0)]
    pub gpu: u32,
    /// Interpreter used to run the script
    #[arg(long, default_value = DEFAULT_PYTHON)]
    pub python: String,
    /// Where failed folders are listed, one per line
    #[arg(long, default_value = REPORT_FILE)]
    pub report: String,
}

#[derive(Args, Clone)]
pub struct DetectArgs {
    /// Parent folder; every subfolder holds the patches of one slide
    #[arg(long, alias = "data_folder")]
    pub data_folder: String,
    /// Output parent folder; results go to the same-named subfolder
    #[arg(long, alias = "out_folder")]
    pub out_folder: String,
    #[command(flatten)]
    pub script: ScriptArgs,
}

#[derive(Args, Clone)]
pub struct SweepArgs {
    /// Root of the split/class folder grid
    #[arg(long)]
    pub root: String,
    #[arg(long, value_delimiter = ',', default_values_t = driver::DEFAULT_SPLITS.map(String::from))]
    pub splits: Vec<String>,
    #[arg(long, value_delimiter = ',', default_values_t = driver::DEFAULT_CLASSES.map(String::from))]
    pub classes: Vec<String>,
    #[command(flatten)]
    pub script: ScriptArgs,
}

impl ScriptArgs {
    fn config(&self, data_folder: PathBuf, out_folder: PathBuf) -> Result<DriverConfig> {
        if self.batch_size == 0 {
            return Err(CellvitError::invalid_input("--batch-size must be positive"));
        }
        Ok(DriverConfig {
            data_folder,
            out_folder,
            batch_size: self.batch_size,
            script_path: PathBuf::from(&self.script_path),
            model: PathBuf::from(&self.model),
            gpu: self.gpu,
            python: PathBuf::from(&self.python),
            report_path: PathBuf::from(&self.report),
        })
    }
}

pub fn run(args: DetectArgs, progress: impl Fn(f64, &str)) -> Result<()> {
    let config = args.script.config(
        PathBuf::from(&args.data_folder),
        PathBuf::from(&args.out_folder),
    )?;
    tracing::info!(
        "detect: {} -> {} (batch size {})",
        config.data_folder.display(),
        config.out_folder.display(),
        config.batch_size
    );
    let report = driver::run_folders(&config, &mut ProcessRunner::new(), progress)?;
    if !report.failed.is_empty() {
        tracing::warn!("{} folder(s) failed: {:?}", report.failed.len(), report.failed);
    }
    Ok(())
}

pub fn run_sweep(args: SweepArgs, progress: impl Fn(f64, &str)) -> Result<()> {
    let root = PathBuf::from(&args.root);
    let template = args.script.config(root.clone(), root.clone())?;
    let sweep = SweepConfig {
        root,
        splits: args.splits,
        classes: args.classes,
    };
    let report = driver::run_sweep(&sweep, &template, &mut ProcessRunner::new(), progress)?;
    tracing::info!(
        "sweep: {} invocation(s), {} failure(s)",
        report.invoked,
        report.failed.len()
    );
    Ok(())
}
