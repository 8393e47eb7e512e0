//! Tooling around the CellViT pipeline: patch datasets and batch collation for
//! inference, a folder driver for the detection script, and CSV reports from
//! `instance_segmentation.json` cell documents.

pub mod cell_stats;
pub mod classes;
pub mod collate;
pub mod dataset;
pub mod detect;
pub mod driver;
pub mod error;
pub mod patch_source;
pub mod patches;
pub mod prob_dist;
pub mod tables;
pub mod transform;
pub mod wsi;

pub use error::{CellvitError, Result};

/// Install the stderr `tracing` subscriber. Filter via `RUST_LOG`, default `info`.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
