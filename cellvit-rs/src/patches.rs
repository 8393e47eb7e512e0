//! Walk a patch folder (or a patched slide) through the dataset and collator,
//! reporting batch shapes. A dry run of the data-supply side of inference.

use clap::Args;

use crate::collate::batches;
use crate::dataset::{PatchDataset, WsiPatchDataset};
use crate::error::Result;
use crate::patch_source::PatchSource;
use crate::transform::Normalize;
use crate::wsi::PatchedSlide;

#[derive(Args, Clone)]
pub struct PatchesArgs {
    /// Folder of .png patches, or a patched slide folder with --slide
    #[arg(long)]
    pub input: String,
    /// Treat input as a patched slide (patches/ and metadata/ subfolders)
    #[arg(long)]
    pub slide: bool,
    /// Slide-level label for patches without one in their metadata
    #[arg(long, default_value_t = 0)]
    pub label: i64,
    #[arg(long, alias = "batch_size", default_value_t = 8)]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalkSummary {
    pub patches: usize,
    pub batches: usize,
    pub shape: Option<Vec<usize>>,
}

/// Collate every batch of `dataset`, failing on the first bad batch.
pub fn walk<D: PatchDataset>(
    dataset: &D,
    batch_size: usize,
    progress: &impl Fn(f64, &str),
) -> Result<WalkSummary> {
    let total = dataset.len();
    let mut summary = WalkSummary::default();
    for batch in batches(dataset, batch_size)? {
        let batch = batch?;
        summary.patches += batch.len();
        summary.batches += 1;
        summary.shape = Some(batch.patches.shape()[1..].to_vec());
        progress(
            summary.patches as f64 / total as f64,
            &format!(
                "Batch {} {:?} ({}/{} patches)",
                summary.batches,
                batch.patches.shape(),
                summary.patches,
                total
            ),
        );
    }
    Ok(summary)
}

pub fn run(args: PatchesArgs, progress: impl Fn(f64, &str)) -> Result<()> {
    let summary = if args.slide {
        let slide = PatchedSlide::open(&args.input, args.label)?;
        let dataset = WsiPatchDataset::new(slide, Box::new(Normalize::default()))?;
        walk(&dataset, args.batch_size, &progress)?
    } else {
        let source = PatchSource::open(&args.input, Some(Box::new(Normalize::default())))?;
        walk(&source, args.batch_size, &progress)?
    };
    progress(
        1.0,
        &format!(
            "{} patches in {} batch(es), patch shape {:?}",
            summary.patches, summary.batches, summary.shape
        ),
    );
    Ok(())
}
