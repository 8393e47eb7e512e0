//! Per-cell probability distribution table.
//! Columns: patch_name, cell_id, UNK..Epithelial, type, type_prob.

use clap::Args;
use std::path::{Path, PathBuf};

use crate::classes::{CellClass, ClassDistribution};
use crate::error::{CellvitError, Result};
use crate::tables::{self, CellDocument, CsvTable};

pub const DEFAULT_PROB_THRESHOLD: f64 = 0.8;
pub const UNCLASSIFIED: &str = "unclassified";
pub const TABLE_STEM: &str = "cell_prob_dist";
pub const SINGLE_FILE_OUTPUT: &str = "instance_cell_prob_dist.csv";

#[derive(Args, Clone)]
pub struct ProbDistArgs {
    /// Folder whose subfolders each contain instance_segmentation.json
    #[arg(long, alias = "parent_folder")]
    pub parent_folder: Option<String>,
    /// Single instance_segmentation.json (ignored when --parent-folder is given)
    #[arg(long, alias = "json_file")]
    pub json_file: Option<String>,
    /// Write one combined CSV at the parent-folder level
    #[arg(long)]
    pub combine: bool,
    /// Cells with type_prob below this are reported as unclassified
    #[arg(long, default_value_t = DEFAULT_PROB_THRESHOLD)]
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbDistRow {
    pub patch_name: String,
    pub cell_id: String,
    pub distribution: ClassDistribution,
    pub outcome: String,
    pub type_prob: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbDistTable {
    pub rows: Vec<ProbDistRow>,
}

impl CsvTable for ProbDistTable {
    fn header(&self) -> Vec<String> {
        let mut cols = vec!["patch_name".to_string(), "cell_id".to_string()];
        cols.extend(CellClass::ALL.iter().map(|c| c.name().to_string()));
        cols.push("type".to_string());
        cols.push("type_prob".to_string());
        cols
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|r| {
                let mut rec = vec![r.patch_name.clone(), r.cell_id.clone()];
                rec.extend(r.distribution.iter().map(|(_, p)| p.to_string()));
                rec.push(r.outcome.clone());
                rec.push(r.type_prob.to_string());
                rec
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn concat(mut self, other: Self) -> Result<Self> {
        self.rows.extend(other.rows);
        Ok(self)
    }
}

/// One row per cell. Records under `threshold` (strictly) get the
/// `unclassified` outcome; the document itself is left untouched. Every cell
/// must carry a `type_dist`.
pub fn prob_dist_table(doc: &CellDocument, threshold: f64) -> Result<ProbDistTable> {
    let mut rows = Vec::new();
    for (patch_name, cells) in doc {
        for (cell_id, record) in cells {
            let type_dist = record
                .type_dist
                .as_ref()
                .ok_or_else(|| CellvitError::MissingField {
                    patch: patch_name.clone(),
                    cell: cell_id.clone(),
                    field: "type_dist",
                })?;
            let outcome = if record.type_prob < threshold {
                UNCLASSIFIED.to_string()
            } else {
                record.cell_type.clone()
            };
            rows.push(ProbDistRow {
                patch_name: patch_name.clone(),
                cell_id: cell_id.clone(),
                distribution: ClassDistribution::from(type_dist),
                outcome,
                type_prob: record.type_prob,
            });
        }
    }
    Ok(ProbDistTable { rows })
}

pub fn run(args: ProbDistArgs, progress: impl Fn(f64, &str)) -> Result<()> {
    let threshold = args.threshold;
    let build = |json_path: &Path, _folder: &str| -> Result<ProbDistTable> {
        prob_dist_table(&tables::load_document(json_path)?, threshold)
    };

    if let Some(parent) = &args.parent_folder {
        let out = tables::build_folder_tables(
            Path::new(parent),
            TABLE_STEM,
            args.combine,
            build,
            &progress,
        )?;
        progress(
            1.0,
            &format!("Wrote {} rows to {} file(s)", out.rows, out.written.len()),
        );
    } else if let Some(json_file) = &args.json_file {
        let json_path = Path::new(json_file);
        let table = build(json_path, "")?;
        let save_path = json_path
            .parent()
            .map(|p| p.join(SINGLE_FILE_OUTPUT))
            .unwrap_or_else(|| PathBuf::from(SINGLE_FILE_OUTPUT));
        tables::write_csv(&table, &save_path)?;
        progress(
            1.0,
            &format!("Wrote {} rows to {}", table.len(), save_path.display()),
        );
    } else {
        return Err(CellvitError::invalid_input(
            "one of --parent-folder or --json-file is required",
        ));
    }
    Ok(())
}
