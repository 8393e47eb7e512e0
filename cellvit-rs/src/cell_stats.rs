//! Per-patch cell type counts.
//! Columns: Patient-ID, Patch, [Label], Neoplastic, Inflammatory, Connective, Dead, Epithelial, UNK.

use clap::Args;
use std::fs;
use std::path::Path;

use crate::classes::CellClass;
use crate::error::{CellvitError, Result};
use crate::tables::{self, dir_name, CellDocument, CsvTable};

pub const TABLE_STEM: &str = "cell_stats";

/// Counter column order.
pub const COUNT_COLUMNS: [CellClass; 6] = [
    CellClass::Neoplastic,
    CellClass::Inflammatory,
    CellClass::Connective,
    CellClass::Dead,
    CellClass::Epithelial,
    CellClass::Unk,
];

#[derive(Args, Clone)]
pub struct CellStatsArgs {
    /// Folder whose subfolders each contain instance_segmentation.json
    #[arg(long, alias = "parent_folder")]
    pub parent_folder: Option<String>,
    /// Single instance_segmentation.json (ignored when --parent-folder is given)
    #[arg(long, alias = "json_file")]
    pub json_file: Option<String>,
    /// Write one combined CSV at the parent-folder level
    #[arg(long)]
    pub combine: bool,
    /// Label column value. Defaults to the name of the parent folder's parent in
    /// folder mode; omitted in single-file mode.
    #[arg(long)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellStatsRow {
    pub patient_id: String,
    pub patch: String,
    pub label: Option<String>,
    counts: [u32; 6],
}

impl CellStatsRow {
    pub fn count(&self, class: CellClass) -> u32 {
        self.counts[class.index()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellStatsTable {
    has_label: bool,
    pub rows: Vec<CellStatsRow>,
}

impl CellStatsTable {
    pub fn has_label(&self) -> bool {
        self.has_label
    }
}

impl CsvTable for CellStatsTable {
    fn header(&self) -> Vec<String> {
        let mut cols = vec!["Patient-ID".to_string(), "Patch".to_string()];
        if self.has_label {
            cols.push("Label".to_string());
        }
        cols.extend(COUNT_COLUMNS.iter().map(|c| c.name().to_string()));
        cols
    }

    fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|r| {
                let mut rec = vec![r.patient_id.clone(), r.patch.clone()];
                if self.has_label {
                    rec.push(r.label.clone().unwrap_or_default());
                }
                rec.extend(COUNT_COLUMNS.iter().map(|&c| r.count(c).to_string()));
                rec
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn concat(mut self, other: Self) -> Result<Self> {
        if self.has_label != other.has_label {
            return Err(CellvitError::SchemaMismatch {
                left: self.header(),
                right: other.header(),
            });
        }
        self.rows.extend(other.rows);
        Ok(self)
    }
}

/// One row per patch counting cells by stated type. Types outside the known
/// classes are an error.
pub fn cell_stats_table(
    doc: &CellDocument,
    patient_id: &str,
    label: Option<&str>,
) -> Result<CellStatsTable> {
    let mut rows = Vec::with_capacity(doc.len());
    for (patch, cells) in doc {
        let mut counts = [0u32; 6];
        for (cell_id, record) in cells {
            let class: CellClass =
                record
                    .cell_type
                    .parse()
                    .map_err(|_| CellvitError::UnknownCellType {
                        patch: patch.clone(),
                        cell: cell_id.clone(),
                        value: record.cell_type.clone(),
                    })?;
            counts[class.index()] += 1;
        }
        rows.push(CellStatsRow {
            patient_id: patient_id.to_string(),
            patch: patch.clone(),
            label: label.map(String::from),
            counts,
        });
    }
    Ok(CellStatsTable {
        has_label: label.is_some(),
        rows,
    })
}

/// Name of the directory above `parent`, used as the default label.
fn default_label(parent: &Path) -> Result<String> {
    let abs = fs::canonicalize(parent).map_err(|e| CellvitError::io(parent, e))?;
    abs.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            CellvitError::invalid_input(format!("{} has no parent folder", parent.display()))
        })
}

pub fn run(args: CellStatsArgs, progress: impl Fn(f64, &str)) -> Result<()> {
    if let Some(parent) = &args.parent_folder {
        let parent = Path::new(parent);
        let label = match &args.label {
            Some(l) => l.clone(),
            None => default_label(parent)?,
        };
        let build = |json_path: &Path, folder: &str| -> Result<CellStatsTable> {
            cell_stats_table(&tables::load_document(json_path)?, folder, Some(label.as_str()))
        };
        let out = tables::build_folder_tables(parent, TABLE_STEM, args.combine, build, &progress)?;
        progress(
            1.0,
            &format!("Wrote {} rows to {} file(s)", out.rows, out.written.len()),
        );
    } else if let Some(json_file) = &args.json_file {
        let json_path = Path::new(json_file);
        let dir = json_path.parent().unwrap_or(Path::new("."));
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        let patient_id = dir_name(dir)?;
        let table = cell_stats_table(
            &tables::load_document(json_path)?,
            &patient_id,
            args.label.as_deref(),
        )?;
        let stem = json_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| TABLE_STEM.to_string());
        let save_path = dir.join(format!("{}.csv", stem));
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::tests::{write_doc, SLIDE_A, SLIDE_B};
    use crate::tables::load_document;

    fn no_progress(_: f64, _: &str) {}

    #[test]
    fn counts_by_stated_type() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = load_document(&write_doc(tmp.path(), SLIDE_A)).unwrap();
        let table = cell_stats_table(&doc, "P01", None).unwrap();

        assert_eq!(table.len(), 2);
        let row = &table.rows[0];
        assert_eq!(row.patch, "patch_0_0");
        assert_eq!(row.count(CellClass::Neoplastic), 2);
        assert_eq!(row.count(CellClass::Dead), 1);
        for class in [
            CellClass::Inflammatory,
            CellClass::Connective,
            CellClass::Epithelial,
            CellClass::Unk,
        ] {
            assert_eq!(row.count(class), 0);
        }
        assert_eq!(table.rows[1].count(CellClass::Epithelial), 1);
    }

    #[test]
    fn counts_do_not_need_type_dist() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_doc(
            tmp.path(),
            r#"{"p": {"1": {"type": "Dead", "type_prob": 0.4}}}"#,
        );
        let table = cell_stats_table(&load_document(&path).unwrap(), "P02", None).unwrap();
        assert_eq!(table.rows[0].count(CellClass::Dead), 1);
    }

    #[test]
    fn label_column_only_when_supplied() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = load_document(&write_doc(tmp.path(), SLIDE_B)).unwrap();

        let plain = cell_stats_table(&doc, "P02", None).unwrap();
        assert_eq!(
            plain.header().join(","),
            "Patient-ID,Patch,Neoplastic,Inflammatory,Connective,Dead,Epithelial,UNK"
        );
        assert_eq!(plain.records()[0].join(","), "P02,patch_1_0,0,0,1,0,0,0");

        let labelled = cell_stats_table(&doc, "P02", Some("OSMF")).unwrap();
        assert_eq!(labelled.header()[2], "Label");
        assert_eq!(labelled.records()[0].join(","), "P02,patch_1_0,OSMF,0,0,1,0,0,0");

        assert!(matches!(
            plain.concat(labelled),
            Err(CellvitError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn unknown_type_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = load_document(&write_doc(
            tmp.path(),
            r#"{"p": {"4": {"type": "Stroma", "type_prob": 0.9}}}"#,
        ))
        .unwrap();
        match cell_stats_table(&doc, "P", None) {
            Err(CellvitError::UnknownCellType { patch, cell, value }) => {
                assert_eq!((patch.as_str(), cell.as_str(), value.as_str()), ("p", "4", "Stroma"));
            }
            other => panic!("expected unknown type error, got {:?}", other),
        }
    }

    #[test]
    fn combined_table_concatenates_in_folder_order() {
        let tmp = tempfile::tempdir().unwrap();
        let parent = tmp.path().join("OSCC").join("test");
        write_doc(&parent.join("P2"), SLIDE_B);
        write_doc(&parent.join("P1"), SLIDE_A);

        let args = CellStatsArgs {
            parent_folder: Some(parent.to_string_lossy().into_owned()),
            json_file: None,
            combine: true,
            label: None,
        };
        run(args, no_progress).unwrap();

        let text = fs::read_to_string(parent.join("cell_stats_test_combined.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Patient-ID,Patch,Label,Neoplastic,Inflammatory,Connective,Dead,Epithelial,UNK",
                "P1,patch_0_0,OSCC,2,0,0,1,0,0",
                "P1,patch_0_1,OSCC,0,0,0,0,1,0",
                "P2,patch_1_0,OSCC,0,0,1,0,0,0",
            ]
        );
    }

    #[test]
    fn per_folder_files_and_single_file_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let parent = tmp.path().join("NORMAL").join("train");
        write_doc(&parent.join("P1"), SLIDE_A);

        let args = CellStatsArgs {
            parent_folder: Some(parent.to_string_lossy().into_owned()),
            json_file: None,
            combine: false,
            label: Some("healthy".into()),
        };
        run(args, no_progress).unwrap();
        let text = fs::read_to_string(parent.join("P1/cell_stats_train.csv")).unwrap();
        assert!(text.lines().nth(1).unwrap().starts_with("P1,patch_0_0,healthy,"));

        let json = parent.join("P1").join(tables::DOCUMENT_FILE);
        let args = CellStatsArgs {
            parent_folder: None,
            json_file: Some(json.to_string_lossy().into_owned()),
            combine: false,
            label: None,
        };
        run(args, no_progress).unwrap();
        let text = fs::read_to_string(parent.join("P1/instance_segmentation.csv")).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("Patient-ID,Patch,Neoplastic,"));
        assert!(text.lines().nth(1).unwrap().starts_with("P1,patch_0_0,2,"));
    }
}
