//! Cell documents (`instance_segmentation.json`) and the CSV tables built from them.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};

use crate::driver::list_subdirs;
use crate::error::{CellvitError, Result};

pub const DOCUMENT_FILE: &str = "instance_segmentation.json";

/// Classification output for one cell. Other fields (bbox, contour, ...) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct CellRecord {
    #[serde(rename = "type", deserialize_with = "string_or_number")]
    pub cell_type: String,
    pub type_prob: f64,
    /// Absent in some CellViT outputs; only the probability table needs it.
    #[serde(default)]
    pub type_dist: Option<HashMap<String, f64>>,
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// patch name -> cell id -> record, in file order.
pub type CellDocument = IndexMap<String, IndexMap<String, CellRecord>>;

pub fn load_document(path: &Path) -> Result<CellDocument> {
    let text = fs::read_to_string(path).map_err(|e| CellvitError::io(path, e))?;
    serde_json::from_str(&text).map_err(|source| CellvitError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// A fixed-schema row table that can be concatenated and written as CSV.
pub trait CsvTable: Sized {
    fn header(&self) -> Vec<String>;

    fn records(&self) -> Vec<Vec<String>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows of `self` followed by rows of `other`; schemas must agree.
    fn concat(self, other: Self) -> Result<Self>;
}

pub fn write_csv<T: CsvTable>(table: &T, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| CellvitError::csv_write(path, e))?;
    let csv_err = |e| CellvitError::csv_write(path, e);
    wtr.write_record(table.header()).map_err(csv_err)?;
    for record in table.records() {
        wtr.write_record(&record).map_err(csv_err)?;
    }
    wtr.flush().map_err(|e| CellvitError::io(path, e))?;
    Ok(())
}

/// Last path component, resolving `.`/`..` through the filesystem if needed.
pub(crate) fn dir_name(path: &Path) -> Result<String> {
    if let Some(name) = path.file_name() {
        return Ok(name.to_string_lossy().into_owned());
    }
    let abs = fs::canonicalize(path).map_err(|e| CellvitError::io(path, e))?;
    abs.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CellvitError::invalid_input(format!("{} has no name", path.display())))
}

#[derive(Debug, Default)]
pub struct FolderTables {
    pub written: Vec<PathBuf>,
    pub rows: usize,
}

/// Build one table per subdirectory of `parent` from its `instance_segmentation.json`.
///
/// With `combine`, tables are concatenated in folder order and written once to
/// `<parent>/<stem>_<root>_combined.csv`; otherwise each goes to
/// `<parent>/<folder>/<stem>_<root>.csv` as soon as it is built.
pub fn build_folder_tables<T, F>(
    parent: &Path,
    stem: &str,
    combine: bool,
    build: F,
    progress: &impl Fn(f64, &str),
) -> Result<FolderTables>
where
    T: CsvTable,
    F: Fn(&Path, &str) -> Result<T>,
{
    let root = dir_name(parent)?;
    let folders = list_subdirs(parent)?;
    let total = folders.len();
    let mut out = FolderTables::default();
    let mut combined: Option<T> = None;

    for (i, folder) in folders.iter().enumerate() {
        let json_path = parent.join(folder).join(DOCUMENT_FILE);
        tracing::info!("{}", json_path.display());
        let table = build(&json_path, &folder.to_string_lossy())?;
        out.rows += table.len();

        if combine {
            combined = Some(match combined {
                None => table,
                Some(acc) => acc.concat(table)?,
            });
        } else {
            let save_path = parent.join(folder).join(format!("{}_{}.csv", stem, root));
            write_csv(&table, &save_path)?;
            out.written.push(save_path);
        }

        progress(
            (i + 1) as f64 / total as f64,
            &format!("Built table {}/{}", i + 1, total),
        );
    }

    if combine {
        match combined {
            Some(table) => {
                let save_path = parent.join(format!("{}_{}_combined.csv", stem, root));
                write_csv(&table, &save_path)?;
                out.written.push(save_path);
            }
            None => tracing::warn!("no subfolders under {}, nothing to combine", parent.display()),
        }
    }
    Ok(out)
}
