//! Standalone patch folder: every `.png` in one directory, indexed in sorted order.
//!
//! Unlike [`crate::dataset::WsiPatchDataset`], items carry no metadata; callers
//! that need coordinates use [`PatchSource::names`].

use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use ndarray::Array3;

use crate::dataset::PatchDataset;
use crate::error::{CellvitError, Result};
use crate::transform::{ToTensor, Transform};

pub const PATCH_EXTENSION: &str = ".png";

pub struct PatchSource {
    dir: PathBuf,
    transform: Option<Box<dyn Transform>>,
    names: Vec<String>,
}

impl PatchSource {
    pub fn open(dir: impl AsRef<Path>, transform: Option<Box<dyn Transform>>) -> Result<Self> {
        Self::with_extension(dir, PATCH_EXTENSION, transform)
    }

    pub fn with_extension(
        dir: impl AsRef<Path>,
        extension: &str,
        transform: Option<Box<dyn Transform>>,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let names = list_files_with_extension(&dir, extension)?;
        tracing::debug!("{}: {} patch file(s)", dir.display(), names.len());
        Ok(Self {
            dir,
            transform,
            names,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, index: usize) -> Result<Array3<f32>> {
        let name = self.names.get(index).ok_or(CellvitError::IndexOutOfRange {
            index,
            len: self.names.len(),
        })?;
        let image = load_image(&self.dir.join(name))?;
        match &self.transform {
            Some(t) => t.apply(&image),
            None => ToTensor.apply(&image),
        }
    }
}

impl PatchDataset for PatchSource {
    type Meta = ();

    fn len(&self) -> usize {
        PatchSource::len(self)
    }

    fn item(&self, index: usize) -> Result<(Array3<f32>, ())> {
        Ok((self.get(index)?, ()))
    }
}

pub(crate) fn load_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|source| CellvitError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Regular files in `dir` whose name ends in `extension`, sorted.
pub(crate) fn list_files_with_extension(dir: &Path, extension: &str) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|e| CellvitError::io(dir, e))?;
    let mut names: Vec<String> = entries
        .filter_map(|e| {
            let e = e.ok()?;
            if !e.file_type().ok()?.is_file() {
                return None;
            }
            let name = e.file_name().to_str().map(String::from)?;
            name.ends_with(extension).then_some(name)
        })
        .collect();
    names.sort();
    Ok(names)
}
