//! Whole-slide images that were already tiled by the upstream patching step.
//!
//! On-disk layout of a patched slide:
//!
//! ```text
//! <slide>/patches/<patch>.png
//! <slide>/metadata/<patch>.yaml   (optional: row, col, label)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array3;
use regex::Regex;
use serde::Deserialize;

use crate::error::{CellvitError, Result};
use crate::patch_source::{list_files_with_extension, load_image, PATCH_EXTENSION};
use crate::transform::Transform;

/// Per-patch metadata handed to the inference loop alongside the tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchMetadata {
    pub row: String,
    pub col: String,
    pub file_name: String,
    pub label: i64,
    pub slide: String,
}

/// What a dataset needs from a WSI: tiles that can be materialized by name.
pub trait WsiHandle {
    fn name(&self) -> &str;

    /// None until the slide has been patched.
    fn patched_slide_path(&self) -> Option<&Path>;

    fn patches_list(&self) -> &[String];

    fn number_patches(&self) -> usize {
        self.patches_list().len()
    }

    fn process_patch_image(
        &self,
        patch_name: &str,
        transform: &dyn Transform,
    ) -> Result<(Array3<f32>, PatchMetadata)>;
}

#[derive(Debug, Deserialize)]
struct MetadataSidecar {
    row: serde_yaml::Value,
    col: serde_yaml::Value,
    #[serde(default)]
    label: Option<i64>,
}

const COORD_RE: &str = r"_(\d+)_(\d+)$";

#[derive(Debug, Clone)]
pub struct PatchedSlide {
    name: String,
    patched_slide_path: Option<PathBuf>,
    patches: Vec<String>,
    label: i64,
    coord_re: Regex,
}

impl PatchedSlide {
    /// Open a patched slide directory; patch ids are the sorted PNG stems under `patches/`.
    pub fn open(path: impl AsRef<Path>, label: i64) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let patches = list_files_with_extension(&path.join("patches"), PATCH_EXTENSION)?
            .into_iter()
            .map(|f| f.strip_suffix(PATCH_EXTENSION).unwrap_or(&f).to_string())
            .collect();
        Self::new(name, Some(path.to_path_buf()), patches, label)
    }

    pub fn new(
        name: impl Into<String>,
        patched_slide_path: Option<PathBuf>,
        patches: Vec<String>,
        label: i64,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            patched_slide_path,
            patches,
            label,
            coord_re: Regex::new(COORD_RE).map_err(|e| CellvitError::invalid_input(e.to_string()))?,
        })
    }

    /// A slide that has not been through the patching step.
    pub fn unpatched(name: impl Into<String>) -> Result<Self> {
        Self::new(name, None, Vec::new(), 0)
    }

    pub fn label(&self) -> i64 {
        self.label
    }

    fn slide_path(&self) -> Result<&Path> {
        self.patched_slide_path
            .as_deref()
            .ok_or_else(|| CellvitError::Unpatched {
                slide: self.name.clone(),
            })
    }

    fn read_metadata(&self, slide_path: &Path, patch_name: &str) -> Result<PatchMetadata> {
        let file_name = format!("{}{}", patch_name, PATCH_EXTENSION);
        let sidecar_path = slide_path
            .join("metadata")
            .join(format!("{}.yaml", patch_name));

        let (row, col, label) = if sidecar_path.is_file() {
            let text =
                fs::read_to_string(&sidecar_path).map_err(|e| CellvitError::io(&sidecar_path, e))?;
            let sidecar: MetadataSidecar =
                serde_yaml::from_str(&text).map_err(|source| CellvitError::Yaml {
                    path: sidecar_path.clone(),
                    source,
                })?;
            (
                yaml_scalar(&sidecar.row, patch_name)?,
                yaml_scalar(&sidecar.col, patch_name)?,
                sidecar.label.unwrap_or(self.label),
            )
        } else {
            let cap = self
                .coord_re
                .captures(patch_name)
                .ok_or_else(|| CellvitError::Metadata {
                    patch: patch_name.to_string(),
                    message: "no metadata sidecar and no _<row>_<col> suffix".to_string(),
                })?;
            (cap[1].to_string(), cap[2].to_string(), self.label)
        };

        Ok(PatchMetadata {
            row,
            col,
            file_name,
            label,
            slide: self.name.clone(),
        })
    }
}

fn yaml_scalar(value: &serde_yaml::Value, patch: &str) -> Result<String> {
    match value {
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::String(s) => Ok(s.clone()),
        other => Err(CellvitError::Metadata {
            patch: patch.to_string(),
            message: format!("coordinate is not a scalar: {:?}", other),
        }),
    }
}

impl WsiHandle for PatchedSlide {
    fn name(&self) -> &str {
        &self.name
    }

    fn patched_slide_path(&self) -> Option<&Path> {
        self.patched_slide_path.as_deref()
    }

    fn patches_list(&self) -> &[String] {
        &self.patches
    }

    fn process_patch_image(
        &self,
        patch_name: &str,
        transform: &dyn Transform,
    ) -> Result<(Array3<f32>, PatchMetadata)> {
        let slide_path = self.slide_path()?;
        let image_path = slide_path
            .join("patches")
            .join(format!("{}{}", patch_name, PATCH_EXTENSION));
        let image = load_image(&image_path)?;
        let tensor = transform.apply(&image)?;
        let metadata = self.read_metadata(slide_path, patch_name)?;
        Ok((tensor, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::ToTensor;
    use image::{Rgb, RgbImage};

    fn slide_fixture() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let slide = tmp.path().join("slide_07");
        fs::create_dir_all(slide.join("patches")).unwrap();
        fs::create_dir_all(slide.join("metadata")).unwrap();
        for name in ["slide_07_2_1", "slide_07_1_1"] {
            RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]))
                .save(slide.join("patches").join(format!("{name}.png")))
                .unwrap();
        }
        fs::write(
            slide.join("metadata").join("slide_07_2_1.yaml"),
            "row: 2\ncol: 1\nlabel: 3\nbackground_ratio: 0.1\n",
        )
        .unwrap();
        tmp
    }

    #[test]
    fn open_lists_patch_stems_in_order() {
        let tmp = slide_fixture();
        let slide = PatchedSlide::open(tmp.path().join("slide_07"), 1).unwrap();
        assert_eq!(slide.name(), "slide_07");
        assert_eq!(slide.patches_list(), &["slide_07_1_1", "slide_07_2_1"]);
        assert_eq!(slide.number_patches(), 2);
    }

    #[test]
    fn metadata_from_sidecar_or_file_name() {
        let tmp = slide_fixture();
        let slide = PatchedSlide::open(tmp.path().join("slide_07"), 1).unwrap();

        let (t, meta) = slide.process_patch_image("slide_07_2_1", &ToTensor).unwrap();
        assert_eq!(t.shape(), &[3, 8, 8]);
        assert_eq!(
            meta,
            PatchMetadata {
                row: "2".into(),
                col: "1".into(),
                file_name: "slide_07_2_1.png".into(),
                label: 3,
                slide: "slide_07".into(),
            }
        );

        let (_, meta) = slide.process_patch_image("slide_07_1_1", &ToTensor).unwrap();
        assert_eq!((meta.row.as_str(), meta.col.as_str()), ("1", "1"));
        assert_eq!(meta.label, 1);
    }

    #[test]
    fn only_one_extension_is_stripped_from_patch_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let slide_dir = tmp.path().join("odd");
        fs::create_dir_all(slide_dir.join("patches")).unwrap();
        fs::create_dir_all(slide_dir.join("metadata")).unwrap();
        RgbImage::new(4, 4)
            .save_with_format(slide_dir.join("patches").join("tile.png.png"), image::ImageFormat::Png)
            .unwrap();
        fs::write(slide_dir.join("metadata").join("tile.png.yaml"), "row: 3\ncol: 4\n").unwrap();

        let slide = PatchedSlide::open(&slide_dir, 0).unwrap();
        assert_eq!(slide.patches_list(), &["tile.png"]);
        let (t, meta) = slide.process_patch_image("tile.png", &ToTensor).unwrap();
        assert_eq!(t.shape(), &[3, 4, 4]);
        assert_eq!(meta.file_name, "tile.png.png");
        assert_eq!((meta.row.as_str(), meta.col.as_str()), ("3", "4"));
    }

    #[test]
    fn unpatched_slide_refuses_reads() {
        let slide = PatchedSlide::unpatched("raw").unwrap();
        assert!(slide.patched_slide_path().is_none());
        assert!(matches!(
            slide.process_patch_image("x_0_0", &ToTensor),
            Err(CellvitError::Unpatched { .. })
        ));
    }
}
