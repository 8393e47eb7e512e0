//! Inference dataset over the patches of one WSI.

use ndarray::Array3;

use crate::error::{CellvitError, Result};
use crate::transform::Transform;
use crate::wsi::{PatchMetadata, WsiHandle};

/// Fixed-size, index-addressable collection of patch tensors.
pub trait PatchDataset {
    type Meta;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn item(&self, index: usize) -> Result<(Array3<f32>, Self::Meta)>;
}

pub struct WsiPatchDataset<W: WsiHandle> {
    wsi: W,
    transform: Box<dyn Transform>,
}

impl<W: WsiHandle> WsiPatchDataset<W> {
    /// Fails if the slide has not been patched yet.
    pub fn new(wsi: W, transform: Box<dyn Transform>) -> Result<Self> {
        if wsi.patched_slide_path().is_none() {
            return Err(CellvitError::Unpatched {
                slide: wsi.name().to_string(),
            });
        }
        Ok(Self { wsi, transform })
    }

    pub fn len(&self) -> usize {
        self.wsi.number_patches()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn handle(&self) -> &W {
        &self.wsi
    }

    pub fn get(&self, index: usize) -> Result<(Array3<f32>, PatchMetadata)> {
        let len = self.len();
        let patch_name = self
            .wsi
            .patches_list()
            .get(index)
            .filter(|_| index < len)
            .ok_or(CellvitError::IndexOutOfRange { index, len })?;
        self.wsi
            .process_patch_image(patch_name, self.transform.as_ref())
    }
}

impl<W: WsiHandle> PatchDataset for WsiPatchDataset<W> {
    type Meta = PatchMetadata;

    fn len(&self) -> usize {
        WsiPatchDataset::len(self)
    }

    fn item(&self, index: usize) -> Result<(Array3<f32>, PatchMetadata)> {
        self.get(index)
    }
}
