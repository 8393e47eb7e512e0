//! Batch collation: stack per-patch tensors into one [N, C, H, W] tensor.

use ndarray::{stack, Array3, Array4, ArrayView3, Axis};

use crate::dataset::PatchDataset;
use crate::error::{CellvitError, Result};

#[derive(Debug, Clone)]
pub struct Batch<M> {
    pub patches: Array4<f32>,
    pub metadata: Vec<M>,
}

impl<M> Batch<M> {
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }
}

/// Unzip `(tensor, metadata)` pairs and stack the tensors in input order.
pub fn collate_batch<M>(items: Vec<(Array3<f32>, M)>) -> Result<Batch<M>> {
    let (patches, metadata): (Vec<_>, Vec<_>) = items.into_iter().unzip();
    let patches = stack_patches(&patches)?;
    Ok(Batch { patches, metadata })
}

/// Stack equally shaped tensors along a new leading axis.
pub fn stack_patches(patches: &[Array3<f32>]) -> Result<Array4<f32>> {
    let first = patches.first().ok_or(CellvitError::EmptyBatch)?;
    for (index, p) in patches.iter().enumerate().skip(1) {
        if p.shape() != first.shape() {
            return Err(CellvitError::ShapeMismatch {
                index,
                expected: first.shape().to_vec(),
                found: p.shape().to_vec(),
            });
        }
    }
    let views: Vec<ArrayView3<f32>> = patches.iter().map(|p| p.view()).collect();
    Ok(stack(Axis(0), &views)?)
}

/// Consecutive batches over a dataset; the last one may be short.
pub struct Batches<'a, D: PatchDataset> {
    dataset: &'a D,
    batch_size: usize,
    next: usize,
}

pub fn batches<D: PatchDataset>(dataset: &D, batch_size: usize) -> Result<Batches<'_, D>> {
    if batch_size == 0 {
        return Err(CellvitError::invalid_input("batch size must be positive"));
    }
    Ok(Batches {
        dataset,
        batch_size,
        next: 0,
    })
}

impl<D: PatchDataset> Iterator for Batches<'_, D> {
    type Item = Result<Batch<D::Meta>>;

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.dataset.len();
        if self.next >= len {
            return None;
        }
        let end = (self.next + self.batch_size).min(len);
        let items: Result<Vec<_>> = (self.next..end).map(|i| self.dataset.item(i)).collect();
        self.next = end;
        Some(items.and_then(collate_batch))
    }
}
