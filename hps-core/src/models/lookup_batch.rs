//! Request and response halves of a lookup batch.

use crate::errors::{HpsError, HpsResult};

use super::Key;

/// A `[batch_size, width]` tensor of keys in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBatch<'a> {
    keys: &'a [Key],
    width: usize,
}

impl<'a> KeyBatch<'a> {
    /// Wrap a flat row-major key buffer with `width` keys per row.
    pub fn new(keys: &'a [Key], width: usize) -> Self {
        Self { keys, width }
    }

    /// A single row of keys.
    pub fn single_row(keys: &'a [Key]) -> Self {
        Self {
            keys,
            width: keys.len(),
        }
    }

    pub fn keys(&self) -> &'a [Key] {
        self.keys
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn shape_string(&self) -> String {
        if self.width == 0 || self.keys.len() % self.width != 0 {
            format!("{} keys with row width {}", self.keys.len(), self.width)
        } else {
            format!("[{}, {}]", self.keys.len() / self.width, self.width)
        }
    }

    /// Check this batch against a table's slot count and return the number
    /// of rows. Batches are never truncated or padded.
    pub fn validate(&self, slot_num: usize, max_batch_size: Option<usize>) -> HpsResult<usize> {
        if self.width != slot_num || self.width == 0 || self.keys.len() % self.width != 0 {
            return Err(HpsError::ShapeMismatch {
                expected: format!("[*, {slot_num}]"),
                actual: self.shape_string(),
            });
        }
        let rows = self.keys.len() / self.width;
        if let Some(max) = max_batch_size {
            if rows > max {
                return Err(HpsError::ShapeMismatch {
                    expected: format!("at most [{max}, {slot_num}]"),
                    actual: self.shape_string(),
                });
            }
        }
        Ok(rows)
    }
}

/// A `[batch_size, slot_num, dim]` tensor of vectors, positionally aligned
/// with the `KeyBatch` that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorBatch {
    data: Vec<f32>,
    batch_size: usize,
    slot_num: usize,
    dim: usize,
}

impl VectorBatch {
    /// Build from a flat buffer of `batch_size * slot_num * dim` floats.
    pub fn new(data: Vec<f32>, batch_size: usize, slot_num: usize, dim: usize) -> HpsResult<Self> {
        let expected = batch_size * slot_num * dim;
        if data.len() != expected {
            return Err(HpsError::ShapeMismatch {
                expected: format!("{expected} floats for [{batch_size}, {slot_num}, {dim}]"),
                actual: format!("{} floats", data.len()),
            });
        }
        Ok(Self {
            data,
            batch_size,
            slot_num,
            dim,
        })
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.batch_size, self.slot_num, self.dim]
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn slot_num(&self) -> usize {
        self.slot_num
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of vectors (one per input key).
    pub fn len(&self) -> usize {
        self.batch_size * self.slot_num
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Vector for the `i`-th key of the flattened input.
    pub fn vector(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Vector for `slot` of batch row `row`.
    pub fn get(&self, row: usize, slot: usize) -> &[f32] {
        self.vector(row * self.slot_num + slot)
    }

    /// Iterate vectors in input key order.
    pub fn vectors(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact(0) panics; an empty-dim batch has no vectors to yield.
        self.data.chunks_exact(self.dim.max(1))
    }

    /// One batch row flattened to `slot_num * dim` floats, the layout a
    /// dense network consumes.
    pub fn row(&self, row: usize) -> &[f32] {
        let width = self.slot_num * self.dim;
        &self.data[row * width..(row + 1) * width]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}
