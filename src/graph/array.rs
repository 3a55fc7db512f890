//! Lazily evaluated `(x, y, channel)` arrays built from task nodes.

use std::ops::Range;

use ndarray::{s, Array3};

use crate::error::TileError;

use super::executor::Executor;
use super::task::Delayed;

#[derive(Debug, Clone)]
struct Block {
    node: Delayed,
    shape: [usize; 3],
}

/// A grid of deferred blocks forming one `u8` array.
///
/// Block `(bx, by)` covers `chunks[0][bx]` columns and `chunks[1][by]`
/// rows. Nothing is computed until [`LazyArray::compute`] or
/// [`LazyArray::compute_region`] is called.
#[derive(Debug, Clone)]
pub struct LazyArray {
    shape: [usize; 3],
    chunks: [Vec<usize>; 2],
    /// Indexed `bx * chunks[1].len() + by`
    blocks: Vec<Block>,
}

impl LazyArray {
    /// A single block whose value is declared to have `shape`.
    pub fn from_delayed(node: Delayed, shape: [usize; 3]) -> Self {
        Self {
            shape,
            chunks: [vec![shape[0]], vec![shape[1]]],
            blocks: vec![Block { node, shape }],
        }
    }

    /// Join `arrays` along `axis` (0 for x, 1 for y).
    ///
    /// The arrays must agree on the block extents of the other spatial axis
    /// and on the channel count.
    pub fn concatenate(arrays: &[LazyArray], axis: usize) -> Result<Self, TileError> {
        let first = arrays.first().ok_or(TileError::EmptyConcatenation)?;
        if axis > 1 {
            return Err(TileError::IncompatibleChunks {
                message: format!("cannot concatenate along axis {axis}"),
            });
        }
        let other = 1 - axis;

        for (i, array) in arrays.iter().enumerate().skip(1) {
            if array.shape[2] != first.shape[2] {
                return Err(TileError::IncompatibleChunks {
                    message: format!(
                        "array {i} has {} channels, expected {}",
                        array.shape[2], first.shape[2]
                    ),
                });
            }
            if array.chunks[other] != first.chunks[other] {
                return Err(TileError::IncompatibleChunks {
                    message: format!(
                        "array {i} has chunks {:?} on axis {other}, expected {:?}",
                        array.chunks[other], first.chunks[other]
                    ),
                });
            }
        }

        let mut shape = first.shape;
        shape[axis] = arrays.iter().map(|a| a.shape[axis]).sum();

        let mut chunks = first.chunks.clone();
        chunks[axis] = arrays
            .iter()
            .flat_map(|a| a.chunks[axis].iter().copied())
            .collect();

        let blocks = if axis == 0 {
            // Columns of blocks are contiguous, so x-concatenation appends
            arrays.iter().flat_map(|a| a.blocks.iter().cloned()).collect()
        } else {
            let columns = first.chunks[0].len();
            let mut blocks = Vec::with_capacity(arrays.iter().map(|a| a.blocks.len()).sum());
            for bx in 0..columns {
                for array in arrays {
                    let rows = array.chunks[1].len();
                    blocks.extend_from_slice(&array.blocks[bx * rows..(bx + 1) * rows]);
                }
            }
            blocks
        };

        Ok(Self {
            shape,
            chunks,
            blocks,
        })
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Block extents along x and y.
    pub fn chunks(&self) -> &[Vec<usize>; 2] {
        &self.chunks
    }

    /// `(blocks_x, blocks_y)`.
    pub fn num_blocks(&self) -> (usize, usize) {
        (self.chunks[0].len(), self.chunks[1].len())
    }

    pub fn block(&self, bx: usize, by: usize) -> Option<&Delayed> {
        let (nx, ny) = self.num_blocks();
        if bx >= nx || by >= ny {
            return None;
        }
        self.blocks.get(bx * ny + by).map(|b| &b.node)
    }

    /// Materialise the whole array.
    pub async fn compute(&self, executor: &Executor) -> Result<Array3<u8>, TileError> {
        self.compute_region(0..self.shape[0], 0..self.shape[1], executor)
            .await
    }

    /// Materialise `x` by `y`, evaluating only the blocks it overlaps.
    pub async fn compute_region(
        &self,
        x: Range<usize>,
        y: Range<usize>,
        executor: &Executor,
    ) -> Result<Array3<u8>, TileError> {
        if x.start > x.end || y.start > y.end || x.end > self.shape[0] || y.end > self.shape[1] {
            return Err(TileError::RegionOutOfBounds {
                x0: x.start,
                x1: x.end,
                y0: y.start,
                y1: y.end,
                shape: self.shape,
            });
        }

        let mut out = Array3::<u8>::zeros((x.len(), y.len(), self.shape[2]));
        if out.is_empty() {
            return Ok(out);
        }

        let x_spans = overlapping(&self.chunks[0], &x);
        let y_spans = overlapping(&self.chunks[1], &y);
        let ny = self.chunks[1].len();

        let mut wanted = Vec::with_capacity(x_spans.len() * y_spans.len());
        for xs in &x_spans {
            for ys in &y_spans {
                wanted.push((xs.clone(), ys.clone(), &self.blocks[xs.index * ny + ys.index]));
            }
        }

        let nodes: Vec<Delayed> = wanted.iter().map(|(_, _, b)| b.node.clone()).collect();
        let values = executor.compute_all(&nodes).await?;

        for ((xs, ys, block), value) in wanted.iter().zip(values) {
            let actual: [usize; 3] = value.dim().into();
            if actual != block.shape {
                return Err(TileError::ShapeMismatch {
                    expected: block.shape,
                    actual,
                });
            }
            out.slice_mut(s![xs.out.clone(), ys.out.clone(), ..])
                .assign(&value.slice(s![xs.local.clone(), ys.local.clone(), ..]));
        }

        Ok(out)
    }
}

/// Where one block meets a requested range, along one axis.
#[derive(Debug, Clone)]
struct Span {
    index: usize,
    /// Range within the block
    local: Range<usize>,
    /// Range within the output
    out: Range<usize>,
}

fn overlapping(chunks: &[usize], range: &Range<usize>) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (index, &len) in chunks.iter().enumerate() {
        let end = start + len;
        let lo = range.start.max(start);
        let hi = range.end.min(end);
        if lo < hi {
            spans.push(Span {
                index,
                local: lo - start..hi - start,
                out: lo - range.start..hi - range.start,
            });
        }
        start = end;
    }
    spans
}
