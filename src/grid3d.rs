use crate::binning::GridBinning;
use crate::error::DepositError;
use crate::{Position, Scalar};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::{AddAssign, Index, IndexMut, Range};
use tracing::trace;

/// A dense 3d grid of single precision values, stored in row-major (C) order:
/// cell `[ix, iy, iz]` lives at `ix * ny * nz + iy * nz + iz`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid3d {
    shape: [usize; 3],
    data: Vec<f32>,
}

impl Grid3d {
    /// Allocates a zero filled grid, reporting allocation failure instead of aborting.
    pub fn zeros(shape: [usize; 3]) -> Result<Self, DepositError> {
        let num_cells = shape
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .ok_or(DepositError::Allocation { cells: usize::MAX })?;

        Ok(Grid3d {
            shape,
            data: zeroed_buffer(num_cells)?,
        })
    }

    /// Wraps a caller held buffer, e.g. a grid filled by an earlier snapshot, so that further
    /// depositions accumulate onto it.
    pub fn from_vec(shape: [usize; 3], data: Vec<f32>) -> Result<Self, DepositError> {
        let expected = shape.iter().try_fold(1usize, |acc, &n| acc.checked_mul(n));
        if expected != Some(data.len()) {
            return Err(DepositError::LengthMismatch {
                what: "grid data",
                expected: expected.unwrap_or(usize::MAX),
                found: data.len(),
            });
        }

        Ok(Grid3d { shape, data })
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    pub fn coord_to_index(&self, [ix, iy, iz]: [usize; 3]) -> usize {
        ix * self.shape[1] * self.shape[2] + iy * self.shape[2] + iz
    }

    pub fn get(&self, coord: [usize; 3]) -> Option<&f32> {
        if coord.iter().zip(&self.shape).any(|(&c, &n)| c >= n) {
            return None;
        }
        self.data.get(self.coord_to_index(coord))
    }

    /// Converts per-cell counts (or masses, with `particle_mass = 1`) into a density by
    /// dividing by the cell volume.
    pub fn density(&self, binning: &GridBinning, particle_mass: Scalar) -> Vec<Scalar> {
        let scale = particle_mass / binning.cell_volume();
        self.data.iter().map(|&c| c as Scalar * scale).collect()
    }
}

impl Index<[usize; 3]> for Grid3d {
    type Output = f32;

    fn index(&self, i: [usize; 3]) -> &Self::Output {
        if i.iter().zip(&self.shape).any(|(&c, &n)| c >= n) {
            panic!("Attempted to get index out of bounds: {:?}", i);
        }
        let index = self.coord_to_index(i);
        &self.data[index]
    }
}

impl IndexMut<[usize; 3]> for Grid3d {
    fn index_mut(&mut self, i: [usize; 3]) -> &mut Self::Output {
        if i.iter().zip(&self.shape).any(|(&c, &n)| c >= n) {
            panic!("Attempted to get index out of bounds: {:?}", i);
        }
        let index = self.coord_to_index(i);
        &mut self.data[index]
    }
}

pub(crate) fn zeroed_buffer<T: Clone + Default>(len: usize) -> Result<Vec<T>, DepositError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| DepositError::Allocation { cells: len })?;
    buffer.resize(len, T::default());
    Ok(buffer)
}

/// Adds one to the cell containing each particle. Particles outside of the grid on any axis
/// are dropped, not clamped.
///
/// `grid` must hold `binning.num_cells()` values. The step of each axis comes from the
/// binning alone, so the edges it was built from are assumed to be uniform.
pub fn grid3d(positions: &[Position], binning: &GridBinning, grid: &mut [f32]) {
    for p in positions {
        if let Some(i) = binning.cell_index(p) {
            grid[i] += 1.;
        }
    }
}

/// Like [`grid3d`], but adds `weights[p]` instead of one. `weights` must be as long as
/// `positions`.
pub fn grid3d_weighted(
    positions: &[Position],
    weights: &[f32],
    binning: &GridBinning,
    grid: &mut [f32],
) {
    for (p, &w) in positions.iter().zip(weights) {
        if let Some(i) = binning.cell_index(p) {
            grid[i] += w;
        }
    }
}

/// Parallel [`grid3d`] / [`grid3d_weighted`].
///
/// The particles are cut into `partitions` contiguous chunks, each deposited into a private
/// grid; the private grids are then summed in chunk order. The chunking depends only on the
/// number of particles, so the result does not depend on the number of worker threads.
/// At most one private grid per worker thread is alive at a time.
pub fn par_grid3d(
    positions: &[Position],
    weights: Option<&[f32]>,
    binning: &GridBinning,
    grid: &mut [f32],
    partitions: usize,
) -> Result<(), DepositError> {
    let num_particles = weights.map_or(positions.len(), |w| w.len().min(positions.len()));
    partitioned_deposit(
        num_particles,
        partitions,
        rayon::current_num_threads(),
        grid,
        |range, partial| match weights {
            Some(weights) => {
                grid3d_weighted(&positions[range.clone()], &weights[range], binning, partial)
            }
            None => grid3d(&positions[range], binning, partial),
        },
    )?;
    Ok(())
}

/// Number of particles per partition, never zero.
fn partition_size(num_particles: usize, partitions: usize) -> usize {
    let partitions = partitions.max(1);
    ((num_particles + partitions - 1) / partitions).max(1)
}

/// Runs `fill` on `partitions` contiguous particle ranges, each into its own zeroed buffer
/// of `output.len()` cells, and adds the buffers onto `output` in range order.
///
/// Ranges are processed in waves of at most `max_live`, reusing the same buffers, which are
/// all allocated before `output` is touched. Every cell receives its partial sums in range
/// order whatever `max_live` is, so the result only depends on `partitions`.
///
/// Returns the number of buffers allocated.
pub(crate) fn partitioned_deposit<T, F>(
    num_particles: usize,
    partitions: usize,
    max_live: usize,
    output: &mut [T],
    fill: F,
) -> Result<usize, DepositError>
where
    T: Copy + Default + Send + Sync + AddAssign,
    F: Fn(Range<usize>, &mut [T]) + Sync,
{
    let chunk_size = partition_size(num_particles, partitions);
    let ranges: Vec<Range<usize>> = (0..num_particles)
        .step_by(chunk_size)
        .map(|start| start..(start + chunk_size).min(num_particles))
        .collect();
    if ranges.is_empty() {
        return Ok(0);
    }

    let num_buffers = max_live.max(1).min(ranges.len());
    let num_cells = output.len();
    trace!(
        chunk_size,
        num_chunks = ranges.len(),
        num_buffers,
        "Depositing partitions"
    );

    let mut buffers = (0..num_buffers)
        .map(|_| zeroed_buffer(num_cells))
        .collect::<Result<Vec<Vec<T>>, DepositError>>()?;

    for (wave, wave_ranges) in ranges.chunks(num_buffers).enumerate() {
        let live = &mut buffers[..wave_ranges.len()];
        live.par_iter_mut()
            .zip(wave_ranges.par_iter())
            .for_each(|(partial, range)| {
                if wave > 0 {
                    partial.iter_mut().for_each(|c| *c = T::default());
                }
                fill(range.clone(), partial.as_mut_slice());
            });
        reduce_partials(live, output);
    }

    Ok(num_buffers)
}

/// Adds every partial buffer onto `output`, in order, cell by cell.
fn reduce_partials<T>(partials: &[Vec<T>], output: &mut [T])
where
    T: Copy + Send + Sync + AddAssign,
{
    output.par_iter_mut().enumerate().for_each(|(i, cell)| {
        for partial in partials {
            *cell += partial[i];
        }
    });
}
