//! Checked entry points: validate the arrays, allocate the output and run the matching
//! kernel. Every error is raised here, before the first particle is deposited.

use crate::binning::{AxisBinning, GridBinning, PlaneGeometry};
use crate::error::DepositError;
use crate::grid3d::{grid3d, grid3d_weighted, par_grid3d, Grid3d};
use crate::parameters::DepositParameters;
use crate::plane::{adaptive, par_adaptive, AdaptiveSmoothing, LensingPlane};
use crate::{Position, Scalar};
use tracing::debug;

/// Counts the particles falling in each cell of the grid spanned by `edges`, returning a
/// freshly allocated grid with `len(edges[a]) - 1` cells along each axis `a`.
///
/// The edges must be uniformly spaced: only their first interval is used.
pub fn deposit_uniform_grid_3d(
    positions: &[Position],
    edges: [&[Scalar]; 3],
    params: &DepositParameters,
) -> Result<Grid3d, DepositError> {
    let binning = GridBinning::from_edges(edges)?;
    let mut grid = Grid3d::zeros(binning.shape())?;
    run_grid3d(positions, None, &binning, &mut grid, params)?;
    Ok(grid)
}

/// Like [`deposit_uniform_grid_3d`], adding the counts onto the values already in `grid`.
pub fn deposit_uniform_grid_3d_into(
    positions: &[Position],
    edges: [&[Scalar]; 3],
    grid: &mut Grid3d,
    params: &DepositParameters,
) -> Result<(), DepositError> {
    let binning = GridBinning::from_edges(edges)?;
    check_grid_shape(&binning, grid)?;
    run_grid3d(positions, None, &binning, grid, params)
}

/// Sums `weights` (typically particle masses) per cell instead of counting particles.
pub fn deposit_weighted_grid_3d(
    positions: &[Position],
    weights: &[f32],
    edges: [&[Scalar]; 3],
    params: &DepositParameters,
) -> Result<Grid3d, DepositError> {
    check_len("weights", positions.len(), weights.len())?;
    let binning = GridBinning::from_edges(edges)?;
    let mut grid = Grid3d::zeros(binning.shape())?;
    run_grid3d(positions, Some(weights), &binning, &mut grid, params)?;
    Ok(grid)
}

pub fn deposit_weighted_grid_3d_into(
    positions: &[Position],
    weights: &[f32],
    edges: [&[Scalar]; 3],
    grid: &mut Grid3d,
    params: &DepositParameters,
) -> Result<(), DepositError> {
    check_len("weights", positions.len(), weights.len())?;
    let binning = GridBinning::from_edges(edges)?;
    check_grid_shape(&binning, grid)?;
    run_grid3d(positions, Some(weights), &binning, grid, params)
}

/// Projects the particles onto a freshly allocated lensing plane of shape
/// `(len(edges[0]) - 1, len(edges[1]) - 1)`, smoothing each one over `radii[p]`.
/// See [`adaptive`] for the smoothing rules.
pub fn deposit_adaptive_plane(
    positions: &[Position],
    radii: &[Scalar],
    edges: [&[Scalar]; 2],
    geometry: PlaneGeometry,
    params: &DepositParameters,
) -> Result<LensingPlane, DepositError> {
    check_len("smoothing radii", positions.len(), radii.len())?;

    let binning = [
        AxisBinning::from_edges(0, edges[0])?,
        AxisBinning::from_edges(1, edges[1])?,
    ];
    let smoothing =
        AdaptiveSmoothing::new(binning, geometry, params.kernel, params.particle_mass);
    let mut plane = LensingPlane::zeros(smoothing.shape())?;

    debug!(
        num_particles = positions.len(),
        shape = ?plane.shape(),
        ?geometry,
        multithreading = params.multithreading,
        "Depositing particles on lensing plane"
    );

    if params.multithreading {
        par_adaptive(
            positions,
            radii,
            &smoothing,
            plane.as_mut_slice(),
            params.partitions,
        )?;
    } else {
        adaptive(positions, radii, &smoothing, plane.as_mut_slice());
    }

    Ok(plane)
}

fn run_grid3d(
    positions: &[Position],
    weights: Option<&[f32]>,
    binning: &GridBinning,
    grid: &mut Grid3d,
    params: &DepositParameters,
) -> Result<(), DepositError> {
    debug!(
        num_particles = positions.len(),
        shape = ?grid.shape(),
        weighted = weights.is_some(),
        multithreading = params.multithreading,
        "Depositing particles on grid"
    );

    if params.multithreading {
        return par_grid3d(
            positions,
            weights,
            binning,
            grid.as_mut_slice(),
            params.partitions,
        );
    }

    match weights {
        Some(weights) => grid3d_weighted(positions, weights, binning, grid.as_mut_slice()),
        None => grid3d(positions, binning, grid.as_mut_slice()),
    }
    Ok(())
}

fn check_len(what: &'static str, expected: usize, found: usize) -> Result<(), DepositError> {
    if expected != found {
        return Err(DepositError::LengthMismatch {
            what,
            expected,
            found,
        });
    }
    Ok(())
}

fn check_grid_shape(binning: &GridBinning, grid: &Grid3d) -> Result<(), DepositError> {
    if binning.shape() != grid.shape() {
        return Err(DepositError::GridShapeMismatch {
            expected: binning.shape(),
            found: grid.shape(),
        });
    }
    Ok(())
}
