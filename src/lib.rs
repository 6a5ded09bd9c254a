//! Deposition of N-body particles onto regular grids and adaptively smoothed lensing planes.
//!
//! The two numerical kernels live in [`grid3d`] and [`plane`]. They assume their inputs are
//! well formed; the [`deposit`] module is the checked entry point that validates array shapes
//! and allocates the output buffers before handing off to a kernel.

pub mod binning;
pub mod deposit;
pub mod error;
pub mod grid3d;
pub mod initial_condition;
pub mod kernels;
pub mod parameters;
pub mod plane;
pub mod statistics;
mod util;

extern crate nalgebra as na;

pub use binning::{Axis, AxisBinning, PlaneGeometry, Projection};
pub use deposit::{
    deposit_adaptive_plane, deposit_uniform_grid_3d, deposit_uniform_grid_3d_into,
    deposit_weighted_grid_3d, deposit_weighted_grid_3d_into,
};
pub use error::DepositError;
pub use grid3d::Grid3d;
pub use parameters::DepositParameters;
pub use plane::LensingPlane;
pub use util::linspace;

/// Floating point type used for bin edges, smoothing radii and the lensing plane.
pub type Scalar = f64;

/// Particle positions, as stored in simulation snapshots.
pub type Position = na::Vector3<f32>;
