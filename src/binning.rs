use crate::error::DepositError;
use crate::util::spacing_deviation;
use crate::{Position, Scalar};
use num::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::ops::RangeInclusive;
use tracing::warn;

/// Relative deviation between bin widths above which edges are reported as non-uniform.
const UNIFORM_TOLERANCE: Scalar = 1e-6;

/// Binning along a single axis: `num_bins` half-open bins of width `step` starting at
/// `origin`. Bin `i` spans `[origin + i * step, origin + (i + 1) * step)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisBinning {
    pub origin: Scalar,
    pub step: Scalar,
    pub num_bins: usize,
}

impl AxisBinning {
    pub fn new(origin: Scalar, step: Scalar, num_bins: usize) -> Self {
        AxisBinning {
            origin,
            step,
            num_bins,
        }
    }

    /// Builds the binning for `edges`, which must hold at least two values.
    ///
    /// Only the first interval is used to derive the step: the edges are *assumed* to be
    /// uniformly spaced. Non-uniform edges are accepted (with a warning) and binned as if every
    /// bin had the width of the first one.
    pub fn from_edges(axis: usize, edges: &[Scalar]) -> Result<Self, DepositError> {
        if edges.len() < 2 {
            return Err(DepositError::TooFewEdges {
                axis,
                len: edges.len(),
            });
        }

        let origin = edges[0];
        let step = edges[1] - edges[0];
        if !origin.is_finite() || !step.is_finite() || step <= 0. {
            return Err(DepositError::InvalidEdges { axis });
        }

        let deviation = spacing_deviation(edges);
        if !(deviation <= UNIFORM_TOLERANCE) {
            warn!(
                axis,
                deviation, "Bin edges are not uniformly spaced, binning with the first interval"
            );
        }

        Ok(AxisBinning::new(origin, step, edges.len() - 1))
    }

    /// The upper edge of the last bin.
    pub fn end(&self) -> Scalar {
        self.origin + self.num_bins as Scalar * self.step
    }

    pub fn bin_center(&self, i: usize) -> Scalar {
        self.origin + (i as Scalar + 0.5) * self.step
    }

    /// Returns the bin containing `x`, or `None` if `x` falls outside of every bin.
    /// A coordinate exactly on an edge belongs to the bin above it.
    pub fn bin_index(&self, x: Scalar) -> Option<usize> {
        ((x - self.origin) / self.step)
            .floor()
            .to_usize()
            .filter(|&i| i < self.num_bins)
    }

    /// The bins touched by the interval `[x - reach, x + reach]`, clamped to the binning.
    /// Returns `None` if the interval misses every bin.
    pub fn footprint(&self, x: Scalar, reach: Scalar) -> Option<RangeInclusive<usize>> {
        let lo = ((x - reach - self.origin) / self.step).floor();
        let hi = ((x + reach - self.origin) / self.step).floor();

        // written so that NaNs end up here too
        if !(hi >= 0. && lo < self.num_bins as Scalar && lo <= hi) {
            return None;
        }

        let lo = lo.max(0.) as usize;
        let hi = hi.min((self.num_bins - 1) as Scalar) as usize;
        Some(lo..=hi)
    }
}

/// The three axis binnings of a [`Grid3d`](crate::Grid3d).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridBinning {
    pub axes: [AxisBinning; 3],
}

impl GridBinning {
    pub fn from_edges(edges: [&[Scalar]; 3]) -> Result<Self, DepositError> {
        Ok(GridBinning {
            axes: [
                AxisBinning::from_edges(0, edges[0])?,
                AxisBinning::from_edges(1, edges[1])?,
                AxisBinning::from_edges(2, edges[2])?,
            ],
        })
    }

    pub fn shape(&self) -> [usize; 3] {
        [
            self.axes[0].num_bins,
            self.axes[1].num_bins,
            self.axes[2].num_bins,
        ]
    }

    pub fn num_cells(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn cell_volume(&self) -> Scalar {
        self.axes.iter().map(|a| a.step).product()
    }

    /// Row-major index of the cell containing `p`, `None` if `p` is outside of the grid on
    /// any axis.
    pub fn cell_index(&self, p: &Position) -> Option<usize> {
        let [_, ny, nz] = self.shape();

        let ix = self.axes[0].bin_index(p.x as Scalar)?;
        let iy = self.axes[1].bin_index(p.y as Scalar)?;
        let iz = self.axes[2].bin_index(p.z as Scalar)?;

        Some(ix * ny * nz + iy * nz + iz)
    }
}

/// One of the three spatial coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn component(self, p: &Position) -> Scalar {
        p[self.index()] as Scalar
    }
}

impl TryFrom<usize> for Axis {
    type Error = DepositError;

    fn try_from(i: usize) -> Result<Self, Self::Error> {
        match i {
            0 => Ok(Axis::X),
            1 => Ok(Axis::Y),
            2 => Ok(Axis::Z),
            _ => Err(DepositError::InvalidAxis(i)),
        }
    }
}

/// Maps the three spatial coordinates onto a plane: `direction0` and `direction1` become the
/// plane's first and second axis, `normal` is projected out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub direction0: Axis,
    pub direction1: Axis,
    pub normal: Axis,
}

impl Projection {
    /// Validates that the three indices are a permutation of `{0, 1, 2}`.
    pub fn new(direction0: usize, direction1: usize, normal: usize) -> Result<Self, DepositError> {
        let projection = Projection {
            direction0: Axis::try_from(direction0)?,
            direction1: Axis::try_from(direction1)?,
            normal: Axis::try_from(normal)?,
        };

        if direction0 == direction1 || direction0 == normal || direction1 == normal {
            return Err(DepositError::InvalidProjection {
                direction0,
                direction1,
                normal,
            });
        }

        Ok(projection)
    }

    /// The projection along `normal`, keeping the two remaining axes in increasing order.
    pub fn along(normal: Axis) -> Self {
        let (direction0, direction1) = match normal {
            Axis::X => (Axis::Y, Axis::Z),
            Axis::Y => (Axis::X, Axis::Z),
            Axis::Z => (Axis::X, Axis::Y),
        };

        Projection {
            direction0,
            direction1,
            normal,
        }
    }

    /// Splits `p` into its in-plane coordinates and its coordinate along the normal.
    pub fn project(&self, p: &Position) -> ([Scalar; 2], Scalar) {
        (
            [self.direction0.component(p), self.direction1.component(p)],
            self.normal.component(p),
        )
    }
}

/// Where the lensing plane sits and which particles it collects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneGeometry {
    pub projection: Projection,
    /// Coordinate of the plane along the normal axis.
    pub center: Scalar,
    /// Project every particle regardless of its distance to the plane. Otherwise only
    /// particles whose smoothing sphere intersects the plane contribute.
    pub project_all: bool,
}
