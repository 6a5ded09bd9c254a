use crate::grid3d::Grid3d;
use crate::plane::LensingPlane;
use crate::Scalar;

/// Summary numbers for a deposited grid, mostly for logging and sanity checks.
pub trait GridStatistics {
    /// Sum over all cells: the number of deposited particles, or their total mass.
    fn total(&self) -> Scalar;
    fn max_value(&self) -> Scalar;
    /// Number of cells holding a positive value.
    fn occupied_cells(&self) -> usize;
    fn mean(&self) -> Scalar;
}

impl GridStatistics for Grid3d {
    fn total(&self) -> Scalar {
        self.as_slice().iter().map(|&c| c as Scalar).sum()
    }

    fn max_value(&self) -> Scalar {
        self.as_slice()
            .iter()
            .map(|&c| c as Scalar)
            .fold(0., Scalar::max)
    }

    fn occupied_cells(&self) -> usize {
        self.as_slice().iter().filter(|&&c| c > 0.).count()
    }

    fn mean(&self) -> Scalar {
        mean(self.total(), self.as_slice().len())
    }
}

impl GridStatistics for LensingPlane {
    fn total(&self) -> Scalar {
        self.as_slice().iter().sum()
    }

    fn max_value(&self) -> Scalar {
        self.as_slice().iter().copied().fold(0., Scalar::max)
    }

    fn occupied_cells(&self) -> usize {
        self.as_slice().iter().filter(|&&c| c > 0.).count()
    }

    fn mean(&self) -> Scalar {
        mean(self.total(), self.as_slice().len())
    }
}

fn mean(total: Scalar, cells: usize) -> Scalar {
    if cells == 0 {
        0.
    } else {
        total / cells as Scalar
    }
}
