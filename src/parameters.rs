use crate::kernels::KernelKind;
use crate::Scalar;
use serde::{Deserialize, Serialize};

/// Settings shared by every deposition call. None of them change which cells a particle
/// reaches; `multithreading` and `partitions` only change how the work is split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepositParameters {
    /// Deposit with rayon, through per-partition buffers summed at the end
    pub multithreading: bool,
    /// Number of particle partitions for the parallel path. Each partition holds a full copy
    /// of the output while it is being filled.
    pub partitions: usize,
    /// Smoothing kernel for the lensing plane
    pub kernel: KernelKind,
    /// Mass deposited by each particle on the lensing plane
    pub particle_mass: Scalar,
}

impl Default for DepositParameters {
    fn default() -> Self {
        DepositParameters {
            multithreading: true,
            partitions: 16,
            kernel: KernelKind::default(),
            particle_mass: 1.,
        }
    }
}

impl DepositParameters {
    pub fn sequential() -> Self {
        DepositParameters {
            multithreading: false,
            ..Default::default()
        }
    }
}
