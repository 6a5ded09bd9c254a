use crate::Scalar;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Number of samples of the line-of-sight integrated kernel over `q ∈ [0, 1]`.
const PROJECTED_TABLE_SIZE: usize = 1025;
/// Simpson intervals used to integrate the kernel along the line of sight. Must be even.
const LINE_OF_SIGHT_STEPS: usize = 64;

/// A radially symmetric 3D smoothing kernel with compact support `h`:
///
/// W(r, h) = NORMALIZATION / h³ · profile(r / h)
///
/// normalized so that its integral over the support sphere is 1.
pub trait SmoothingKernel {
    const NORMALIZATION: Scalar;

    /// The dimensionless shape of the kernel, zero for `q >= 1`.
    fn profile(q: Scalar) -> Scalar;

    fn value(r: Scalar, h: Scalar) -> Scalar {
        if h > 0. {
            Self::NORMALIZATION / (h * h * h) * Self::profile(r / h)
        } else {
            0.
        }
    }
}

/// The M4 cubic spline, with compact support `h` (Monaghan & Lattanzio 1985, in the
/// convention used by Gadget).
pub struct CubicSplineKernel;

impl SmoothingKernel for CubicSplineKernel {
    const NORMALIZATION: Scalar = 8. / PI;

    fn profile(q: Scalar) -> Scalar {
        let q = q.abs();
        if q < 0.5 {
            1. - 6. * q * q + 6. * q * q * q
        } else if q < 1. {
            let a = 1. - q;
            2. * a * a * a
        } else {
            0.
        }
    }
}

pub struct Poly6Kernel;

impl SmoothingKernel for Poly6Kernel {
    const NORMALIZATION: Scalar = 315. / (64. * PI);

    fn profile(q: Scalar) -> Scalar {
        let q2 = q * q;
        if q2 < 1. {
            let a = 1. - q2;
            a * a * a
        } else {
            0.
        }
    }
}

/// Runtime selection of the smoothing kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelKind {
    CubicSpline,
    Poly6,
}

impl Default for KernelKind {
    fn default() -> Self {
        KernelKind::CubicSpline
    }
}

impl KernelKind {
    pub fn value(self, r: Scalar, h: Scalar) -> Scalar {
        match self {
            KernelKind::CubicSpline => CubicSplineKernel::value(r, h),
            KernelKind::Poly6 => Poly6Kernel::value(r, h),
        }
    }

    pub fn projected(self) -> ProjectedKernel {
        match self {
            KernelKind::CubicSpline => ProjectedKernel::new::<CubicSplineKernel>(),
            KernelKind::Poly6 => ProjectedKernel::new::<Poly6Kernel>(),
        }
    }
}

/// A 3D kernel integrated along the line of sight, giving the 2D surface profile of a
/// particle seen at projected distance `r`. The integral has no closed form for the cubic
/// spline, so it is tabulated once and linearly interpolated.
#[derive(Debug, Clone)]
pub struct ProjectedKernel {
    /// NORMALIZATION · ∫ profile(√(q² + s²)) ds, sampled uniformly in `q`
    table: Vec<Scalar>,
}

impl ProjectedKernel {
    pub fn new<K: SmoothingKernel>() -> Self {
        let last = (PROJECTED_TABLE_SIZE - 1) as Scalar;
        let table = (0..PROJECTED_TABLE_SIZE)
            .map(|i| K::NORMALIZATION * line_of_sight_integral::<K>(i as Scalar / last))
            .collect();

        ProjectedKernel { table }
    }

    pub fn value(&self, r: Scalar, h: Scalar) -> Scalar {
        if !(h > 0.) {
            return 0.;
        }

        let q = r.abs() / h;
        if !(q < 1.) {
            return 0.;
        }

        let x = q * (PROJECTED_TABLE_SIZE - 1) as Scalar;
        let i = x.floor() as usize;
        let t = x - i as Scalar;

        ((1. - t) * self.table[i] + t * self.table[i + 1]) / (h * h)
    }
}

/// ∫ profile(√(q² + s²)) ds over the chord of the unit sphere at impact parameter `q`,
/// by composite Simpson.
fn line_of_sight_integral<K: SmoothingKernel>(q: Scalar) -> Scalar {
    let half_chord = (1. - q * q).max(0.).sqrt();
    if half_chord == 0. {
        return 0.;
    }

    let ds = half_chord / LINE_OF_SIGHT_STEPS as Scalar;
    let f = |s: Scalar| K::profile((q * q + s * s).sqrt());

    let interior: Scalar = (1..LINE_OF_SIGHT_STEPS)
        .map(|k| {
            let c = if k % 2 == 1 { 4. } else { 2. };
            c * f(k as Scalar * ds)
        })
        .sum();

    // the chord is symmetric about s = 0
    2. * ds / 3. * (f(0.) + interior + f(half_chord))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linspace;
    use approx::assert_relative_eq;

    /// Midpoint rule over `[0, 1)` in `n` steps.
    fn integrate<F: Fn(Scalar) -> Scalar>(f: F, n: usize) -> Scalar {
        let dx = 1. / n as Scalar;
        (0..n).map(|i| f((i as Scalar + 0.5) * dx) * dx).sum()
    }

    #[test]
    fn test_kernels_normalized_in_3d() {
        let h = 2.5;
        for kind in [KernelKind::CubicSpline, KernelKind::Poly6].iter() {
            let total = integrate(
                |q| {
                    let r = q * h;
                    4. * PI * r * r * kind.value(r, h) * h
                },
                20_000,
            );
            assert_relative_eq!(total, 1., epsilon = 1e-6);
        }
    }

    #[test]
    fn test_projected_kernel_normalized_in_2d() {
        let h = 0.7;
        for kind in [KernelKind::CubicSpline, KernelKind::Poly6].iter() {
            let projected = kind.projected();
            let total = integrate(
                |q| {
                    let r = q * h;
                    2. * PI * r * projected.value(r, h) * h
                },
                20_000,
            );
            assert_relative_eq!(total, 1., epsilon = 1e-3);
        }
    }

    #[test]
    fn test_projected_matches_direct_integration() {
        let h = 1.;
        let projected = KernelKind::CubicSpline.projected();

        for r in linspace(0., 0.95, 12) {
            let direct = integrate(
                |t| {
                    // t ∈ [0, 1) mapped onto z ∈ [-1, 1)
                    let z = 2. * t - 1.;
                    2. * CubicSplineKernel::value((r * r + z * z).sqrt(), h)
                },
                20_000,
            );
            assert_relative_eq!(projected.value(r, h), direct, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_compact_support() {
        assert_eq!(CubicSplineKernel::value(1., 1.), 0.);
        assert_eq!(Poly6Kernel::value(1.5, 1.), 0.);
        assert_eq!(CubicSplineKernel::value(0., 0.), 0.);
        assert_eq!(CubicSplineKernel::value(0., -1.), 0.);

        let projected = KernelKind::CubicSpline.projected();
        assert_eq!(projected.value(1., 1.), 0.);
        assert_eq!(projected.value(0., 0.), 0.);
        assert!(projected.value(0.99, 1.) >= 0.);
    }

    #[test]
    fn test_cubic_spline_continuous() {
        let below = CubicSplineKernel::profile(0.5 - 1e-9);
        let above = CubicSplineKernel::profile(0.5 + 1e-9);
        assert_relative_eq!(below, above, epsilon = 1e-6);
        assert_relative_eq!(CubicSplineKernel::profile(0.5), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_profiles_decrease() {
        let values: Vec<_> = linspace(0., 1., 50)
            .map(CubicSplineKernel::profile)
            .collect();
        assert!(values.windows(2).all(|w| w[1] <= w[0]));
    }
}
