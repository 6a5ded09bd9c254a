use crate::binning::{AxisBinning, PlaneGeometry};
use crate::error::DepositError;
use crate::grid3d::{partitioned_deposit, zeroed_buffer};
use crate::kernels::{KernelKind, ProjectedKernel};
use crate::{Position, Scalar};
use itertools::iproduct;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// A dense 2d grid of double precision values in row-major order: pixel `[i, j]` lives at
/// `i * size1 + j`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LensingPlane {
    shape: [usize; 2],
    data: Vec<Scalar>,
}

impl LensingPlane {
    pub fn zeros(shape: [usize; 2]) -> Result<Self, DepositError> {
        let num_cells = shape[0]
            .checked_mul(shape[1])
            .ok_or(DepositError::Allocation { cells: usize::MAX })?;

        Ok(LensingPlane {
            shape,
            data: zeroed_buffer(num_cells)?,
        })
    }

    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    pub fn as_slice(&self) -> &[Scalar] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [Scalar] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<Scalar> {
        self.data
    }

    pub fn coord_to_index(&self, [i, j]: [usize; 2]) -> usize {
        i * self.shape[1] + j
    }

    /// Divides every pixel by its area, turning deposited mass into surface density.
    pub fn surface_density(&self, binning: &[AxisBinning; 2]) -> Vec<Scalar> {
        let area = binning[0].step * binning[1].step;
        self.data.iter().map(|m| m / area).collect()
    }
}

impl Index<[usize; 2]> for LensingPlane {
    type Output = Scalar;

    fn index(&self, i: [usize; 2]) -> &Self::Output {
        if i[0] >= self.shape[0] || i[1] >= self.shape[1] {
            panic!("Attempted to get index out of bounds: {:?}", i);
        }
        let index = self.coord_to_index(i);
        &self.data[index]
    }
}

impl IndexMut<[usize; 2]> for LensingPlane {
    fn index_mut(&mut self, i: [usize; 2]) -> &mut Self::Output {
        if i[0] >= self.shape[0] || i[1] >= self.shape[1] {
            panic!("Attempted to get index out of bounds: {:?}", i);
        }
        let index = self.coord_to_index(i);
        &mut self.data[index]
    }
}

/// Everything [`adaptive`] needs besides the particles themselves.
#[derive(Debug, Clone)]
pub struct AdaptiveSmoothing {
    pub binning: [AxisBinning; 2],
    pub geometry: PlaneGeometry,
    kernel: KernelKind,
    /// Mass carried by each particle.
    pub particle_mass: Scalar,
    projected: ProjectedKernel,
}

impl AdaptiveSmoothing {
    pub fn new(
        binning: [AxisBinning; 2],
        geometry: PlaneGeometry,
        kernel: KernelKind,
        particle_mass: Scalar,
    ) -> Self {
        AdaptiveSmoothing {
            binning,
            geometry,
            kernel,
            particle_mass,
            projected: kernel.projected(),
        }
    }

    pub fn kernel(&self) -> KernelKind {
        self.kernel
    }

    /// Switches kernel, retabulating its line-of-sight projection.
    pub fn set_kernel(&mut self, kernel: KernelKind) {
        self.kernel = kernel;
        self.projected = kernel.projected();
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.binning[0].num_bins, self.binning[1].num_bins]
    }

    /// Kernel weight of a pixel at in-plane distance `r` from a particle with smoothing
    /// radius `h`, sitting `d` away from the plane.
    fn weight(&self, r: Scalar, d: Scalar, h: Scalar) -> Scalar {
        if self.geometry.project_all {
            self.projected.value(r, h)
        } else {
            self.kernel.value((r * r + d * d).sqrt(), h)
        }
    }

    /// Spreads a single particle over its footprint. `weights` is scratch space, reused across
    /// particles to avoid an allocation per particle.
    fn deposit_particle(
        &self,
        p: &Position,
        h: Scalar,
        plane: &mut [Scalar],
        weights: &mut Vec<(usize, Scalar)>,
    ) {
        if !(h > 0. && h.is_finite()) {
            return;
        }

        let ([x0, x1], x_normal) = self.geometry.projection.project(p);
        let d = (x_normal - self.geometry.center).abs();

        let reach = if self.geometry.project_all {
            h
        } else if d <= h {
            (h * h - d * d).sqrt()
        } else {
            return;
        };

        let size1 = self.binning[1].num_bins;

        weights.clear();
        let mut total = 0.;
        if let (Some(range0), Some(range1)) = (
            self.binning[0].footprint(x0, reach),
            self.binning[1].footprint(x1, reach),
        ) {
            for (i, j) in iproduct!(range0, range1) {
                let dx = self.binning[0].bin_center(i) - x0;
                let dy = self.binning[1].bin_center(j) - x1;
                let w = self.weight((dx * dx + dy * dy).sqrt(), d, h);
                if w > 0. {
                    weights.push((i * size1 + j, w));
                    total += w;
                }
            }
        }

        if total > 0. {
            let scale = self.particle_mass / total;
            for &(index, w) in weights.iter() {
                plane[index] += w * scale;
            }
        } else if let (Some(i), Some(j)) = (
            self.binning[0].bin_index(x0),
            self.binning[1].bin_index(x1),
        ) {
            // no pixel centre within reach, the pixel holding the particle takes everything
            plane[i * size1 + j] += self.particle_mass;
        }
    }
}

/// Deposits every particle onto `plane`, spreading each one over the pixels within reach of
/// its smoothing kernel.
///
/// A particle with smoothing radius `h` at distance `d` from the plane reaches `h` in the
/// plane when projecting everything, and `√(h² - d²)` otherwise (particles with `d > h` are
/// skipped). Pixel weights are the kernel evaluated at pixel centres, normalized over the
/// pixels that lie inside the plane so that each contributing particle deposits exactly
/// `particle_mass`. When no pixel centre is within reach the whole mass goes to the pixel
/// containing the particle. Particles with `h <= 0` deposit nothing.
///
/// The normalization also applies to particles projected outside of the plane: one whose
/// kernel only reaches a border pixel deposits its whole mass on the border, so mass from
/// outside the field of view piles up along the edges.
///
/// `radii` must be as long as `positions` and `plane` must hold `size0 * size1` values.
pub fn adaptive(
    positions: &[Position],
    radii: &[Scalar],
    smoothing: &AdaptiveSmoothing,
    plane: &mut [Scalar],
) {
    let mut weights = Vec::new();
    for (p, &h) in positions.iter().zip(radii) {
        smoothing.deposit_particle(p, h, plane, &mut weights);
    }
}

/// Parallel [`adaptive`], with the same partitioning scheme as
/// [`par_grid3d`](crate::grid3d::par_grid3d): results are identical from run to run
/// whatever the number of threads, and at most one private plane per worker thread is alive.
pub fn par_adaptive(
    positions: &[Position],
    radii: &[Scalar],
    smoothing: &AdaptiveSmoothing,
    plane: &mut [Scalar],
    partitions: usize,
) -> Result<(), DepositError> {
    partitioned_deposit(
        positions.len().min(radii.len()),
        partitions,
        rayon::current_num_threads(),
        plane,
        |range, partial| adaptive(&positions[range.clone()], &radii[range], smoothing, partial),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binning::{Axis, Projection};
    use crate::initial_condition::{InitialCondition, Sphere};
    use crate::linspace;
    use crate::statistics::GridStatistics;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn smoothing(n: usize, normal: Axis, center: Scalar, project_all: bool) -> AdaptiveSmoothing {
        let edges: Vec<Scalar> = linspace(0., n as Scalar, n + 1).collect();
        let binning = AxisBinning::from_edges(0, &edges).unwrap();
        AdaptiveSmoothing::new(
            [binning, binning],
            PlaneGeometry {
                projection: Projection::along(normal),
                center,
                project_all,
            },
            KernelKind::CubicSpline,
            1.,
        )
    }

    fn run(positions: &[Position], radii: &[Scalar], s: &AdaptiveSmoothing) -> LensingPlane {
        let mut plane = LensingPlane::zeros(s.shape()).unwrap();
        adaptive(positions, radii, s, plane.as_mut_slice());
        plane
    }

    #[test]
    fn test_single_particle_normalized() {
        let s = smoothing(10, Axis::Z, 0., false);
        let plane = run(&[Position::new(5., 5., 0.)], &[10.], &s);

        assert_relative_eq!(plane.total(), 1., epsilon = 1e-12);
        // symmetric about the particle, which sits on the corner of 4 pixels
        assert_relative_eq!(plane[[4, 4]], plane[[5, 5]], epsilon = 1e-12);
        assert_relative_eq!(plane[[4, 5]], plane[[5, 4]], epsilon = 1e-12);
        assert!(plane[[4, 4]] > plane[[0, 0]]);
    }

    #[test]
    fn test_far_particles_skipped_unless_projecting_all() {
        let positions = [Position::new(5., 5., 3.)];

        let slice = run(&positions, &[2.], &smoothing(10, Axis::Z, 0., false));
        assert_eq!(slice.total(), 0.);

        let all = run(&positions, &[2.], &smoothing(10, Axis::Z, 0., true));
        assert_relative_eq!(all.total(), 1., epsilon = 1e-12);
    }

    #[test]
    fn test_reach_shrinks_with_distance() {
        let positions = [Position::new(5.5, 5.5, 0.)];
        let near = run(&positions, &[3.], &smoothing(10, Axis::Z, 0., false));
        let far = run(&positions, &[3.], &smoothing(10, Axis::Z, 2.9, false));

        assert!(far.occupied_cells() < near.occupied_cells());
        assert_relative_eq!(far.total(), 1., epsilon = 1e-12);
        assert!(far[[5, 5]] > near[[5, 5]]);
    }

    #[test]
    fn test_degenerate_radius() {
        let s = smoothing(10, Axis::Z, 0., true);
        let positions = [Position::new(5., 5., 0.); 3];
        let plane = run(&positions, &[0., -1., Scalar::NAN], &s);
        assert_eq!(plane.total(), 0.);
    }

    #[test]
    fn test_tiny_radius_is_nearest_pixel() {
        let s = smoothing(10, Axis::Z, 0., true);
        let positions = [
            Position::new(2.3, 7.9, 100.),
            Position::new(3., 4., -5.),
            Position::new(9.99, 0.01, 0.),
            Position::new(0.5, 0.5, 0.),
        ];
        let plane = run(&positions, &[1e-6; 4], &s);

        assert_relative_eq!(plane[[2, 7]], 1., epsilon = 1e-12);
        // on an edge, the upper pixel
        assert_relative_eq!(plane[[3, 4]], 1., epsilon = 1e-12);
        assert_relative_eq!(plane[[9, 0]], 1., epsilon = 1e-12);
        // exactly on a pixel centre
        assert_relative_eq!(plane[[0, 0]], 1., epsilon = 1e-12);
        assert_relative_eq!(plane.total(), 4., epsilon = 1e-12);
        assert_eq!(plane.occupied_cells(), 4);
    }

    #[test]
    fn test_clamped_at_plane_border() {
        let s = smoothing(10, Axis::Z, 0., true);
        let plane = run(&[Position::new(0.2, 0.2, 0.)], &[3.], &s);

        assert_relative_eq!(plane.total(), 1., epsilon = 1e-12);
        assert_eq!(plane[[5, 5]], 0.);

        // outside of the plane, not reaching any pixel
        let outside = run(&[Position::new(-5., 5., 0.)], &[3.], &s);
        assert_eq!(outside.total(), 0.);
    }

    #[test]
    fn test_outside_particle_piles_on_border() {
        let s = smoothing(10, Axis::Z, 0., true);
        let plane = run(&[Position::new(-2.4, 5.5, 0.)], &[3.], &s);

        let column0: Scalar = (0..10).map(|j| plane[[0, j]]).sum();
        assert_relative_eq!(plane.total(), 1., epsilon = 1e-12);
        assert_relative_eq!(column0, 1., epsilon = 1e-12);
    }

    #[test]
    fn test_set_kernel_retabulates_projection() {
        let positions = [Position::new(5.3, 4.6, 0.)];
        let mut s = smoothing(10, Axis::Z, 0., true);
        s.set_kernel(KernelKind::Poly6);
        assert_eq!(s.kernel(), KernelKind::Poly6);

        let fresh = AdaptiveSmoothing::new(s.binning, s.geometry, KernelKind::Poly6, 1.);
        let switched = run(&positions, &[3.], &s);
        assert_eq!(switched, run(&positions, &[3.], &fresh));

        let spline = run(&positions, &[3.], &smoothing(10, Axis::Z, 0., true));
        assert_ne!(switched, spline);
    }

    #[test]
    fn test_projection_axes() {
        let s = smoothing(10, Axis::X, 1., true);
        let plane = run(&[Position::new(1., 2.5, 7.5)], &[1e-6], &s);
        // plane axes are (y, z)
        assert_relative_eq!(plane[[2, 7]], 1., epsilon = 1e-12);
    }

    #[test]
    fn test_particle_mass() {
        let mut s = smoothing(10, Axis::Z, 0., true);
        s.particle_mass = 2.5;
        let plane = run(&[Position::new(5., 5., 0.), Position::new(2., 2., 0.)], &[2., 2.], &s);
        assert_relative_eq!(plane.total(), 5., epsilon = 1e-12);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let positions = Sphere {
            num_particles: 2_000,
            center: na::Vector3::new(8., 8., 8.),
            radius: 6.,
        }
        .particles();
        let radii: Vec<Scalar> = (0..positions.len())
            .map(|i| 0.2 + (i % 5) as Scalar * 0.4)
            .collect();

        for &project_all in &[true, false] {
            let s = smoothing(16, Axis::Y, 8., project_all);
            let sequential = run(&positions, &radii, &s);

            let mut first = LensingPlane::zeros(s.shape()).unwrap();
            par_adaptive(&positions, &radii, &s, first.as_mut_slice(), 8).unwrap();
            let mut second = LensingPlane::zeros(s.shape()).unwrap();
            par_adaptive(&positions, &radii, &s, second.as_mut_slice(), 8).unwrap();

            // bit-identical between runs, equal to the sequential sum up to rounding
            assert_eq!(first, second);

            let mut bounded = LensingPlane::zeros(s.shape()).unwrap();
            let num_buffers = partitioned_deposit(
                positions.len(),
                8,
                3,
                bounded.as_mut_slice(),
                |range, partial| adaptive(&positions[range.clone()], &radii[range], &s, partial),
            )
            .unwrap();
            assert_eq!(num_buffers, 3);
            assert_eq!(bounded, first);
            for (a, b) in first.as_slice().iter().zip(sequential.as_slice()) {
                assert_relative_eq!(*a, *b, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_surface_density() {
        let edges: Vec<Scalar> = linspace(0., 1., 3).collect();
        let binning = AxisBinning::from_edges(0, &edges).unwrap();
        let s = AdaptiveSmoothing::new(
            [binning, binning],
            PlaneGeometry {
                projection: Projection::along(Axis::Z),
                center: 0.,
                project_all: true,
            },
            KernelKind::Poly6,
            1.,
        );
        let plane = run(&[Position::new(0.1, 0.1, 0.)], &[1e-3], &s);
        let density = plane.surface_density(&s.binning);
        assert_relative_eq!(density[0], 4.);
    }

    proptest! {
        #[test]
        fn mass_conserved_inside_plane(
            x in 2.0f32..8.0,
            y in 2.0f32..8.0,
            z in -1.0f32..1.0,
            h in 0.01f64..2.0,
            project_all in any::<bool>(),
        ) {
            let s = smoothing(10, Axis::Z, 0., project_all);
            let plane = run(&[Position::new(x, y, z)], &[h], &s);

            let expected = if project_all || (z as f64).abs() <= h { 1. } else { 0. };
            prop_assert!((plane.total() - expected).abs() < 1e-9);
            prop_assert!(plane.as_slice().iter().all(|&v| v >= 0.));
        }

        #[test]
        fn deterministic(
            coords in prop::collection::vec((0.0f32..10.0, 0.0f32..10.0, -2.0f32..2.0, 0.0f64..3.0), 1..50)
        ) {
            let positions: Vec<Position> = coords.iter().map(|&(x, y, z, _)| Position::new(x, y, z)).collect();
            let radii: Vec<Scalar> = coords.iter().map(|c| c.3).collect();
            let s = smoothing(10, Axis::Z, 0., false);

            prop_assert_eq!(run(&positions, &radii, &s), run(&positions, &radii, &s));
        }
    }
}
