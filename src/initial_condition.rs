//! Synthetic particle sets, for exercising the deposition without a snapshot.

use crate::{Position, Scalar};
use itertools::iproduct;
use na::Vector3;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::ops::Range;

type Vec3 = Vector3<Scalar>;

pub trait InitialCondition {
    fn particles(&self) -> Vec<Position>;
}

/// A jittered lattice filling a box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub size: Range<Vec3>,
    pub spacing: Scalar,
    pub jitter: Vec3,
}

impl Default for Block {
    fn default() -> Self {
        Block {
            size: Vec3::from_element(0.5)..Vec3::from_element(1.5),
            spacing: 0.05,
            jitter: Vec3::from_element(0.05 / 8.),
        }
    }
}

impl InitialCondition for Block {
    fn particles(&self) -> Vec<Position> {
        let mut rng = StdRng::from_seed([0; 32]);

        let min = self.size.start;
        let max = self.size.end;

        let counts = ((max - min) / self.spacing).map(|x| x.ceil() as usize);

        iproduct!(0..counts.x, 0..counts.y, 0..counts.z)
            .map(|(i, j, k)| {
                let idx = Vector3::new(i, j, k);
                let pos = idx.cast::<Scalar>() * self.spacing + min;

                let rand: Vec3 = rng.gen::<[Scalar; 3]>().into();
                let jitter = rand.component_mul(&self.jitter) - self.jitter / 2.;

                (pos + jitter).cast::<f32>()
            })
            .collect()
    }
}

/// Particles drawn uniformly inside a ball.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sphere {
    pub num_particles: usize,
    pub center: Vec3,
    pub radius: Scalar,
}

impl Default for Sphere {
    fn default() -> Self {
        Sphere {
            num_particles: 5000,
            center: Vec3::new(1., 1., 1.),
            radius: 0.25,
        }
    }
}

impl InitialCondition for Sphere {
    fn particles(&self) -> Vec<Position> {
        let mut rng = StdRng::from_seed([0; 32]);

        (0..self.num_particles)
            .map(|_| loop {
                let rand: Vec3 = rng.gen::<[Scalar; 3]>().into();
                let pos = rand * 2. - Vec3::from_element(1.);

                if pos.magnitude_squared() < 1. {
                    break (pos * self.radius + self.center).cast::<f32>();
                }
            })
            .collect()
    }
}
