//! Synthetic Gaussian-mixture datasets for tests and benchmarks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// How much the mixture components overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlap {
    Low,
    Medium,
    High,
}

impl Overlap {
    fn std_dev(self) -> f64 {
        match self {
            Overlap::Low => 0.02,
            Overlap::Medium => 0.08,
            Overlap::High => 0.15,
        }
    }
}

/// Seeded generator of points drawn from a mixture of Gaussian clusters in
/// `[0, 1]^d`.
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    centers: usize,
    dimension: usize,
    overlap: Overlap,
    size: usize,
    seed: u64,
}

impl GaussianMixture {
    pub fn new(centers: usize, dimension: usize) -> Self {
        Self {
            centers: centers.max(1),
            dimension: dimension.max(1),
            overlap: Overlap::Medium,
            size: 1000,
            seed: 0,
        }
    }

    #[must_use]
    pub fn with_overlap(mut self, overlap: Overlap) -> Self {
        self.overlap = overlap;
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Generate the points. The same configuration always produces the same
    /// dataset.
    pub fn generate(&self) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let std_dev = self.overlap.std_dev();

        let centers: Vec<Vec<f64>> = (0..self.centers)
            .map(|_| (0..self.dimension).map(|_| rng.random::<f64>()).collect())
            .collect();

        (0..self.size)
            .map(|_| {
                let center = &centers[rng.random_range(0..centers.len())];
                center
                    .iter()
                    .map(|&c| {
                        // Box-Muller.
                        let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
                        let u2: f64 = rng.random();
                        let z = (-2.0 * u1.ln()).sqrt()
                            * (2.0 * std::f64::consts::PI * u2).cos();
                        c + z * std_dev
                    })
                    .collect()
            })
            .collect()
    }
}
