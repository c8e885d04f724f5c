use ndarray::Array1;
use rand::Rng;
use rand_distr::StandardNormal;

/// The random-hyperplane hash family backing one LSH table.
///
/// Each bit of a signature is the sign of the dot product with one random
/// Gaussian hyperplane. Signs are invariant to scaling, so the planes are
/// left un-normalized.
#[derive(Debug, Clone)]
pub struct RandomProjectionHasher {
    planes: Vec<Array1<f32>>,
}

impl RandomProjectionHasher {
    /// Draw `n_planes` hyperplanes of dimension `dim` from `rng`.
    pub fn new(dim: usize, n_planes: usize, rng: &mut impl Rng) -> Self {
        let planes = (0..n_planes)
            .map(|_| {
                let v: Vec<f32> = (0..dim).map(|_| rng.sample(StandardNormal)).collect();
                Array1::from_vec(v)
            })
            .collect();
        Self { planes }
    }

    /// Packed signature of `v`: bit i (LSB = plane 0) is set iff the dot
    /// product with plane i is strictly positive. A zero projection lands
    /// in the 0 half-space.
    pub fn signature(&self, v: &Array1<f32>) -> u64 {
        let mut sig: u64 = 0;
        for (i, plane) in self.planes.iter().enumerate() {
            if v.dot(plane) > 0.0 {
                sig |= 1u64 << i;
            }
        }
        sig
    }

    /// Number of planes (bits in the signature).
    pub fn n_planes(&self) -> usize {
        self.planes.len()
    }
}
