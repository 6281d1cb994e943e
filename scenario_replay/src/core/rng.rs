//! Seedable random source shared by a buffer's samplers.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};

pub use rand_xoshiro::Xoshiro256StarStar;

/// Explicitly seeded generator behind a lock, so `&self` samplers stay
/// reproducible and isolated from other buffer instances.
#[derive(Debug)]
pub struct SharedRng {
    inner: Mutex<Xoshiro256StarStar>,
}

impl SharedRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Mutex::new(Xoshiro256StarStar::seed_from_u64(seed)),
        }
    }

    /// Restart the stream from `seed`.
    pub fn reseed(&self, seed: u64) {
        *self.inner.lock() = Xoshiro256StarStar::seed_from_u64(seed);
    }

    /// Run `f` with exclusive access to the generator.
    pub fn with<T>(&self, f: impl FnOnce(&mut Xoshiro256StarStar) -> T) -> T {
        let mut rng = self.inner.lock();
        f(&mut rng)
    }
}

/// Draw `batch_size` indices uniformly with replacement from `0..pool`.
///
/// `pool` must be non-zero.
pub fn draw_indices<R: Rng + ?Sized>(rng: &mut R, pool: usize, batch_size: usize) -> Vec<usize> {
    debug_assert!(pool > 0, "cannot draw from an empty pool");
    (0..batch_size).map(|_| rng.gen_range(0..pool)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_indices_in_range() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(42);
        let indices = draw_indices(&mut rng, 7, 500);
        assert_eq!(indices.len(), 500);
        assert!(indices.iter().all(|&i| i < 7));
    }

    #[test]
    fn test_same_seed_same_stream() {
        let a = SharedRng::new(7);
        let b = SharedRng::new(7);
        let draws_a = a.with(|rng| draw_indices(rng, 100, 32));
        let draws_b = b.with(|rng| draw_indices(rng, 100, 32));
        assert_eq!(draws_a, draws_b);
    }

    #[test]
    fn test_reseed_restarts_stream() {
        let rng = SharedRng::new(3);
        let first = rng.with(|r| draw_indices(r, 1000, 16));
        let second = rng.with(|r| draw_indices(r, 1000, 16));
        assert_ne!(first, second);

        rng.reseed(3);
        let replay = rng.with(|r| draw_indices(r, 1000, 16));
        assert_eq!(first, replay);
    }
}
