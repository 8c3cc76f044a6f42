use std::sync::{Arc, Mutex};

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A single seeded PRNG, shared by clone across every task that needs
/// randomness: mobility waypoint/speed/pause choice, MAC backoff, channel
/// jitter, payload bytes, session ids, and destination picks. Keeping one
/// seed source (rather than one per task) is what makes a run
/// reproducible under a fixed `seed` and a deterministic executor.
#[derive(Clone)]
pub struct SharedRng(Arc<Mutex<ChaCha8Rng>>);

impl SharedRng {
    pub fn new(seed: u64) -> Self {
        Self(Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))))
    }

    pub fn gen_range_f64(&self, lo: f64, hi: f64) -> f64 {
        let mut rng = self.0.lock().expect("rng mutex poisoned");
        if hi <= lo {
            return lo;
        }
        rng.gen_range(lo..hi)
    }

    pub fn gen_range_u64(&self, lo: u64, hi_inclusive: u64) -> u64 {
        let mut rng = self.0.lock().expect("rng mutex poisoned");
        rng.gen_range(lo..=hi_inclusive)
    }

    pub fn gen_bool(&self, p: f64) -> bool {
        let mut rng = self.0.lock().expect("rng mutex poisoned");
        rng.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Picks a uniformly random element of `items`, or `None` if empty.
    pub fn choose<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.gen_range_u64(0, (items.len() - 1) as u64) as usize;
        items.get(idx)
    }

    pub fn fill_bytes(&self, buf: &mut [u8]) {
        let mut rng = self.0.lock().expect("rng mutex poisoned");
        rng.fill_bytes(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let a = SharedRng::new(7);
        let b = SharedRng::new(7);
        let xs: Vec<f64> = (0..10).map(|_| a.gen_range_f64(0.0, 100.0)).collect();
        let ys: Vec<f64> = (0..10).map(|_| b.gen_range_f64(0.0, 100.0)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn choose_none_on_empty() {
        let rng = SharedRng::new(1);
        let empty: Vec<u32> = vec![];
        assert!(rng.choose(&empty).is_none());
    }
}
