use std::collections::HashSet;

use rand::Rng;

/// Draws a pseudo-random, non-zero `u32` that doesn't collide with any id
/// already in `existing`. Collisions are vanishingly rare at the lobby's
/// capacity (50), so a linear resampling loop is simpler and just as fast
/// in practice as anything cleverer.
pub fn allocate_id(existing: &HashSet<u32>, rng: &mut impl Rng) -> u32 {
    loop {
        let candidate = rng.random::<u32>();
        if candidate != 0 && !existing.contains(&candidate) {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn never_returns_an_id_already_taken() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut existing = HashSet::new();
        for _ in 0..50 {
            let id = allocate_id(&existing, &mut rng);
            assert!(existing.insert(id), "allocate_id produced a duplicate");
        }
    }

    #[test]
    fn never_returns_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        let existing = HashSet::new();
        for _ in 0..1000 {
            assert_ne!(allocate_id(&existing, &mut rng), 0);
        }
    }
}
