use std::time::{SystemTime, UNIX_EPOCH};

use crate::SeededRng;

/// Picks a uniformly random element of `items`.
///
/// # Returns
/// `None` if `items` is empty.
pub fn pick_random<T: Copy>(items: &[T], rng: &mut SeededRng) -> Option<T> {
    if items.is_empty() {
        None
    } else {
        Some(items[rng.pick_index(items.len())])
    }
}

/// Milliseconds since the Unix epoch, used to timestamp diagnostics.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_random_empty() {
        let mut rng = SeededRng::from_seed(1u32);
        assert_eq!(pick_random::<u8>(&[], &mut rng), None);
    }

    #[test]
    fn test_pick_random_member() {
        let mut rng = SeededRng::from_seed(1u32);
        let items = [3, 5, 7];
        for _ in 0..20 {
            let x = pick_random(&items, &mut rng);
            assert!(x.is_some_and(|x| items.contains(&x)));
        }
    }
}
