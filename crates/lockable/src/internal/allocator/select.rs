use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Chooses one element of a bucket.
///
/// With `evenly` the choice is uniform over the bucket, otherwise the first
/// element wins so the outcome follows catalog order.
#[derive(Debug)]
pub(crate) struct Picker {
    evenly: bool,
    random: SmallRng,
}

impl Picker {
    pub fn new(evenly: bool, seed: Option<u64>) -> Self {
        Picker {
            evenly,
            random: match seed {
                Some(seed) => SmallRng::seed_from_u64(seed),
                None => SmallRng::from_os_rng(),
            },
        }
    }

    pub fn set_evenly(&mut self, evenly: bool) {
        self.evenly = evenly;
    }

    /// Removes the picked element from `bucket`, preserving the order of the rest.
    pub fn take<T>(&mut self, bucket: &mut Vec<T>) -> Option<T> {
        if bucket.is_empty() {
            return None;
        }
        let position = if self.evenly {
            self.random.random_range(0..bucket.len())
        } else {
            0
        };
        Some(bucket.remove(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_element_without_evenly() {
        let mut picker = Picker::new(false, Some(1));
        let mut bucket = vec![3, 1, 2];
        assert_eq!(picker.take(&mut bucket), Some(3));
        assert_eq!(picker.take(&mut bucket), Some(1));
        assert_eq!(bucket, [2]);
        assert_eq!(picker.take(&mut Vec::<u32>::new()), None);
    }

    #[test]
    fn test_evenly_is_reproducible_with_seed() {
        let draw = |seed| {
            let mut picker = Picker::new(true, Some(seed));
            let mut bucket: Vec<u32> = (0..32).collect();
            (0..8)
                .map(|_| picker.take(&mut bucket).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(7), draw(7));
        let drawn = draw(7);
        let mut unique = drawn.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), drawn.len());
    }
}
