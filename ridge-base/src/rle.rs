use serde::{Deserialize, Serialize};

/// A run-length encoded vector: `values[i]` repeated `reps[i]` times, for
/// `i in 0..values.len()`. Preserved from the original design because
/// credentials embed per-node CPU and memory counts this way on the wire,
/// and most clusters are homogeneous enough that the encoding is tiny.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Rle<T> {
    values: Vec<T>,
    reps: Vec<u32>,
}

impl<T: Clone + PartialEq> Rle<T> {
    pub fn new() -> Self {
        Rle { values: Vec::new(), reps: Vec::new() }
    }

    /// Build an RLE vector from a flat per-node slice.
    pub fn build(src: &[T]) -> Self {
        let mut rle = Rle::new();
        for v in src {
            rle.push(v.clone());
        }
        rle
    }

    pub fn push(&mut self, val: T) {
        if let Some(last) = self.values.last() {
            if *last == val {
                *self.reps.last_mut().unwrap() += 1;
                return;
            }
        }
        self.values.push(val);
        self.reps.push(1);
    }

    /// Expand to the flat per-node value at index `i`.
    pub fn at(&self, i: usize) -> Option<&T> {
        let mut remaining = i;
        for (v, reps) in self.values.iter().zip(&self.reps) {
            let reps = *reps as usize;
            if remaining < reps {
                return Some(v);
            }
            remaining -= reps;
        }
        None
    }

    pub fn total_len(&self) -> usize {
        self.reps.iter().map(|r| *r as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of distinct runs (not the expanded length).
    pub fn run_count(&self) -> usize {
        self.values.len()
    }

    pub fn runs(&self) -> impl Iterator<Item = (&T, u32)> {
        self.values.iter().zip(self.reps.iter().copied())
    }

    pub fn expand(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.total_len());
        for (v, reps) in self.runs() {
            for _ in 0..reps {
                out.push(v.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::Rle;

    #[test]
    fn build_and_expand_roundtrip() {
        let src = vec![4u64, 4, 8, 8, 8, 2];
        let rle = Rle::build(&src);
        assert_eq!(rle.run_count(), 3);
        assert_eq!(rle.expand(), src);
    }

    #[test]
    fn at_indexes_into_runs() {
        let rle = Rle::build(&[1000u64, 2000, 2000, 4000]);
        assert_eq!(rle.at(0), Some(&1000));
        assert_eq!(rle.at(1), Some(&2000));
        assert_eq!(rle.at(2), Some(&2000));
        assert_eq!(rle.at(3), Some(&4000));
        assert_eq!(rle.at(4), None);
    }

    #[test]
    fn push_merges_equal_runs() {
        let mut rle: Rle<u32> = Rle::new();
        for v in [1, 1, 1, 2, 2, 1] {
            rle.push(v);
        }
        assert_eq!(rle.run_count(), 3);
        assert_eq!(rle.total_len(), 6);
    }
}
