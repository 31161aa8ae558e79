//! Interval detection over sorted voxel keys.
//!
//! After the stable sort, samples with the same BEV rank form contiguous
//! runs. A run starts at position 0 and wherever the key differs from its
//! predecessor.
//!
//! # Algorithm
//!
//! 1. **Mark boundaries**: position `i` is a start iff `i == 0` or `keys[i] != keys[i - 1]`
//! 2. **Compact**: gather the marked positions in order (parallel filter)
//! 3. **Lengths**: consecutive differences of the starts, the last run ends at `keys.len()`

use rayon::prelude::*;

/// Contiguous runs of equal keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Intervals {
    /// First position of each run.
    pub starts: Vec<u32>,
    /// Number of positions in each run.
    pub lengths: Vec<u32>,
}

impl Intervals {
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }
}

/// Detect runs of equal values in `sorted_keys`.
///
/// Keys must be sorted; unsorted input still yields valid runs but the same
/// key may then appear in more than one run.
pub fn detect_intervals(sorted_keys: &[u32]) -> Intervals {
    let n = sorted_keys.len();
    if n == 0 {
        return Intervals::default();
    }

    let starts: Vec<u32> = (0..n)
        .into_par_iter()
        .filter(|&i| i == 0 || sorted_keys[i] != sorted_keys[i - 1])
        .map(|i| i as u32)
        .collect();

    let lengths = starts
        .iter()
        .zip(starts.iter().skip(1).chain(std::iter::once(&(n as u32))))
        .map(|(start, end)| end - start)
        .collect();

    Intervals { starts, lengths }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    #[test]
    fn test_empty() {
        let r = detect_intervals(&[]);
        assert!(r.is_empty());
        assert!(r.lengths.is_empty());
    }

    #[test]
    fn test_single_run() {
        let r = detect_intervals(&[5, 5, 5, 5]);
        assert_eq!(r.starts, vec![0]);
        assert_eq!(r.lengths, vec![4]);
    }

    #[test]
    fn test_all_distinct() {
        let r = detect_intervals(&[1, 2, 3]);
        assert_eq!(r.starts, vec![0, 1, 2]);
        assert_eq!(r.lengths, vec![1, 1, 1]);
    }

    #[test]
    fn test_mixed_runs() {
        let r = detect_intervals(&[0, 0, 3, 7, 7, 7, 9]);
        assert_eq!(r.starts, vec![0, 2, 3, 6]);
        assert_eq!(r.lengths, vec![2, 1, 3, 1]);
    }

    #[test]
    fn test_random_runs_cover_input() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut keys: Vec<u32> = (0..5000).map(|_| rng.gen_range(0..300)).collect();
        keys.sort_unstable();

        let r = detect_intervals(&keys);
        assert_eq!(r.lengths.iter().sum::<u32>() as usize, keys.len());

        let mut distinct = keys.clone();
        distinct.dedup();
        assert_eq!(r.len(), distinct.len());

        for (i, (&s, &l)) in r.starts.iter().zip(&r.lengths).enumerate() {
            let run = &keys[s as usize..(s + l) as usize];
            assert!(run.iter().all(|&k| k == distinct[i]));
        }
    }
}
