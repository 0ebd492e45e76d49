use std::fmt;

/// Depth calculates minimum, maximum, average and percentile of leaf
/// depths, a leaf being any null child slot, in a [`crate::Tree`].
#[derive(Clone, Debug)]
pub struct Depth {
    samples: usize,
    min: usize,
    max: usize,
    total: usize,
    depths: [u64; 256],
}

impl Depth {
    pub(crate) fn new() -> Depth {
        Default::default()
    }

    pub(crate) fn sample(&mut self, depth: usize) {
        self.samples += 1;
        self.total += depth;
        if self.samples == 1 || depth < self.min {
            self.min = depth
        }
        if depth > self.max {
            self.max = depth
        }
        self.depths[depth.min(255)] += 1;
    }

    /// Return number of leaves sampled.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Return minimum leaf depth.
    pub fn min(&self) -> usize {
        self.min
    }

    /// Return maximum leaf depth.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Return the average leaf depth.
    pub fn mean(&self) -> usize {
        match self.samples {
            0 => 0,
            n => self.total / n,
        }
    }

    /// Return depth as tuple of percentiles, each tuple provides
    /// (percentile, depth). Returned percentiles from 90, 91 .. 99
    pub fn percentiles(&self) -> Vec<(u8, usize)> {
        let mut percentiles: Vec<(u8, usize)> = vec![];
        let (mut acc, mut prev_perc) = (0_u64, 90_u8);
        let iter = self.depths.iter().enumerate().filter(|(_, &item)| item > 0);
        for (depth, samples) in iter {
            acc += *samples;
            let perc = ((acc as f64 / self.samples as f64) * 100_f64) as u8;
            if perc >= prev_perc {
                percentiles.push((perc, depth));
                prev_perc = perc;
            }
        }
        percentiles
    }
}

impl Default for Depth {
    fn default() -> Self {
        Depth {
            samples: 0,
            min: 0,
            max: 0,
            total: 0,
            depths: [0; 256],
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ps: Vec<String> = self
            .percentiles()
            .into_iter()
            .map(|(p, d)| format!("{}: {}", p, d))
            .collect();
        write!(
            f,
            "{{ min: {}, mean: {}, max: {}, percentiles: {{ {} }} }}",
            self.min,
            self.mean(),
            self.max,
            ps.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth() {
        let mut depth = Depth::new();
        assert_eq!(depth.mean(), 0);
        assert!(depth.percentiles().is_empty());

        for d in [3, 3, 4, 4, 4, 5].iter() {
            depth.sample(*d);
        }
        assert_eq!(depth.samples(), 6);
        assert_eq!(depth.min(), 3);
        assert_eq!(depth.max(), 5);
        assert_eq!(depth.mean(), 3);
        assert_eq!(depth.percentiles(), vec![(100, 5)]);
        assert!(depth.to_string().starts_with("{ min: 3, mean: 3, max: 5"));
    }
}
