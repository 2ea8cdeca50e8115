//! Key streams shared by the benchmarks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use s3cache::Cache;

#[derive(Debug, Clone, Copy)]
pub enum Pattern {
    /// `hot_prob` of the reads go to the first `hot_fraction` of the keys.
    Hotset { hot_fraction: f64, hot_prob: f64 },
    /// Cycles through every key in order.
    Scan,
    /// Skewed popularity; `theta` near 1 is heavily skewed.
    Zipfian { theta: f64 },
}

pub struct Keys {
    universe: u64,
    pattern: Pattern,
    rng: StdRng,
    cursor: u64,
    zipf: Option<Zipf>,
}

impl Keys {
    pub fn new(universe: u64, pattern: Pattern, seed: u64) -> Self {
        let universe = universe.max(2);
        let zipf = match pattern {
            Pattern::Zipfian { theta } => Some(Zipf::new(universe, theta)),
            _ => None,
        };
        Self {
            universe,
            pattern,
            rng: StdRng::seed_from_u64(seed),
            cursor: 0,
            zipf,
        }
    }

    pub fn next_key(&mut self) -> u64 {
        match self.pattern {
            Pattern::Hotset {
                hot_fraction,
                hot_prob,
            } => {
                let hot = ((self.universe as f64 * hot_fraction) as u64).clamp(1, self.universe - 1);
                if self.rng.gen_bool(hot_prob) {
                    self.rng.gen_range(0..hot)
                } else {
                    self.rng.gen_range(hot..self.universe)
                }
            },
            Pattern::Scan => {
                let key = self.cursor;
                self.cursor = (self.cursor + 1) % self.universe;
                key
            },
            Pattern::Zipfian { .. } => {
                let u = self.rng.r#gen::<f64>();
                self.zipf.as_ref().map_or(0, |zipf| zipf.sample(u))
            },
        }
    }

    pub fn take(&mut self, n: usize) -> Vec<u64> {
        (0..n).map(|_| self.next_key()).collect()
    }
}

/// Inverse-CDF Zipf sampler (YCSB formulation).
struct Zipf {
    n: u64,
    theta: f64,
    zeta_n: f64,
    alpha: f64,
    eta: f64,
}

impl Zipf {
    fn new(n: u64, theta: f64) -> Self {
        let theta = theta.clamp(0.0, 0.9999);
        let zeta = |n: u64| (1..=n).map(|i| 1.0 / (i as f64).powf(theta)).sum::<f64>();
        let zeta_2 = zeta(2);
        let zeta_n = zeta(n);
        Self {
            n,
            theta,
            zeta_n,
            alpha: 1.0 / (1.0 - theta),
            eta: (1.0 - (2.0 / n as f64).powf(1.0 - theta)) / (1.0 - zeta_2 / zeta_n),
        }
    }

    fn sample(&self, u: f64) -> u64 {
        let uz = u * self.zeta_n;
        if uz < 1.0 {
            return 0;
        }
        if uz < 1.0 + 0.5_f64.powf(self.theta) {
            return 1;
        }
        let spread = self.n as f64 * (self.eta * u - self.eta + 1.0).powf(self.alpha);
        (spread as u64).min(self.n - 1)
    }
}

/// Replays `keys` as get-or-set and returns the hit ratio.
pub fn replay(cache: &Cache<u64, u64>, keys: &[u64]) -> f64 {
    let mut hits = 0usize;
    for &key in keys {
        if cache.get(&key).is_some() {
            hits += 1;
        } else {
            cache.set(key, key);
        }
    }
    hits as f64 / keys.len().max(1) as f64
}
