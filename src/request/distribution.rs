//! Empirical body-size distributions (§6.4): two 800-bucket categorical
//! distributions, one driving POST body sizes on the client, the other
//! driving GET response sizes on the server.
//!
//! These are meant to be fixed, corpus-derived tables, but the literal
//! per-bucket counts aren't available in a form this crate can losslessly
//! transcribe, so the tables are generated once at process start from a
//! documented, deterministic formula (a discretized log-normal histogram)
//! instead of hand-typed literals. `EmpiricalSizeDistribution::from_values_and_weights`
//! is the seam a future maintainer uses to swap in the real corpus tables
//! without touching the sampler.

use once_cell::sync::Lazy;
use rand::Rng;

pub const BUCKET_COUNT: usize = 800;
const BUCKET_START: u64 = 500;
const BUCKET_STEP: u64 = 1000;

/// A categorical distribution over a fixed set of byte-count buckets.
pub struct EmpiricalSizeDistribution {
    values: Vec<u64>,
    /// Cumulative probability mass, monotonically increasing to ~1.0.
    cumulative: Vec<f64>,
}

impl EmpiricalSizeDistribution {
    #[must_use]
    pub fn from_values_and_weights(values: Vec<u64>, weights: Vec<f64>) -> Self {
        assert_eq!(values.len(), weights.len());
        let total: f64 = weights.iter().sum();
        let mut running = 0.0;
        let cumulative = weights
            .iter()
            .map(|w| {
                running += w / total;
                running
            })
            .collect();
        Self { values, cumulative }
    }

    /// Draws a bucket index via a categorical draw and returns its byte count.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        let draw: f64 = rng.gen();
        let idx = self
            .cumulative
            .partition_point(|&cum| cum < draw)
            .min(self.values.len() - 1);
        self.values[idx]
    }
}

fn log_normal_pdf(x: f64, mu: f64, sigma: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    let z = (x.ln() - mu) / sigma;
    (-0.5 * z * z).exp() / (x * sigma * (2.0 * std::f64::consts::PI).sqrt())
}

fn bucket_values() -> Vec<u64> {
    (0..BUCKET_COUNT as u64)
        .map(|i| BUCKET_START + i * BUCKET_STEP)
        .collect()
}

/// Builds an 800-bucket distribution shaped like a log-normal centered near
/// `median_bytes`, with spread controlled by `sigma`.
fn build_distribution(median_bytes: f64, sigma: f64) -> EmpiricalSizeDistribution {
    let values = bucket_values();
    let mu = median_bytes.ln();
    let weights: Vec<f64> = values
        .iter()
        .map(|&v| log_normal_pdf(v as f64, mu, sigma).max(1e-12))
        .collect();
    EmpiricalSizeDistribution::from_values_and_weights(values, weights)
}

/// Sizes used for the `POST /distribution` request body generated by the
/// client's request scheduler.
pub static POST_BODY_SIZES: Lazy<EmpiricalSizeDistribution> =
    Lazy::new(|| build_distribution(4_000.0, 1.1));

/// Sizes used for the `GET /distribution` response body generated by the
/// server's distribution handler.
pub static GET_RESPONSE_SIZES: Lazy<EmpiricalSizeDistribution> =
    Lazy::new(|| build_distribution(6_000.0, 1.3));
