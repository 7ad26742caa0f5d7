//! Request scheduler (component D, §4.D): produces the next synthetic
//! HTTP/3 request, deterministically, optionally pacing the caller.

pub mod distribution;

use std::time::Duration;

use rand::{Rng, RngCore, SeedableRng};
use rand_pcg::Pcg32;

/// Content doesn't need to be reproducible across runs (only the sizes do,
/// §4.D), so bodies are filled from the process's default CSPRNG rather
/// than a seeded, deterministic generator.
fn fill_random_body(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

use self::distribution::POST_BODY_SIZES;

const FIXED_BODY_SIZE: usize = 1024;
/// P(GET /distribution) in the FromDistribution body mode (§4.D).
const GET_PROBABILITY: f64 = 0.78;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPattern {
    Sporadic { interval: Duration },
    BackToBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestBodyMode {
    Fixed,
    FromDistribution,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticRequest {
    pub method: &'static str,
    pub path: &'static str,
    pub body: Vec<u8>,
}

pub struct RequestScheduler {
    pattern: RequestPattern,
    body_mode: RequestBodyMode,
    request_type_prng: Pcg32,
    post_body_dimension_prng: Pcg32,
    is_first: bool,
}

impl RequestScheduler {
    #[must_use]
    pub fn new(
        pattern: RequestPattern,
        body_mode: RequestBodyMode,
        request_type_seed: u32,
        post_body_dimension_seed: u32,
    ) -> Self {
        Self {
            pattern,
            body_mode,
            request_type_prng: Pcg32::seed_from_u64(u64::from(request_type_seed)),
            post_body_dimension_prng: Pcg32::seed_from_u64(u64::from(post_body_dimension_seed)),
            is_first: true,
        }
    }

    /// Produces the next request. In the `Sporadic` pattern, every call after
    /// the first sleeps for the configured interval before returning.
    pub async fn next_request(&mut self) -> SyntheticRequest {
        if let RequestPattern::Sporadic { interval } = self.pattern {
            if !self.is_first {
                tokio::time::sleep(interval).await;
            }
        }
        self.is_first = false;

        match self.body_mode {
            RequestBodyMode::Fixed => SyntheticRequest {
                method: "POST",
                path: "/echo",
                body: fill_random_body(FIXED_BODY_SIZE),
            },
            RequestBodyMode::FromDistribution => {
                let draw: f64 = self.request_type_prng.gen();
                if draw < GET_PROBABILITY {
                    SyntheticRequest {
                        method: "GET",
                        path: "/distribution",
                        body: Vec::new(),
                    }
                } else {
                    let size = POST_BODY_SIZES.sample(&mut self.post_body_dimension_prng) as usize;
                    SyntheticRequest {
                        method: "POST",
                        path: "/distribution",
                        body: fill_random_body(size),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_mode_always_posts_1024_bytes_to_echo() {
        let mut s = RequestScheduler::new(RequestPattern::BackToBack, RequestBodyMode::Fixed, 1, 2);
        for _ in 0..10 {
            let req = s.next_request().await;
            assert_eq!(req.method, "POST");
            assert_eq!(req.path, "/echo");
            assert_eq!(req.body.len(), FIXED_BODY_SIZE);
        }
    }

    #[tokio::test]
    async fn from_distribution_mode_splits_get_and_post() {
        let mut s = RequestScheduler::new(
            RequestPattern::BackToBack,
            RequestBodyMode::FromDistribution,
            7,
            8,
        );
        let mut gets = 0;
        let mut posts = 0;
        for _ in 0..500 {
            let req = s.next_request().await;
            match req.method {
                "GET" => {
                    assert!(req.body.is_empty());
                    gets += 1;
                }
                "POST" => {
                    assert!(!req.body.is_empty());
                    posts += 1;
                }
                other => panic!("unexpected method {other}"),
            }
        }
        // Roughly 78/22 split; allow generous slack since this is a fixed,
        // not-huge sample.
        assert!(gets > posts);
        assert!(posts > 0);
    }

    #[tokio::test]
    async fn deterministic_given_same_seeds() {
        let mut a = RequestScheduler::new(
            RequestPattern::BackToBack,
            RequestBodyMode::FromDistribution,
            7,
            8,
        );
        let mut b = RequestScheduler::new(
            RequestPattern::BackToBack,
            RequestBodyMode::FromDistribution,
            7,
            8,
        );
        for _ in 0..20 {
            let ra = a.next_request().await;
            let rb = b.next_request().await;
            assert_eq!(ra.method, rb.method);
            assert_eq!(ra.body.len(), rb.body.len());
        }
    }
}
