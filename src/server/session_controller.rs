//! Per-connection server session controller (component I, §4.I): dispatches
//! each incoming request by path. Owns nothing about the underlying
//! transport or HTTP/3 session itself (that collaborator is out of scope);
//! it is a pure request-to-response mapping plus the per-connection PRNG
//! state the distribution handler needs.
//!
//! Its lifetime is meant to be exactly that of the HTTP/3 session it serves:
//! callers hold it behind the same handle they hand the transport for
//! request callbacks, and drop it when the session detaches.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg32;

use crate::request::distribution::GET_RESPONSE_SIZES;

/// Content doesn't need to be reproducible across runs (only the sizes do,
/// §4.D), so bodies are filled from the process's default CSPRNG rather
/// than a seeded, deterministic generator.
fn fill_random_body(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
    pub method: &'static str,
    pub path: &'static str,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl OutgoingResponse {
    fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    fn not_found() -> Self {
        Self {
            status: 404,
            body: Vec::new(),
        }
    }
}

/// Dispatches `/echo` and `/distribution`, seeded from the per-connection
/// seed the transport factory allocated.
pub struct SessionController {
    distribution_size_prng: Pcg32,
}

impl SessionController {
    #[must_use]
    pub fn new(seed: u32) -> Self {
        Self {
            distribution_size_prng: Pcg32::seed_from_u64(u64::from(seed)),
        }
    }

    /// Handles one request and produces its response.
    pub fn handle(&mut self, request: &IncomingRequest) -> OutgoingResponse {
        match (request.method, request.path) {
            (_, "/echo") => OutgoingResponse::ok(request.body.clone()),
            ("GET", "/distribution") => {
                let size = GET_RESPONSE_SIZES.sample(&mut self.distribution_size_prng) as usize;
                OutgoingResponse::ok(fill_random_body(size))
            }
            ("POST", "/distribution") => OutgoingResponse::ok(Vec::new()),
            _ => OutgoingResponse::not_found(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_mirrors_the_request_body() {
        let mut s = SessionController::new(1);
        let resp = s.handle(&IncomingRequest {
            method: "POST",
            path: "/echo",
            body: b"hello".to_vec(),
        });
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"hello");
    }

    #[test]
    fn get_distribution_samples_a_nonempty_body_from_the_table() {
        let mut s = SessionController::new(1);
        let resp = s.handle(&IncomingRequest {
            method: "GET",
            path: "/distribution",
            body: Vec::new(),
        });
        assert_eq!(resp.status, 200);
        assert!(!resp.body.is_empty());
    }

    #[test]
    fn post_distribution_always_replies_with_an_empty_body() {
        let mut s = SessionController::new(1);
        let resp = s.handle(&IncomingRequest {
            method: "POST",
            path: "/distribution",
            body: b"some upload".to_vec(),
        });
        assert_eq!(resp.status, 200);
        assert!(resp.body.is_empty());
    }

    #[test]
    fn unknown_path_is_not_found() {
        let mut s = SessionController::new(1);
        let resp = s.handle(&IncomingRequest {
            method: "GET",
            path: "/nope",
            body: Vec::new(),
        });
        assert_eq!(resp.status, 404);
    }
}
