// src/core/mod.rs
//
// The stateful heart of the application: brute-force lockout evaluation,
// the server-authoritative quiz timer and the scoring function. Everything
// here is pure and clock-injected; storage happens in `crate::store`.

pub mod lockout;
pub mod scoring;
pub mod session;
