//! Ethereum front end of the extraction engine: an alloy-backed
//! [`ChainClient`](blf_engine::ChainClient), the JSON extraction plan format
//! and its compiler into an executable [`Program`](blf_engine::Program).

pub mod compile;
pub mod convert;
pub mod env;
pub mod plan;
pub mod provider;
pub mod tracing;
