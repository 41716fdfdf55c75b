//! # Backend Profile Parsers
//!
//! Per-provider-kind model-list parsers consumed through
//! [`crate::profile::profile_for`], plus the shared HTTP GET helper used by
//! both the discovery loop and the health prober.

pub mod http_client;
pub mod lmstudio;
pub mod ollama;
pub mod openai_compatible;
pub mod vllm;
