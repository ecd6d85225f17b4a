//! Generate Kubernetes manifests from natural-language requirements and apply
//! them to a live cluster.
//!
//! The pipeline is split into small pieces that the CLI wires together:
//!
//! - [`cache`]: key derivation and completion caches (file or memory backed)
//! - [`provider`]: LM provider clients and the bounded retry state machine
//! - [`manifest`]: generation orchestration and fence stripping
//! - [`kube`]: multi-document decoding, discovery-based resolution and apply
//!
//! Configuration is plain data loaded by [`config`] and handed to constructors;
//! nothing in the core reads process-wide state.
pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod kube;
pub mod manifest;
pub mod provider;
pub mod util;

pub use error::{Error, Result};
