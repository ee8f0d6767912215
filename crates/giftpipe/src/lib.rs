//! HTTP surface, configuration and logging for the gift-suggestion service.
//!
//! The pipeline itself lives in `giftpipe-local`; this crate only wires collaborators from the
//! environment and maps pipeline outcomes onto HTTP.

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
