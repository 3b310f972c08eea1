//! Sentinel command-line host
//!
//! Loads a page into the arena document, drives the scan pipeline against a single-host
//! HTTP classifier and manages the persisted feedback queue.

pub mod cli;
pub mod http_relay;

pub use http_relay::{HttpRelay, HttpRelayConfig, API_KEY_HEADER};
