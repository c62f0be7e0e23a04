//! Enrichment API client.
//!
//! Implements [`firmscope_core::EnrichmentProvider`] against the company
//! enrichment endpoint. One request per lookup; failures are mapped onto
//! [`firmscope_core::EnrichmentError`] and never retried.

pub mod client;

pub use client::EnrichmentClient;
