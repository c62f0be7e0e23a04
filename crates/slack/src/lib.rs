//! Slack integration - Socket Mode bot interface
//!
//! This crate provides the Slack side of firmscope:
//! - **Socket Mode** (`socket`) - WebSocket connection to Slack (no public URL needed)
//! - **Slash Commands** (`commands`) - `/company <url>` plus `company <url>` in DMs and mentions
//! - **Events** (`events`) - Envelope decoding and dispatch to handlers
//! - **Block Kit** (`blocks`) - Status, usage and error message builders
//! - **Web API** (`web`) - `chat.*` calls and the external file upload
//! - **Lookup** (`lookup`) - The enrichment flow each command runs
//!
//! # Architecture
//!
//! ```text
//! Slack Socket Mode → SocketModeRunner → EventDispatcher → CompanyLookupFlow
//!                                                             ↓           ↓
//!                                              EnrichmentProvider    SlackWebApi
//! ```
//!
//! # Key Types
//!
//! - `SocketModeRunner` - WebSocket event loop with reconnection logic
//! - `EventDispatcher` - Routes events to appropriate handlers
//! - `CompanyLookupFlow` - Validate, enrich, upload, update status
//! - `HttpSlackWebApi` - reqwest-backed Slack Web API client

pub mod blocks;
pub mod commands;
pub mod events;
pub mod lookup;
pub mod socket;
pub mod web;
