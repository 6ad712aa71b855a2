//! # nudge-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Stream outbound engine signals to the UI and voice collaborators over
//!   **Server-Sent Events** (`/api/signals/stream`)
//! - Accept inbound completion, status and pointer events
//!   (`POST /api/inbound`)
//! - Expose rule management: reload, pack switch and cumulative state reset
//! - Report engine status and the latest sensor snapshot
//!
//! ## Dependency rule
//! Depends on `nudge-app` (engine handle, services, ports) and
//! `nudge-domain` (wire types). Never leaks axum types into the domain.

pub mod api;
pub mod error;
pub mod router;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;
