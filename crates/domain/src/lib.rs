//! # nudge-domain
//!
//! Pure domain model for the nudge behavior trigger engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, clock readings
//! - Define **Rules** (condition tree → action chain, with firing gates)
//! - Define **Snapshots** (one immutable view of the environment per tick)
//! - Define **Interaction stats** (hover, press and click history)
//! - Define **Plugins** (descriptors and status triples)
//! - Define **Signals** (what flows to and from the UI and voice collaborators)
//! - Contain leaf predicate evaluation and invariant enforcement
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod interaction;
pub mod plugin;
pub mod rule;
pub mod signal;
pub mod snapshot;
