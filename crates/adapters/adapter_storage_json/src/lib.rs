//! # nudge-adapter-storage-json
//!
//! Filesystem storage for character packs.
//!
//! A packs directory holds one folder per pack, each with a `pack.json`
//! manifest:
//!
//! ```text
//! packs/
//!   Resona_Default/
//!     pack.json        {"pack_info": {"id": ...}, "logic": {...}, "audio": {...}}
//!     triggers.json    [ {rule}, {rule}, ... ]
//!     state.json       {"total_clicks": 12, ...}
//! ```
//!
//! ## Responsibilities
//! - Implement [`RuleRepository`](nudge_app::ports::RuleRepository): resolve
//!   a pack by manifest id or folder name and parse its rule file
//! - Implement [`CounterStore`](nudge_app::ports::CounterStore) on the
//!   pack's `state.json`
//!
//! ## Dependency rule
//! Depends on `nudge-app` (for port traits) and `nudge-domain` (for domain types).

pub mod counter_store;
pub mod error;
pub mod manifest;
pub mod pack_repo;

pub use counter_store::JsonCounterStore;
pub use pack_repo::JsonPackRepository;
