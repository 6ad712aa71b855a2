//! # nudge-app
//!
//! Application layer: the trigger engine and its **port definitions**.
//!
//! ## Responsibilities
//! - Define **port traits** adapters implement:
//!   - `SensorProbe`: raw environment readings per cycle
//!   - `RuleRepository`: character packs and their rules
//!   - `CounterStore`: the few counters that survive restarts
//!   - `SignalPublisher`: outbound signals to the UI and voice collaborators
//!   - `Plugin`: third-party status checks and custom actions
//! - Run the engine: snapshot building, condition evaluation, rule
//!   scheduling, the pending slot, action chains and the busy coordinator
//! - Provide **in-process infrastructure** (signal bus) that needs no IO
//!
//! ## Dependency rule
//! Depends on `nudge-domain` only (plus `tokio` for tasks, channels and
//! timers). Never imports adapter crates.

pub mod coordinator;
pub mod engine;
pub mod evaluator;
pub mod event_bus;
pub mod executor;
pub mod pending;
pub mod plugin_registry;
pub mod ports;
pub mod scheduler;
pub mod services;
pub mod snapshot_builder;
