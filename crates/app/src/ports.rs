//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the engine and the adapter
//! layer can depend on them without creating circular dependencies.

pub mod counter_store;
pub mod event_bus;
pub mod plugin;
pub mod rule_repo;
pub mod sensor;

pub use counter_store::CounterStore;
pub use event_bus::SignalPublisher;
pub use plugin::Plugin;
pub use rule_repo::{PackSummary, RulePack, RuleRepository};
pub use sensor::{ClockOverride, Fallback, RawReading, SensorProbe};
