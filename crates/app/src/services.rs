//! Application services: use-case implementations.
//!
//! Services accept port implementations through generic parameters
//! (constructor injection), keeping this layer decoupled from adapters.

pub mod rule_service;
