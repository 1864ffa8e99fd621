//! Reminder subsystem: rule evaluation, dedup ledger and periodic driver.
//!
//! # Responsibility
//! - Turn an entity snapshot into due notifications (`evaluator`).
//! - Keep the same-day and once-per-threshold dedup record (`ledger`).
//! - Re-run evaluation on a fixed period (`scheduler`).
//!
//! # Invariants
//! - Evaluation never performs I/O; persistence lives in `repo` and the pass
//!   service in `service`.

pub mod evaluator;
pub mod ledger;
pub mod scheduler;
