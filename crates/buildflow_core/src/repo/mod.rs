//! Repository contracts and SQLite implementations.
//!
//! # Responsibility
//! - Serve the external stores the reminder pass talks to: entities, the
//!   dedup ledger, the notification inbox and persisted settings.
//! - Keep SQL details out of services and the evaluator.
//!
//! # Invariants
//! - Entity writes validate before touching SQL; reads re-validate rows.
//! - Repository APIs return semantic errors (`NotFound`, `InvalidData`) in
//!   addition to transport errors.

pub mod entity_repo;
pub mod error;
pub mod ledger_repo;
pub mod notification_repo;
pub mod settings_repo;
