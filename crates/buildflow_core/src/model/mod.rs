//! Domain model for the reminder core.
//!
//! # Responsibility
//! - Define the read-only entity views the evaluator consumes.
//! - Define notification records produced by reminder passes.
//!
//! # Invariants
//! - Entities are owned by external stores; this crate never mutates them
//!   while evaluating reminders.
//! - All instants are UTC.

pub mod calendar;
pub mod entity;
pub mod notification;
