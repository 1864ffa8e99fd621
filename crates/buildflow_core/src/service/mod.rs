//! Use-case services.
//!
//! # Responsibility
//! - Orchestrate repositories and the evaluator into reminder passes.
//! - Own inbox retention and snapshot import policies.
//! - Keep CLI callers away from storage details.

pub mod import_service;
pub mod inbox_service;
pub mod reminder_service;
