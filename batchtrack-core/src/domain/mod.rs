//! Core domain types
//!
//! This module contains the structures that describe a tracked batch job:
//! the persisted record, the canonical status vocabulary, the
//! specification an operator submits, and pipelines of such jobs.

pub mod job;
pub mod pipeline;
pub mod resources;
pub mod spec;
pub mod status;
