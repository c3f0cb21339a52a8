//! Batchtrack Core
//!
//! Core types shared by every batchtrack crate.
//!
//! This crate contains:
//! - Domain types: job records, canonical statuses, job specifications
//! - The `.meta` record codec used by the on-disk record store
//! - DTOs: presentation views and the scheduler submission request

pub mod domain;
pub mod dto;
pub mod meta;
