//! Data Transfer Objects
//!
//! Lightweight shapes that cross crate boundaries: the request handed to
//! the scheduler adapter and the views rendered by the front end.

pub mod job;
pub mod submit;
