//! Utility functions and helpers
//!
//! Event and stack id generation, and document key naming.

pub mod ids;
pub mod naming;

pub use ids::{derive_stack_id, new_event_id};
pub use naming::{snake_case, snake_case_keys};
