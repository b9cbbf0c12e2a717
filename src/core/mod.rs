//! Core types shared by every stage of the update pipeline.
//!
//! Currently this is the error taxonomy: [`UpdateError`], its retry
//! classification through [`classify`], and the CLI-facing [`ErrorContext`].

pub mod error;

pub use error::{ErrorClass, ErrorContext, UpdateError, classify, user_friendly_error};
