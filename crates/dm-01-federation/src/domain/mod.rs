//! # Domain Module
//!
//! Core domain types for the Federation Authorizer.

pub mod errors;
pub mod value_objects;

pub use errors::*;
pub use value_objects::*;
