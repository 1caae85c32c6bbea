//! Shared fixtures for the integration tests.

#![allow(dead_code)]

pub mod builders;
pub mod fakes;

pub use builders::*;
pub use fakes::*;
