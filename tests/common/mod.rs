//! Shared fixtures for the functional and property test targets.

#![allow(dead_code)]


pub use fixtures::*;
