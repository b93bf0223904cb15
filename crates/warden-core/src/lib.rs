//! Core of the warden policy guard.
//!
//! This crate is platform-agnostic: the messaging platform sits behind the
//! traits in [`upstream::port`], implemented in adapter crates.

pub mod command;
pub mod config;
pub mod control;
pub mod credentials;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod logging;
pub mod maintenance;
pub mod policy;
pub mod reconcile;
pub mod upstream;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
