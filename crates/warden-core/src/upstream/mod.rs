//! Contract the core needs from an upstream messaging platform.
//!
//! Concrete platforms live in adapter crates and implement these traits.

pub mod port;
pub mod types;
