#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
pub mod connections;
pub mod core;
pub mod error;
