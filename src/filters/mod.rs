//! Processor module.
//!
//! Contains the processor registry and the built-in filters, generators and
//! mergers.

pub mod registry;
pub mod builtin;

pub use registry::{ProcessorFactory, ProcessorRegistry};
