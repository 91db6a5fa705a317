//! The building blocks of oriented bounding box detectors.
//!
//! It covers rotated overlap computation, anchor generation, delta coding,
//! anchor assignment and sampling, training targets and post-processing.

mod common;
pub mod anchor;
pub mod assigner;
pub mod coder;
pub mod config;
pub mod inference;
pub mod nms;
pub mod overlap;
pub mod ratio;
pub mod sampler;
pub mod target;
