//! Sampling strategies.
//!
//! - [`UniformRandomSampler`] draws every minimal subset uniformly at random
//!   (RANSAC, MSAC, LMedS).
//! - [`ProsacSampler`] draws from a progressively growing prefix of the
//!   measurements ranked by quality (PROSAC, PROMedS).

pub mod prosac;
pub mod uniform;

pub use prosac::ProsacSampler;
pub use uniform::UniformRandomSampler;
