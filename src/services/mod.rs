//! Application services for the Idios search core
//!
//! The command layer composes embedding providers and the vector store
//! adapter into the operations exposed over the work queue; the
//! verification service carries the local-feature search pipeline.

pub mod commands;
pub mod homography;
pub mod verification;

pub use commands::{CommandService, InsertOutcome, ListOutput, ModelRuntime};
pub use homography::{Homography, fit_homography};
