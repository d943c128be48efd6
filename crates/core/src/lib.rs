// crates/core/src/lib.rs
pub mod converter;
pub mod error;
pub mod estimator;
pub mod filename_registry;
pub mod naming;

pub use converter::{ConversionOptions, ConversionProcess, ToolCommand, ToolLocator};
pub use error::*;
pub use estimator::{Estimate, MarkerRule, ProgressEstimator, Stage, UpdateThrottle};
pub use filename_registry::FilenameRegistry;
