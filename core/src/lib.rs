//! Quantitative MRI parameter maps: the MTsat relaxometry pipeline and DTI helpers.
//!
//! Three weighted acquisitions flow through well-defined processing stages
//! (echo averaging, smoothing, R1, amplitude, MTsat) held in memory, with file
//! I/O confined to the loader and writer and a scoped scratch space per run.

pub mod diffusion;
pub mod io;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod telemetry;
pub mod tools;
pub mod volume;
pub mod workspace;

pub use prelude::{ProcessingStage, StageError, StageInput, StageOutput};
pub use processing::{derive_mtsat, Pipeline, PipelineError};
