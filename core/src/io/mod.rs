//! Loader and writer boundary: the only places a run touches image files.

pub mod loader;
pub mod nii;
pub mod raw;
pub mod writer;

pub use loader::{AcquisitionSource, SourceSet, VolumeLoader, DEFAULT_CONVERTER};
pub use writer::{MapFormat, MapWriter};
