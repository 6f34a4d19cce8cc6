pub mod loader;
pub mod preprocessing;
pub mod postprocessing;
pub mod transforms;

pub use loader::ImageLoader;
pub use preprocessing::{FeatureVector, ImagePreprocessor, FEATURE_VECTOR_LENGTH, INPUT_SIDE};
pub use postprocessing::{Report, ReportFormatter};
pub use transforms::ImageTransforms;
