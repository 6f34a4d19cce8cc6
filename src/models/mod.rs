pub mod predictor;
pub mod svm;
pub mod onnx;
pub mod artifact;
pub mod manager;

pub use predictor::Predictor;
pub use svm::LinearSvm;
pub use onnx::OnnxPredictor;
pub use artifact::ArtifactStore;
pub use manager::{LoaderState, ModelManager, ModelStats};
