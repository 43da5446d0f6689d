pub mod backend;
pub mod cli;
pub mod data;
pub mod error;
pub mod model;
pub mod training;

pub use error::Error;

pub mod prelude {
    pub use crate::data::{MnistBatch, MnistBatcher, MnistDataset, MnistItem};
    pub use crate::model::{NoPoolCnn, NoPoolCnnConfig};
    pub use crate::training::{Accuracy, TrainingConfig, evaluate, train, train_step};
}

/// Backend for test cases
#[cfg(test)]
pub type TestBackend = burn::backend::NdArray<f32>;

/// Backend for autodiff test cases
#[cfg(test)]
pub type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;
