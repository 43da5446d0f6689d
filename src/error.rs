use crate::data::MnistError;
use thiserror::Error;

/// Errors that end a training run.
#[derive(Error, Debug)]
pub enum Error {
    /// The dataset could not be read from the cache directory.
    #[error(transparent)]
    Dataset(#[from] MnistError),

    /// Invalid command line.
    #[error("invalid arguments: {0}")]
    Args(#[from] pico_args::Error),

    /// Arguments left over after parsing.
    #[error("unused arguments: {0:?}")]
    UnusedArgs(Vec<std::ffi::OsString>),

    /// A training configuration could not be loaded or saved.
    #[error("config error: `{0}`")]
    Config(String),

    /// The trained model could not be recorded.
    #[error("recorder error: `{0}`")]
    Recorder(String),
}
