use crate::Error;
use crate::training::TrainingConfig;
use burn::prelude::*;
use burn::record::CompactRecorder;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const HELP: &str = "\
Burn NoPool MNIST

Trains a small convolutional digit classifier (strided convolutions, no pooling)
on MNIST and prints the test accuracy after every epoch.

USAGE:
    burn-nopool-mnist [OPTIONS]

Without options, the dataset is cached under ./data, the default training
configuration is used (5 epochs, Adam lr=1e-3, batches of 64) and nothing is
written besides the dataset cache.

FLAGS:
    -h, --help                  Show this help message and exit

OPTIONS:
    -d, --data-dir <PATH>       Directory where the MNIST files are cached (downloaded if absent).
                                Defaults to ./data
    -c, --training-config <PATH>
                                Load the training configuration from this JSON file
    -a, --artifacts-path <PATH>
                                Directory where the effective training configuration and the
                                trained model are saved. Created if it does not exist.

Log verbosity follows RUST_LOG (default: info).
";

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const TRAINING_CONFIG_NAME: &str = "training_config.json";
pub const MODEL_NAME: &str = "model";

#[derive(Debug)]
pub struct AppArgs {
    pub help: bool,
    pub data_dir: PathBuf,
    pub training_config: Option<PathBuf>,
    pub artifacts_path: Option<PathBuf>,
}

impl AppArgs {
    pub fn parse() -> Result<Self, Error> {
        Self::from_args(pico_args::Arguments::from_env())
    }

    pub fn from_vec(args: Vec<OsString>) -> Result<Self, Error> {
        Self::from_args(pico_args::Arguments::from_vec(args))
    }

    fn from_args(mut pargs: pico_args::Arguments) -> Result<Self, Error> {
        let args = AppArgs {
            data_dir: pargs
                .opt_value_from_os_str(["-d", "--data-dir"], parse_path)?
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            training_config: pargs
                .opt_value_from_os_str(["-c", "--training-config"], parse_path)?,
            artifacts_path: pargs.opt_value_from_os_str(["-a", "--artifacts-path"], parse_path)?,
            // must parse flags after values
            help: pargs.contains(["-h", "--help"]),
        };

        let remaining = pargs.finish();
        if !remaining.is_empty() {
            return Err(Error::UnusedArgs(remaining));
        }

        Ok(args)
    }

    /// The configuration given with `--training-config`, if any.
    pub fn load_training_config(&self) -> Result<Option<TrainingConfig>, Error> {
        self.training_config
            .as_deref()
            .map(load_training_config)
            .transpose()
    }

    /// Creates the artifacts directory and stores `config` in it, when one was requested.
    pub fn save_training_config(&self, config: &TrainingConfig) -> Result<(), Error> {
        let Some(artifacts_path) = &self.artifacts_path else {
            return Ok(());
        };
        std::fs::create_dir_all(artifacts_path).map_err(|err| {
            Error::Config(format!("cannot create {artifacts_path:?}: {err}"))
        })?;
        save_training_config(&artifacts_path.join(TRAINING_CONFIG_NAME), config)
    }

    /// Records `model` into the artifacts directory, when one was requested.
    pub fn save_model<B: Backend>(&self, model: &impl Module<B>) -> Result<(), Error> {
        match &self.artifacts_path {
            Some(artifacts_path) => save_model(artifacts_path, model),
            None => Ok(()),
        }
    }
}

fn parse_path(s: &std::ffi::OsStr) -> Result<PathBuf, &'static str> {
    Ok(s.into())
}

pub fn save_training_config(path: &Path, config: &TrainingConfig) -> Result<(), Error> {
    log::info!("Saving training config into {path:?}");
    config
        .save(path)
        .map_err(|err| Error::Config(format!("cannot save {path:?}: {err}")))
}

pub fn load_training_config(path: &Path) -> Result<TrainingConfig, Error> {
    log::info!("Loading training config from {path:?}");
    let config = TrainingConfig::load(path)
        .map_err(|err| Error::Config(format!("cannot load {path:?}: {err:?}")))?;
    if config.batch_size == 0 || config.test_batch_size == 0 {
        return Err(Error::Config(format!(
            "{path:?}: batch sizes must be positive (batch_size={}, test_batch_size={})",
            config.batch_size, config.test_batch_size
        )));
    }
    Ok(config)
}

pub fn save_model<B: Backend>(artifact_dir: &Path, model: &impl Module<B>) -> Result<(), Error> {
    let path = artifact_dir.join(MODEL_NAME);
    log::info!("Saving model to {path:?}");
    model
        .clone()
        .save_file(path, &CompactRecorder::new()) // ext added automatically
        .map_err(|err| Error::Recorder(format!("{err:?}")))
}
