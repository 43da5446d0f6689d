#![recursion_limit = "256"]

use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use burn_nopool_mnist::{
    Error,
    backend::{MainAutoBackend, MainDevice},
    cli::{AppArgs, HELP},
    training,
};

fn launch<AutoB: AutodiffBackend + MainDevice>(app_args: &AppArgs) -> Result<(), Error> {
    let training_config = app_args
        .load_training_config()?
        .unwrap_or_else(training::training_config);
    app_args.save_training_config(&training_config)?;

    let device = AutoB::main_device();
    let model = training::train::<AutoB>(&training_config, &app_args.data_dir, device)?;

    app_args.save_model::<AutoB::InnerBackend>(&model.valid())
}

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app_args = AppArgs::parse()?;
    if app_args.help {
        println!("{HELP}");
        return Ok(());
    }

    launch::<MainAutoBackend>(&app_args)
}
