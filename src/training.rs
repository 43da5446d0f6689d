use crate::Error;
use crate::data::{
    MnistBatch, MnistDataLoader, MnistDataset, num_batches, test_dataloader, train_dataloader,
};
use crate::model::{NoPoolCnn, NoPoolCnnConfig};
use burn::prelude::*;
use burn::{
    module::AutodiffModule,
    optim::{Adam, AdamConfig, GradientsParams, Optimizer, adaptor::OptimizerAdaptor},
    tensor::backend::AutodiffBackend,
};
use std::path::Path;

#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub model: NoPoolCnnConfig,
    pub optimizer: AdamConfig,
    #[config(default = 5)]
    pub num_epochs: usize,
    #[config(default = 64)]
    pub batch_size: usize,
    #[config(default = 1000)]
    pub test_batch_size: usize,
    #[config(default = 2)]
    pub num_workers: usize,
    #[config(default = 1e-3)]
    pub lr: f64,
    #[config(default = 42)]
    pub seed: u64,
    /// Training batches between two loss reports.
    #[config(default = 100)]
    pub log_interval: usize,
}

/// Adam with epsilon 1e-8.
pub fn optimizer_config() -> AdamConfig {
    AdamConfig::new().with_epsilon(1e-8)
}

/// Five epochs of Adam at lr=1e-3, batches of 64 for training and 1000 for evaluation.
pub fn training_config() -> TrainingConfig {
    TrainingConfig::new(NoPoolCnnConfig::new(), optimizer_config())
}

pub type Optim<AutoB> = OptimizerAdaptor<Adam, NoPoolCnn<AutoB>, AutoB>;

/// Share of correctly classified test images.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Accuracy {
    pub correct: usize,
    pub total: usize,
}

impl Accuracy {
    /// Accuracy in `[0, 100]`; an empty evaluation counts as 0.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.correct as f64 / self.total as f64
        }
    }
}

impl core::fmt::Display for Accuracy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2}%", self.percent())
    }
}

/// Trains a fresh model for `config.num_epochs` epochs on the MNIST data cached under `data_dir`,
/// evaluating it on the test split after every epoch.
pub fn train<AutoB: AutodiffBackend>(
    config: &TrainingConfig,
    data_dir: &Path,
    device: AutoB::Device,
) -> Result<NoPoolCnn<AutoB>, Error> {
    AutoB::seed(&device, config.seed);

    let mut model: NoPoolCnn<AutoB> = config.model.init(&device);
    let mut optim: Optim<AutoB> = config.optimizer.init();

    let dataloader_train: MnistDataLoader<AutoB> = train_dataloader(
        MnistDataset::train(data_dir)?,
        config.batch_size,
        config.num_workers,
        config.seed,
    );
    let dataloader_test: MnistDataLoader<AutoB::InnerBackend> =
        test_dataloader(MnistDataset::test(data_dir)?, config.test_batch_size);

    log::info!(
        "Training on {} items ({} batches per epoch), evaluating on {} items ({} batches)",
        dataloader_train.num_items(),
        num_batches(dataloader_train.num_items(), config.batch_size),
        dataloader_test.num_items(),
        num_batches(dataloader_test.num_items(), config.test_batch_size),
    );

    for epoch in 1..config.num_epochs + 1 {
        println!("Epoch {epoch}");
        model = epoch_train(&dataloader_train, model, &mut optim, config, epoch, &device);

        let accuracy = evaluate(&model.valid(), &dataloader_test, &device);
        println!("Test Accuracy: {accuracy}");
    }
    log::info!("Training finished");

    Ok(model)
}

/// One full pass over the training loader.
pub fn epoch_train<AutoB: AutodiffBackend>(
    dataloader_train: &MnistDataLoader<AutoB>,
    mut model: NoPoolCnn<AutoB>,
    optim: &mut Optim<AutoB>,
    config: &TrainingConfig,
    epoch: usize,
    device: &AutoB::Device,
) -> NoPoolCnn<AutoB> {
    let total = num_batches(dataloader_train.num_items(), config.batch_size);
    let log_interval = config.log_interval.max(1);

    for (b, batch) in dataloader_train.iter().enumerate() {
        let b = b + 1;
        let (updated, loss) = train_step(model, optim, batch.to_device(device), config.lr);
        model = updated;

        if b % log_interval == 0 || b == total {
            log::info!(
                "Epoch {epoch}/{}, Batch {b:0>4}/{total}, Loss {:.4}",
                config.num_epochs,
                loss.into_scalar().elem::<f64>(),
            );
        }
    }

    model
}

/// Mean cross-entropy on `batch`, backward pass, then one optimizer update.
///
/// Returns the updated model and the loss it was updated from.
pub fn train_step<AutoB: AutodiffBackend>(
    model: NoPoolCnn<AutoB>,
    optim: &mut Optim<AutoB>,
    batch: MnistBatch<AutoB>,
    lr: f64,
) -> (NoPoolCnn<AutoB>, Tensor<AutoB, 1>) {
    let loss = model.forward_classification(batch).loss;

    let grads = loss.backward();
    let grads = GradientsParams::from_grads(grads, &model);
    let model = optim.step(lr, model, grads);

    (model, loss)
}

/// Counts the test images whose highest score is on the true label.
pub fn evaluate<B: Backend>(
    model: &NoPoolCnn<B>,
    dataloader_test: &MnistDataLoader<B>,
    device: &B::Device,
) -> Accuracy {
    let mut accuracy = Accuracy::default();

    for batch in dataloader_test.iter() {
        let batch = batch.to_device(device);
        let batch_size = batch.batch_size();

        let predicted = model.forward(batch.images).argmax(1).reshape([batch_size]);
        let correct = predicted
            .equal(batch.targets)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();

        accuracy.correct += correct as usize;
        accuracy.total += batch_size;
    }

    accuracy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        HEIGHT, MnistError, MnistItem, Split, WIDTH, fake_items, idx_images, idx_labels,
        write_split,
    };
    use crate::{TestAutodiffBackend, TestBackend};
    use burn::data::dataset::InMemDataset;
    use burn::module::Param;
    use temp_dir::TempDir;

    fn write_fixture_split(root: &Path, split: Split, len: usize) {
        let images: Vec<Vec<u8>> = (0..len)
            .map(|i| {
                (0..WIDTH * HEIGHT)
                    .map(|p| ((p * 3 + i * 29) % 256) as u8)
                    .collect()
            })
            .collect();
        let labels: Vec<u8> = (0..len).map(|i| (i % 10) as u8).collect();
        write_split(root, split, &idx_images(&images), &idx_labels(&labels));
    }

    fn weights<B: Backend>(model: &NoPoolCnn<B>) -> Vec<f32> {
        model
            .fc2
            .weight
            .val()
            .to_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .unwrap()
    }

    #[test]
    fn accuracy_display() {
        let accuracy = Accuracy {
            correct: 9_871,
            total: 10_000,
        };
        assert_eq!(accuracy.to_string(), "98.71%");
        assert_eq!(Accuracy::default().percent(), 0.0);
        assert_eq!(
            Accuracy {
                correct: 3,
                total: 3
            }
            .to_string(),
            "100.00%"
        );
    }

    #[test]
    fn default_config_matches_recipe() {
        let config = training_config();
        assert_eq!(config.num_epochs, 5);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.test_batch_size, 1000);
        assert_eq!(config.lr, 1e-3);
        assert_eq!(config.model.hidden_size, 128);
        assert_eq!(config.model.num_classes, 10);
    }

    #[test]
    fn train_step_updates_parameters() {
        let device = Default::default();
        let config = training_config();
        let model: NoPoolCnn<TestAutodiffBackend> = config.model.init(&device);
        let mut optim: Optim<TestAutodiffBackend> = config.optimizer.init();

        let loader: MnistDataLoader<TestAutodiffBackend> =
            test_dataloader(InMemDataset::new(fake_items(8)), 8);
        let batch = loader.iter().next().unwrap();

        let before = weights(&model);
        let (model, loss) = train_step(model, &mut optim, batch, config.lr);
        let after = weights(&model);

        assert_eq!(before.len(), after.len());
        assert_ne!(before, after);
        assert!(loss.into_scalar().elem::<f32>().is_finite());
    }

    #[test]
    fn evaluation_is_repeatable() {
        let device = Default::default();
        let model: NoPoolCnn<TestBackend> = NoPoolCnnConfig::new().init(&device);
        let loader: MnistDataLoader<TestBackend> =
            test_dataloader(InMemDataset::new(fake_items(25)), 10);

        let first = evaluate(&model, &loader, &device);
        let second = evaluate(&model, &loader, &device);

        assert_eq!(first, second);
        assert_eq!(first.total, 25);
        assert!(first.correct <= first.total);
        assert!((0.0..=100.0).contains(&first.percent()));
    }

    #[test]
    fn evaluation_counts_matches() {
        let device = Default::default();
        let mut model: NoPoolCnn<TestBackend> = NoPoolCnnConfig::new().init(&device);
        // all-zero last layer with a bias favoring class 3
        model.fc2.weight = Param::from_tensor(model.fc2.weight.val().zeros_like());
        let bias = Tensor::<TestBackend, 1>::from_floats(
            [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            &device,
        );
        model.fc2.bias = Some(Param::from_tensor(bias));

        let items: Vec<MnistItem> = [3u8, 1, 3, 3]
            .into_iter()
            .map(|label| MnistItem {
                image: vec![0.0; WIDTH * HEIGHT],
                label,
            })
            .collect();
        let loader: MnistDataLoader<TestBackend> = test_dataloader(InMemDataset::new(items), 3);

        let accuracy = evaluate(&model, &loader, &device);
        assert_eq!(
            accuracy,
            Accuracy {
                correct: 3,
                total: 4
            }
        );
        assert_eq!(accuracy.to_string(), "75.00%");
    }

    #[test]
    fn epoch_train_covers_the_loader() {
        let device = Default::default();
        let config = training_config().with_batch_size(16).with_log_interval(1);
        let model: NoPoolCnn<TestAutodiffBackend> = config.model.init(&device);
        let mut optim: Optim<TestAutodiffBackend> = config.optimizer.init();
        let loader: MnistDataLoader<TestAutodiffBackend> =
            train_dataloader(InMemDataset::new(fake_items(40)), 16, 0, config.seed);

        let before = weights(&model);
        let model = epoch_train(&loader, model, &mut optim, &config, 1, &device);
        assert_ne!(before, weights(&model));

        let test_loader: MnistDataLoader<TestBackend> =
            test_dataloader(InMemDataset::new(fake_items(20)), 10);
        let accuracy = evaluate(&model.valid(), &test_loader, &device);
        assert_eq!(accuracy.total, 20);
        assert!((0.0..=100.0).contains(&accuracy.percent()));
    }

    #[test]
    fn train_runs_every_epoch_from_the_cache() {
        let tmp = TempDir::new().unwrap();
        write_fixture_split(tmp.path(), Split::Train, 24);
        write_fixture_split(tmp.path(), Split::Test, 10);

        let device = Default::default();
        let config = training_config()
            .with_num_epochs(2)
            .with_batch_size(8)
            .with_test_batch_size(4)
            .with_num_workers(0);
        let untrained: NoPoolCnn<TestAutodiffBackend> = config.model.init(&device);

        let model = train::<TestAutodiffBackend>(&config, tmp.path(), device).unwrap();
        assert_ne!(weights(&untrained), weights(&model));

        let test_loader: MnistDataLoader<TestBackend> =
            test_dataloader(MnistDataset::test(tmp.path()).unwrap(), 4);
        let accuracy = evaluate(&model.valid(), &test_loader, &Default::default());
        assert_eq!(accuracy.total, 10);
    }

    #[test]
    fn train_reports_unreadable_cache() {
        let tmp = TempDir::new().unwrap();
        write_fixture_split(tmp.path(), Split::Test, 4);
        let train_dir = tmp.path().join("mnist").join(Split::Train.name());
        std::fs::create_dir_all(train_dir.join("train-images-idx3-ubyte")).unwrap();
        std::fs::write(train_dir.join("train-labels-idx1-ubyte"), idx_labels(&[1])).unwrap();

        let config = training_config().with_num_epochs(1).with_num_workers(0);
        let result = train::<TestAutodiffBackend>(&config, tmp.path(), Default::default());
        assert!(matches!(
            result,
            Err(Error::Dataset(MnistError::Io { .. }))
        ));
    }
}
