use super::dataset::{HEIGHT, MnistItem, WIDTH};
use burn::data::dataloader::{DataLoader, DataLoaderBuilder, batcher::Batcher};
use burn::data::dataset::Dataset;
use burn::prelude::*;
use std::sync::Arc;

/// Mean brightness of the MNIST training images, on the [0, 1] scale.
pub const MNIST_MEAN: f64 = 0.1307;
/// Standard deviation of the MNIST training images, on the [0, 1] scale.
pub const MNIST_STD: f64 = 0.3081;

pub type MnistDataLoader<B> = Arc<dyn DataLoader<B, MnistBatch<B>> + 'static>;

#[derive(Clone, Default)]
pub struct MnistBatcher {}

#[derive(Clone, Debug)]
pub struct MnistBatch<B: Backend> {
    /// The input feature is the brightness, z-score normalized with [MNIST_MEAN] and [MNIST_STD].
    ///
    /// * `z = (value / 255 - mean) / stddev`,
    /// * `value = (z * stddev + mean) * 255`.
    ///
    /// # Shape
    /// [batch_size, 1, HEIGHT, WIDTH]
    pub images: Tensor<B, 4>,
    /// # Shape
    /// [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> MnistBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.targets.dims()[0]
    }

    pub fn to_device(self, device: &B::Device) -> Self {
        Self {
            images: self.images.to_device(device),
            targets: self.targets.to_device(device),
        }
    }
}

impl<B: Backend> Batcher<B, MnistItem, MnistBatch<B>> for MnistBatcher {
    fn batch(&self, items: Vec<MnistItem>, device: &B::Device) -> MnistBatch<B> {
        let batch_size = items.len();
        let (items_image, items_label): (Vec<_>, Vec<_>) = items
            .into_iter()
            .map(|item| (item.image, item.label as i64))
            .unzip();

        let pixels: Vec<f32> = items_image.into_iter().flatten().collect();
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, 1, HEIGHT, WIDTH]).convert::<B::FloatElem>(),
            device,
        );
        // scale between [0,1], then make the mean=0 and std=1
        let images = ((images / 255) - MNIST_MEAN) / MNIST_STD;

        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(items_label, [batch_size]).convert::<B::IntElem>(),
            device,
        );

        MnistBatch { images, targets }
    }
}

/// Training loader: a fresh permutation of `dataset` on every traversal.
pub fn train_dataloader<B, D>(
    dataset: D,
    batch_size: usize,
    num_workers: usize,
    seed: u64,
) -> MnistDataLoader<B>
where
    B: Backend,
    D: Dataset<MnistItem> + 'static,
{
    DataLoaderBuilder::new(MnistBatcher::default())
        .batch_size(batch_size)
        .shuffle(seed)
        .num_workers(num_workers)
        .build(dataset)
}

/// Evaluation loader: batches follow the dataset order.
pub fn test_dataloader<B, D>(dataset: D, batch_size: usize) -> MnistDataLoader<B>
where
    B: Backend,
    D: Dataset<MnistItem> + 'static,
{
    DataLoaderBuilder::new(MnistBatcher::default())
        .batch_size(batch_size)
        .build(dataset)
}

/// Number of batches needed to cover `num_items`, the last one possibly partial.
pub fn num_batches(num_items: usize, batch_size: usize) -> usize {
    num_items.div_ceil(batch_size)
}
