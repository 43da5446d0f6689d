use crate::data::{HEIGHT, MnistBatch, NUM_CLASSES, WIDTH};
use burn::{
    nn::{
        Linear, LinearConfig, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
    },
    prelude::*,
    train::ClassificationOutput,
};

/// Channels produced by the first convolution.
pub const CONV1_CHANNELS: usize = 32;
/// Channels produced by the second convolution.
pub const CONV2_CHANNELS: usize = 64;

/// Spatial size after the two stride-2 convolutions (28 -> 14 -> 7).
pub const FEATURE_HEIGHT: usize = HEIGHT / 4;
pub const FEATURE_WIDTH: usize = WIDTH / 4;

/// Configuration of [NoPoolCnn].
#[derive(Config, Debug)]
pub struct NoPoolCnnConfig {
    #[config(default = 128)]
    pub hidden_size: usize,
    #[config(default = "NUM_CLASSES")]
    pub num_classes: usize,
}

/// Small digit classifier where stride-2 convolutions replace the pooling layers.
#[derive(Module, Debug)]
pub struct NoPoolCnn<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    pub activation: Relu,
}

impl NoPoolCnnConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> NoPoolCnn<B> {
        // kernel 3, stride 2, padding 1 halves both spatial dimensions
        let strided = |channels: [usize; 2]| {
            Conv2dConfig::new(channels, [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init::<B>(device)
        };

        NoPoolCnn {
            conv1: strided([1, CONV1_CHANNELS]),
            conv2: strided([CONV1_CHANNELS, CONV2_CHANNELS]),
            fc1: LinearConfig::new(
                CONV2_CHANNELS * FEATURE_HEIGHT * FEATURE_WIDTH,
                self.hidden_size,
            )
            .init(device),
            fc2: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> NoPoolCnn<B> {
    /// Convolution stack alone.
    ///
    /// # Shapes
    ///   - Images [batch_size, 1, height, width]
    ///   - Output [batch_size, 64, height / 2 / 2, width / 2 / 2]
    pub fn features(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.activation.forward(self.conv1.forward(images));
        self.activation.forward(self.conv2.forward(x))
    }

    /// Raw class scores (logits), not probabilities.
    ///
    /// # Shapes
    ///   - Images [batch_size, 1, 28, 28]
    ///   - Output [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _channels, _height, _width] = images.dims();

        let x = self.features(images);
        let x = x.reshape([batch_size, CONV2_CHANNELS * FEATURE_HEIGHT * FEATURE_WIDTH]);
        let x = self.activation.forward(self.fc1.forward(x));

        self.fc2.forward(x)
    }

    /// Scores for `batch` together with their mean cross-entropy against the targets.
    pub fn forward_classification(&self, batch: MnistBatch<B>) -> ClassificationOutput<B> {
        let targets = batch.targets;
        let output = self.forward(batch.images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}
