use burn::data::dataset::{
    Dataset, InMemDataset,
    transform::{Mapper, MapperDataset},
};
use burn::data::network::downloader::download_file_as_bytes;
use flate2::read::GzDecoder;
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};
use thiserror::Error;

// CVDF mirror of http://yann.lecun.com/exdb/mnist/
const URL: &str = "https://storage.googleapis.com/cvdf-datasets/mnist/";
const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

const IMAGES_MAGIC: u32 = 0x0000_0803;
const LABELS_MAGIC: u32 = 0x0000_0801;
const IMAGES_HEADER_LEN: usize = 16;
const LABELS_HEADER_LEN: usize = 8;

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;
pub const NUM_CLASSES: usize = 10;

/// Number of items in the training split.
pub const TRAIN_LEN: usize = 60_000;
/// Number of items in the test split.
pub const TEST_LEN: usize = 10_000;

/// Error type for [MnistDataset].
#[derive(Error, Debug)]
pub enum MnistError {
    /// I/O operation error.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The IDX header does not start with the expected magic number.
    #[error("invalid magic number: expected {expected:#010x}, found {found:#010x}")]
    InvalidMagic { expected: u32, found: u32 },

    /// The images are not 28x28.
    #[error("invalid image dimensions: {rows}x{cols}")]
    InvalidDimensions { rows: usize, cols: usize },

    /// The file is shorter than its header announces.
    #[error("truncated file: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    /// The image and label files disagree on the number of items.
    #[error("{images} images but {labels} labels")]
    CountMismatch { images: usize, labels: usize },

    /// A label outside of `0..10`.
    #[error("invalid label {label} at index {index}")]
    InvalidLabel { index: usize, label: u8 },
}

/// Dataset partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }

    fn images_file(&self) -> &'static str {
        match self {
            Split::Train => TRAIN_IMAGES,
            Split::Test => TEST_IMAGES,
        }
    }

    fn labels_file(&self) -> &'static str {
        match self {
            Split::Train => TRAIN_LABELS,
            Split::Test => TEST_LABELS,
        }
    }
}

/// MNIST item.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MnistItem {
    /// Image as a flat array of floats.
    /// Each value is a brightness, in between 0.0 and 255.0.
    ///
    /// # Shape
    /// [WIDTH * HEIGHT]
    pub image: Vec<f32>,

    /// Label of the image.
    /// Each value is in between 0 and 9.
    pub label: u8,
}

#[derive(Deserialize, Debug, Clone)]
struct MnistItemRaw {
    pub image_bytes: Vec<u8>,
    pub label: u8,
}

struct BytesToImage;

impl Mapper<MnistItemRaw, MnistItem> for BytesToImage {
    /// Convert a raw MNIST item (image bytes) to a MNIST item (flat array image).
    fn map(&self, item: &MnistItemRaw) -> MnistItem {
        debug_assert_eq!(item.image_bytes.len(), WIDTH * HEIGHT);

        let image = item
            .image_bytes
            .iter()
            .map(|brightness| -> f32 { (*brightness).as_() })
            .collect();

        MnistItem {
            image,
            label: item.label,
        }
    }
}

type MappedDataset = MapperDataset<InMemDataset<MnistItemRaw>, BytesToImage, MnistItemRaw>;

/// The MNIST dataset consists of 70,000 28x28 black-and-white images in 10 classes (one for each digits).
/// There are 60,000 training images and 10,000 test images.
///
/// The files are fetched from the [CVDF mirror](https://github.com/cvdfoundation/mnist) on first use
/// and kept decompressed under `<root>/mnist/<split>/`.
pub struct MnistDataset {
    dataset: MappedDataset,
}

impl Dataset<MnistItem> for MnistDataset {
    fn get(&self, index: usize) -> Option<MnistItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl MnistDataset {
    /// Creates the train dataset cached under `root`.
    pub fn train<P: AsRef<Path>>(root: P) -> Result<Self, MnistError> {
        Self::new(root, Split::Train)
    }

    /// Creates the test dataset cached under `root`.
    pub fn test<P: AsRef<Path>>(root: P) -> Result<Self, MnistError> {
        Self::new(root, Split::Test)
    }

    pub fn new<P: AsRef<Path>>(root: P, split: Split) -> Result<Self, MnistError> {
        let split_dir = Self::download(root.as_ref(), split)?;

        // MNIST is tiny so we can load it in-memory
        // Train images (u8): 28 * 28 * 60000 = 47.04Mb
        // Test images (u8): 28 * 28 * 10000 = 7.84Mb
        let images = parse_images(&read_file(&split_dir.join(split.images_file()))?)?;
        let labels = parse_labels(&read_file(&split_dir.join(split.labels_file()))?)?;
        if images.len() != labels.len() {
            return Err(MnistError::CountMismatch {
                images: images.len(),
                labels: labels.len(),
            });
        }
        log::info!(
            "Loaded {} {} items from {split_dir:?}",
            images.len(),
            split.name()
        );

        let items: Vec<_> = images
            .into_iter()
            .zip(labels)
            .map(|(image_bytes, label)| MnistItemRaw { image_bytes, label })
            .collect();

        let dataset = InMemDataset::new(items);
        let dataset = MapperDataset::new(dataset, BytesToImage);

        Ok(Self { dataset })
    }

    /// Makes sure both files of the split are present in the cache, fetching the missing ones.
    fn download(root: &Path, split: Split) -> Result<PathBuf, MnistError> {
        let split_dir = root.join("mnist").join(split.name());
        create_dir_all(&split_dir).map_err(|source| MnistError::Io {
            path: split_dir.clone(),
            source,
        })?;

        Self::download_file(split.images_file(), &split_dir)?;
        Self::download_file(split.labels_file(), &split_dir)?;

        Ok(split_dir)
    }

    /// Download a gzip file from the mirror and store its decoded content in `dest_dir`.
    /// Already cached files are left untouched.
    /// Panics if the download cannot be completed.
    fn download_file(name: &str, dest_dir: &Path) -> Result<PathBuf, MnistError> {
        let file_name = dest_dir.join(name);
        if file_name.exists() {
            return Ok(file_name);
        }

        log::info!("Downloading {name} into {dest_dir:?}");
        let bytes = download_file_as_bytes(&format!("{URL}{name}.gz"), name);

        // the cache only ever holds complete files
        let partial = dest_dir.join(format!("{name}.part"));
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| MnistError::Io { path, source }
        };
        let mut output_file = File::create(&partial).map_err(io_err(&partial))?;
        let mut gz_buffer = GzDecoder::new(&bytes[..]);
        std::io::copy(&mut gz_buffer, &mut output_file).map_err(io_err(&partial))?;
        std::fs::rename(&partial, &file_name).map_err(io_err(&file_name))?;

        Ok(file_name)
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, MnistError> {
    std::fs::read(path).map_err(|source| MnistError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, MnistError> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(MnistError::Truncated {
            expected: offset + 4,
            found: bytes.len(),
        })
}

fn check_magic(bytes: &[u8], expected: u32) -> Result<(), MnistError> {
    let found = read_u32(bytes, 0)?;
    if found != expected {
        return Err(MnistError::InvalidMagic { expected, found });
    }
    Ok(())
}

/// Parses the content of an IDX3 image file into one byte vector per image.
pub fn parse_images(bytes: &[u8]) -> Result<Vec<Vec<u8>>, MnistError> {
    check_magic(bytes, IMAGES_MAGIC)?;
    let size = read_u32(bytes, 4)? as usize;
    let rows = read_u32(bytes, 8)? as usize;
    let cols = read_u32(bytes, 12)? as usize;
    if rows != HEIGHT || cols != WIDTH {
        return Err(MnistError::InvalidDimensions { rows, cols });
    }

    let expected = IMAGES_HEADER_LEN + size * WIDTH * HEIGHT;
    let pixels = bytes
        .get(IMAGES_HEADER_LEN..expected)
        .ok_or(MnistError::Truncated {
            expected,
            found: bytes.len(),
        })?;

    Ok(pixels
        .chunks(WIDTH * HEIGHT)
        .map(|chunk| chunk.to_vec())
        .collect())
}

/// Parses the content of an IDX1 label file.
pub fn parse_labels(bytes: &[u8]) -> Result<Vec<u8>, MnistError> {
    check_magic(bytes, LABELS_MAGIC)?;
    let size = read_u32(bytes, 4)? as usize;

    let expected = LABELS_HEADER_LEN + size;
    let labels = bytes
        .get(LABELS_HEADER_LEN..expected)
        .ok_or(MnistError::Truncated {
            expected,
            found: bytes.len(),
        })?;

    if let Some((index, &label)) = labels
        .iter()
        .enumerate()
        .find(|(_, label)| **label as usize >= NUM_CLASSES)
    {
        return Err(MnistError::InvalidLabel { index, label });
    }

    Ok(labels.to_vec())
}
