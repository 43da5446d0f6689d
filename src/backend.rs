use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

// `ndarray` is on by default, any accelerator feature takes precedence over it.

#[cfg(all(
    feature = "ndarray",
    not(any(
        feature = "tch-cpu",
        feature = "tch-gpu",
        feature = "wgpu",
        feature = "cuda"
    ))
))]
pub type MainBackend = burn::backend::NdArray<f32>;
#[cfg(any(feature = "tch-cpu", feature = "tch-gpu"))]
pub type MainBackend = burn::backend::libtorch::LibTorch<f32>;
#[cfg(all(feature = "wgpu", not(any(feature = "tch-cpu", feature = "tch-gpu"))))]
pub type MainBackend = burn::backend::wgpu::Wgpu<f32, i32>;
#[cfg(all(
    feature = "cuda",
    not(any(feature = "tch-cpu", feature = "tch-gpu", feature = "wgpu"))
))]
pub type MainBackend = burn::backend::Cuda<f32, i32>;

#[cfg(not(any(
    feature = "ndarray",
    feature = "tch-cpu",
    feature = "tch-gpu",
    feature = "wgpu",
    feature = "cuda"
)))]
std::compile_error!(
    "No backend selected. Enable one of the `ndarray`, `tch-cpu`, `tch-gpu`, `wgpu` or `cuda` features."
);

pub type MainAutoBackend = burn::backend::Autodiff<MainBackend>;

/// Device a backend trains and evaluates on.
pub trait MainDevice: Backend {
    fn main_device() -> <Self as Backend>::Device {
        Default::default()
    }
}

#[cfg(not(feature = "tch-gpu"))]
impl MainDevice for MainBackend {}
#[cfg(all(feature = "tch-gpu", not(target_os = "macos")))]
impl MainDevice for MainBackend {
    fn main_device() -> <Self as Backend>::Device {
        burn::backend::libtorch::LibTorchDevice::Cuda(0)
    }
}
#[cfg(all(feature = "tch-gpu", target_os = "macos"))]
impl MainDevice for MainBackend {
    fn main_device() -> <Self as Backend>::Device {
        burn::backend::libtorch::LibTorchDevice::Mps
    }
}

impl MainDevice for MainAutoBackend {
    fn main_device() -> <Self as Backend>::Device {
        <<Self as AutodiffBackend>::InnerBackend as MainDevice>::main_device()
    }
}
