//! Arena-tracked tensors.
//!
//! Every [`Tensor`] holds a slot in the [`TensorArena`] it was created from
//! and gives it back when dropped, so the arena's live count is a leak check
//! for the preprocess/predict cycle.

use image::RgbImage;
use ndarray::{Array3, ArrayD, Axis, IxDyn};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Int32,
    Float32,
}

#[derive(Debug, Clone, Default)]
pub struct TensorArena {
    live: Arc<AtomicUsize>,
}

impl TensorArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_tensors(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn track(&self, data: ArrayD<f32>, dtype: DType) -> Tensor {
        self.live.fetch_add(1, Ordering::SeqCst);
        Tensor {
            data,
            dtype,
            arena: self.clone(),
        }
    }

    /// Runs `f` and checks that only the tensor it returns outlives it.
    pub fn tidy<F>(&self, f: F) -> Tensor
    where
        F: FnOnce() -> Tensor,
    {
        let before = self.num_tensors();
        let kept = f();
        let after = self.num_tensors();
        if after > before + 1 {
            tracing::warn!(
                "{} intermediate tensors outlived their scope",
                after - before - 1
            );
        }
        kept
    }
}

#[derive(Debug)]
pub struct Tensor {
    data: ArrayD<f32>,
    dtype: DType,
    arena: TensorArena,
}

impl Tensor {
    /// Pixel tensor of shape `[height, width, 3]` with raw channel values.
    pub fn from_pixels(arena: &TensorArena, image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let pixels = Array3::from_shape_fn(
            (height as usize, width as usize, 3),
            |(y, x, channel)| image.get_pixel(x as u32, y as u32)[channel] as f32,
        );
        arena.track(pixels.into_dyn(), DType::Int32)
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn first_scalar(&self) -> Option<f32> {
        self.data.iter().next().copied()
    }

    /// Nearest-neighbour resize of the two spatial axes of an `[h, w, c]`
    /// tensor, without corner alignment or half-pixel centers. An input with
    /// no pixels resizes to zeros.
    pub fn resize_nearest_neighbor(&self, [out_height, out_width]: [usize; 2]) -> Tensor {
        let shape = self.data.shape();
        let (in_height, in_width, channels) = (shape[0], shape[1], shape[2]);
        if in_height == 0 || in_width == 0 {
            let zeros = ArrayD::zeros(IxDyn(&[out_height, out_width, channels]));
            return self.arena.track(zeros, self.dtype);
        }
        let scale_y = in_height as f64 / out_height as f64;
        let scale_x = in_width as f64 / out_width as f64;

        let resized = ArrayD::from_shape_fn(
            IxDyn(&[out_height, out_width, channels]),
            |index| {
                let src_y = ((index[0] as f64 * scale_y).floor() as usize).min(in_height - 1);
                let src_x = ((index[1] as f64 * scale_x).floor() as usize).min(in_width - 1);
                self.data[[src_y, src_x, index[2]]]
            },
        );
        self.arena.track(resized, self.dtype)
    }

    pub fn to_float(&self) -> Tensor {
        self.arena.track(self.data.clone(), DType::Float32)
    }

    pub fn div(&self, divisor: f32) -> Tensor {
        self.arena
            .track(self.data.mapv(|value| value / divisor), self.dtype)
    }

    pub fn expand_dims(&self, axis: usize) -> Tensor {
        self.arena
            .track(self.data.clone().insert_axis(Axis(axis)), self.dtype)
    }

    pub fn dispose(self) {}
}

impl Drop for Tensor {
    fn drop(&mut self) {
        self.arena.live.fetch_sub(1, Ordering::SeqCst);
    }
}
