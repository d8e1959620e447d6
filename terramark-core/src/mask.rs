//! Mask, point and polygon primitives shared between the model seam and the
//! segmentation engine

use serde::{Deserialize, Serialize};

/// Ordered ring of `[x, y]` points approximating a region boundary
pub type Polygon = Vec<[f64; 2]>;

/// Exact pixel coordinate used as the point-mask cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: u32,
    pub y: u32,
}

impl PixelPoint {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Snap to a grid of the given step. Step 1 keeps the exact pixel.
    pub fn quantize(self, step: u32) -> Self {
        if step <= 1 {
            return self;
        }
        Self {
            x: (self.x / step) * step,
            y: (self.y / step) * step,
        }
    }
}

/// Binary segmentation mask, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl Mask {
    /// Create an all-background mask
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![false; (width as usize) * (height as usize)],
        }
    }

    /// Build a mask by evaluating a predicate per pixel
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut mask = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                if f(x, y) {
                    mask.set(x, y, true);
                }
            }
        }
        mask
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Foreground test; out-of-bounds coordinates read as background
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.data[(y as usize) * (self.width as usize) + (x as usize)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if x < self.width && y < self.height {
            self.data[(y as usize) * (self.width as usize) + (x as usize)] = value;
        }
    }

    /// Number of foreground pixels
    pub fn foreground_count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }
}

/// Raw model output candidate: per-pixel scores plus a confidence
#[derive(Debug, Clone)]
pub struct ScoredMask {
    pub width: u32,
    pub height: u32,
    pub scores: Vec<f32>,
    pub confidence: f32,
}

impl ScoredMask {
    /// Threshold into a binary mask. Non-finite scores count as background.
    pub fn binarize(&self, threshold: f32) -> Mask {
        let mut mask = Mask::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let idx = (y as usize) * (self.width as usize) + (x as usize);
                if let Some(&val) = self.scores.get(idx) {
                    if val > threshold && val.is_finite() {
                        mask.set(x, y, true);
                    }
                }
            }
        }
        mask
    }
}
