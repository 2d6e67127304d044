use std::io::Cursor;

use image::io::Reader as ImageReader;
use rand::Rng;
use tidepool_core::{Coordinate, Observation};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameDimensions {
    pub width: u32,
    pub height: u32,
}

impl FrameDimensions {
    /// Reads the dimensions from the image header without decoding pixels.
    pub fn of(observation: &Observation) -> image::ImageResult<Self> {
        let (width, height) = ImageReader::new(Cursor::new(observation.image().as_ref()))
            .with_guessed_format()?
            .into_dimensions()?;
        Ok(Self { width, height })
    }
}

/// Continuous touch space `[0, width) x [0, height)` in screen pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActionSpace {
    dimensions: FrameDimensions,
}

impl ActionSpace {
    pub fn new(dimensions: FrameDimensions) -> Self {
        Self { dimensions }
    }

    pub fn dimensions(&self) -> FrameDimensions {
        self.dimensions
    }

    pub fn contains(&self, coordinate: Coordinate) -> bool {
        coordinate.is_finite()
            && (0.0..f64::from(self.dimensions.width)).contains(&coordinate.x)
            && (0.0..f64::from(self.dimensions.height)).contains(&coordinate.y)
    }

    /// Uniform sample. Panics on an empty (zero-sized) space.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Coordinate {
        Coordinate::new(
            rng.gen_range(0.0..f64::from(self.dimensions.width)),
            rng.gen_range(0.0..f64::from(self.dimensions.height)),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.width == 0 || self.dimensions.height == 0
    }
}
