use bytes::Bytes;

/// Screen position in device pixels, as produced by the controller's action space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Snaps the coordinate onto the device's integer pixel grid.
    ///
    /// Values round half away from zero and saturate at the `i32` range, so an
    /// absurd coordinate still yields a pixel instead of wrapping.
    pub fn to_pixel(&self) -> (i32, i32) {
        (snap(self.x), snap(self.y))
    }
}

fn snap(value: f64) -> i32 {
    // `as` saturates for out-of-range floats and maps NaN to 0.
    value.round() as i32
}

impl From<(f64, f64)> for Coordinate {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// One directive for the device: touch a point, or reset the device to a clean state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Touch(Coordinate),
    Reset,
}

impl Action {
    pub fn touch(x: f64, y: f64) -> Self {
        Action::Touch(Coordinate::new(x, y))
    }

    pub fn coordinate(&self) -> Option<Coordinate> {
        match self {
            Action::Touch(coordinate) => Some(*coordinate),
            Action::Reset => None,
        }
    }

    pub fn is_reset(&self) -> bool {
        matches!(self, Action::Reset)
    }

    /// Short label used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Touch(_) => "touch",
            Action::Reset => "reset",
        }
    }
}

/// A captured device screen, kept as the encoded image the driver returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    image: Bytes,
}

impl Observation {
    pub fn new(image: impl Into<Bytes>) -> Self {
        Self {
            image: image.into(),
        }
    }

    pub fn image(&self) -> &Bytes {
        &self.image
    }

    pub fn into_image(self) -> Bytes {
        self.image
    }

    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }
}
