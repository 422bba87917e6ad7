/// Default minimum crop area in pixels (25 × 25).
pub const DEFAULT_MIN_BOX_AREA: u64 = 625;

/// A detector box in pixel space, `(x1, y1)` top-left and `(x2, y2)`
/// bottom-right. Coordinates are unclamped and may lie outside the frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// An integer rectangle that lies entirely inside a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Why a box could not be turned into a crop rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClampError {
    /// A coordinate was NaN or infinite.
    NonFinite,
    /// Width or height collapsed to zero or below after clamping.
    Degenerate,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Truncates to integers and clamps every coordinate into
    /// `[0, width-1] × [0, height-1]`.
    ///
    /// The right/bottom edge is exclusive, so a box clamped against the
    /// frame edge loses its last pixel column/row.
    pub fn clamp_to(&self, width: u32, height: u32) -> Result<PixelRect, ClampError> {
        let coords = self.as_array();
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(ClampError::NonFinite);
        }

        let max_x = width as i64 - 1;
        let max_y = height as i64 - 1;
        let clamp = |v: f64, max: i64| (v as i64).min(max).max(0);

        let x1 = clamp(self.x1, max_x);
        let x2 = clamp(self.x2, max_x);
        let y1 = clamp(self.y1, max_y);
        let y2 = clamp(self.y2, max_y);

        if x2 <= x1 || y2 <= y1 {
            return Err(ClampError::Degenerate);
        }

        Ok(PixelRect {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    }
}
