/// A closed range `[min, max]` along a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f32,
    pub max: f32,
}

impl Interval {
    /// Create a new interval given min and max values.
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Returns true if the interval holds no marchable distance.
    ///
    /// The miss sentinel `(-1, -1)` is empty, as is anything with `min >= max`
    /// or a negative start.
    pub fn is_empty(&self) -> bool {
        !(self.min >= 0.0 && self.min < self.max)
    }

    /// Sentinel stored for rays that never hit the scene bounds.
    pub const MISS: Interval = Interval { min: -1.0, max: -1.0 };
}
