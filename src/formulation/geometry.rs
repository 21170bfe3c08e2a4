// Planar geometry used by the location families

/// A location in the plane
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance
    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

/// `matrix[i][j]` is the distance from `from[i]` to `to[j]`.
pub fn distance_matrix(from: &[Point], to: &[Point]) -> Vec<Vec<f64>> {
    from.iter()
        .map(|a| to.iter().map(|b| a.distance_to(b)).collect())
        .collect()
}
