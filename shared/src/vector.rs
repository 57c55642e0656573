use serde::{Deserialize, Serialize};

/// Represents a vector in 2D world space.
///
/// Positive x is to the right; positive y is down, matching the
/// coordinate system the wire protocol uses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Vec2D {
    pub x: f64,
    pub y: f64,
}

impl Vec2D {
    pub fn new(x: f64, y: f64) -> Self {
        Vec2D { x, y }
    }

    /// Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Returns the normalized vector, or the zero vector if the
    /// magnitude is zero.
    pub fn normalize(&self) -> Vec2D {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vec2D::default()
        } else {
            Vec2D {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    /// Returns the scaled vector.
    pub fn scale(&self, scalar: f64) -> Vec2D {
        Vec2D {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    /// Returns the sum of two vectors.
    pub fn add(&self, other: &Vec2D) -> Vec2D {
        Vec2D {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    /// Returns the difference of two vectors.
    pub fn sub(&self, other: &Vec2D) -> Vec2D {
        Vec2D {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    /// Returns the dot product of two vectors.
    pub fn dot(&self, other: &Vec2D) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Returns true if both components are exactly zero.
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}
