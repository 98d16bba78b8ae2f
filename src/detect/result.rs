use crate::frame::Rotation;

/// Axis-aligned box in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left: left.min(right),
            top: top.min(bottom),
            right: left.max(right),
            bottom: top.max(bottom),
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    pub fn is_finite(&self) -> bool {
        self.left.is_finite()
            && self.top.is_finite()
            && self.right.is_finite()
            && self.bottom.is_finite()
    }

    /// Clamp to a `width x height` frame.
    pub fn clamped(&self, width: f32, height: f32) -> Self {
        Self::new(
            self.left.clamp(0.0, width),
            self.top.clamp(0.0, height),
            self.right.clamp(0.0, width),
            self.bottom.clamp(0.0, height),
        )
    }

    /// Rotate a box from a `width x height` sensor image into the upright frame.
    pub fn rotated(&self, rotation: Rotation, width: f32, height: f32) -> Self {
        if rotation == Rotation::Deg0 {
            return *self;
        }
        let (uw, uh) = match rotation {
            Rotation::Deg90 | Rotation::Deg270 => (height, width),
            _ => (width, height),
        };
        let (ax, ay) = rotation.to_upright(self.left / width, self.top / height);
        let (bx, by) = rotation.to_upright(self.right / width, self.bottom / height);
        Self::new(ax * uw, ay * uh, bx * uw, by * uh)
    }
}

/// Horizontal bucket of an obstacle, by thirds of the upright frame width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Position {
    Left,
    Center,
    Right,
}

impl Position {
    pub fn from_center(center_x: f32, frame_width: f32) -> Self {
        if center_x < frame_width / 3.0 {
            Position::Left
        } else if center_x > 2.0 * frame_width / 3.0 {
            Position::Right
        } else {
            Position::Center
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Position::Left => "left",
            Position::Center => "center",
            Position::Right => "right",
        }
    }
}

/// Raw backend output, in sensor pixel coordinates.
#[derive(Clone, Debug)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Obstacle reported to the rest of the loop, in upright frame coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedObstacle {
    pub label: String,
    pub position: Position,
    /// Box area over frame area, 0..1. Coarse distance proxy.
    pub relative_size: f32,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl DetectedObstacle {
    /// Box centre normalized to the upright frame.
    pub fn normalized_center(&self, frame_width: f32, frame_height: f32) -> (f32, f32) {
        let (cx, cy) = self.bbox.center();
        (
            (cx / frame_width).clamp(0.0, 1.0),
            (cy / frame_height).clamp(0.0, 1.0),
        )
    }
}
