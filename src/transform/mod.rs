//! Contain-fit mapping between container (screen) space and content space.
//!
//! The container can resize between pointer events, so callers recompute the
//! transform for every lookup instead of caching it.

use crate::geometry::{Point, Size};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainTransform {
    content: Size,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl ContainTransform {
    /// Centered, aspect-preserving fit of `content` inside `container`.
    /// Returns `None` when either size is degenerate; callers must guard.
    pub fn compute(container: Size, content: Size) -> Option<Self> {
        if container.is_degenerate() || content.is_degenerate() {
            return None;
        }
        let scale = (container.width / content.width).min(container.height / content.height);
        Some(Self {
            content,
            scale,
            offset_x: (container.width - content.width * scale) / 2.0,
            offset_y: (container.height - content.height * scale) / 2.0,
        })
    }

    /// Container-relative screen point to content space, clamped to the
    /// content dimensions so points in the letterbox land on the media edge.
    pub fn to_content(&self, screen: Point) -> Point {
        Point::new(
            ((screen.x - self.offset_x) / self.scale).clamp(0.0, self.content.width),
            ((screen.y - self.offset_y) / self.scale).clamp(0.0, self.content.height),
        )
    }

    /// Content point to container-relative screen space.
    pub fn to_screen(&self, content: Point) -> Point {
        Point::new(
            content.x * self.scale + self.offset_x,
            content.y * self.scale + self.offset_y,
        )
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn content_size(&self) -> Size {
        self.content
    }
}
