//! Rect-or-polygon selection state and the gestures that edit it.

pub mod machine;
pub mod polygon;

pub use machine::{
    AddPointOutcome, GestureError, GestureResult, PolygonGesture, PolygonPhase, RectGesture,
    RectHandle, RectPhase,
};
pub use polygon::EdgeHit;

use crate::config::AppConfig;
use crate::geometry::{Point, Rect};
use crate::region::Region;

/// Knobs for gesture behavior, sourced from `AppConfig` in the wired app and
/// from defaults in tests.
#[derive(Debug, Clone, Copy)]
pub struct SelectionTuning {
    pub vertex_threshold_ratio: f64,
    pub simplify_tolerance: f64,
    pub max_freehand_points: usize,
}

impl Default for SelectionTuning {
    fn default() -> Self {
        Self {
            vertex_threshold_ratio: polygon::VERTEX_THRESHOLD_RATIO,
            simplify_tolerance: 2.0,
            max_freehand_points: polygon::MAX_FREEHAND_POINTS,
        }
    }
}

impl From<&AppConfig> for SelectionTuning {
    fn from(config: &AppConfig) -> Self {
        Self {
            vertex_threshold_ratio: config.vertex_threshold_ratio,
            simplify_tolerance: config.simplify_tolerance,
            max_freehand_points: config.max_freehand_points,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    Rect,
    Polygon,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionShape {
    Rect(Rect),
    Polygon(Vec<Point>),
}

const MAX_BLUR_AMOUNT: u8 = 100;

/// The player's selection state: at most one shape kind is active at a time,
/// but the inactive kind's last value is retained hidden, so switching back
/// restores it. Clearing destroys both.
#[derive(Debug, Clone, Default)]
pub struct SelectionModel {
    active: Option<SelectionKind>,
    rect: Option<Rect>,
    polygon: Option<Vec<Point>>,
    polygon_bounds: Option<Rect>,
    blur_amount: u8,
}

impl SelectionModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_kind(&self) -> Option<SelectionKind> {
        self.active
    }

    /// Stores a finished rect selection and makes the rect kind active.
    pub fn set_rect(&mut self, rect: Rect) {
        self.rect = Some(rect);
        self.active = Some(SelectionKind::Rect);
    }

    /// Stores a finished polygon selection and makes the polygon kind active.
    /// Fewer than three points are ignored.
    pub fn set_polygon(&mut self, points: Vec<Point>) {
        if points.len() < 3 {
            tracing::warn!(count = points.len(), "ignoring degenerate polygon selection");
            return;
        }
        self.polygon_bounds = polygon::path_bounds(&points);
        self.polygon = Some(points);
        self.active = Some(SelectionKind::Polygon);
    }

    /// Switches which kind is shown without discarding the other kind's value.
    pub fn switch_active(&mut self, kind: SelectionKind) {
        self.active = Some(kind);
    }

    /// Hides the selection overlay while retaining both stored shapes.
    pub fn deactivate(&mut self) {
        self.active = None;
    }

    /// Destroys all selection state, as on `clearRegion` or a new media load.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn active_shape(&self) -> Option<SelectionShape> {
        match self.active? {
            SelectionKind::Rect => self.rect.map(SelectionShape::Rect),
            SelectionKind::Polygon => self.polygon.clone().map(SelectionShape::Polygon),
        }
    }

    /// Bounding rect of the active shape; memoized for polygons.
    pub fn bounding_rect(&self) -> Option<Rect> {
        match self.active? {
            SelectionKind::Rect => self.rect,
            SelectionKind::Polygon => self.polygon_bounds,
        }
    }

    pub fn blur_amount(&self) -> u8 {
        self.blur_amount
    }

    pub fn set_blur_amount(&mut self, amount: u8) {
        self.blur_amount = amount.min(MAX_BLUR_AMOUNT);
    }

    /// The active shape as a transport region, if one is present and valid.
    pub fn to_region(&self) -> Option<Region> {
        let region = match self.active_shape()? {
            SelectionShape::Rect(rect) => Region::rect(rect),
            SelectionShape::Polygon(points) => Region::polygon(&points),
        };
        match region {
            Ok(region) => Some(region),
            Err(err) => {
                tracing::warn!(%err, "selection cannot be serialized as a region");
                None
            }
        }
    }
}
