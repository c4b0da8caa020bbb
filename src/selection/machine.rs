//! Gesture state machines for polygon and rect selections.
//!
//! Drag gestures snapshot the pre-drag geometry once at gesture start and
//! recompute from that immutable snapshot on every pointer move; deltas are
//! never integrated against live state.

use thiserror::Error;

use super::polygon;
use super::SelectionTuning;
use crate::geometry::{Point, Rect, Size};

pub type GestureResult<T> = std::result::Result<T, GestureError>;

#[derive(Debug, Error)]
pub enum GestureError {
    #[error("invalid gesture transition: {event} while {phase}")]
    InvalidTransition { phase: &'static str, event: &'static str },

    #[error("no vertex {index} in a {count}-point polygon")]
    UnknownVertex { index: usize, count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonPhase {
    Idle,
    Drawing,
    Finished,
    DraggingVertex,
    DraggingPolygon,
}

impl PolygonPhase {
    const fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Drawing => "Drawing",
            Self::Finished => "Finished",
            Self::DraggingVertex => "DraggingVertex",
            Self::DraggingPolygon => "DraggingPolygon",
        }
    }
}

/// Outcome of feeding a pointer press to a drawing polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddPointOutcome {
    Appended,
    Closed,
}

#[derive(Debug, Clone)]
struct DragContext {
    kind: DragKind,
    origin: Point,
    snapshot: Vec<Point>,
}

#[derive(Debug, Clone, Copy)]
enum DragKind {
    Vertex(usize),
    Whole,
}

#[derive(Debug, Clone)]
pub struct PolygonGesture {
    media: Size,
    tuning: SelectionTuning,
    phase: PolygonPhase,
    points: Vec<Point>,
    bounds: Option<Rect>,
    drag: Option<DragContext>,
}

impl PolygonGesture {
    pub fn new(media: Size, tuning: SelectionTuning) -> Self {
        Self {
            media,
            tuning,
            phase: PolygonPhase::Idle,
            points: Vec::new(),
            bounds: None,
            drag: None,
        }
    }

    pub fn phase(&self) -> PolygonPhase {
        self.phase
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn bounds(&self) -> Option<Rect> {
        self.bounds
    }

    pub fn pick_threshold(&self) -> f64 {
        polygon::vertex_threshold_with(self.media, self.tuning.vertex_threshold_ratio)
    }

    /// Vertex under the pointer, if any, using the uniform pick radius.
    pub fn vertex_at(&self, pointer: Point) -> Option<usize> {
        polygon::find_nearest_vertex(pointer, &self.points, self.pick_threshold())
    }

    /// Edge under the pointer, if any, with the would-be insertion point.
    pub fn edge_at(&self, pointer: Point) -> Option<polygon::EdgeHit> {
        polygon::find_nearest_edge(pointer, &self.points, self.pick_threshold())
    }

    pub fn start(&mut self) -> GestureResult<()> {
        match self.phase {
            PolygonPhase::Idle | PolygonPhase::Finished => {
                tracing::debug!(from = self.phase.name(), "polygon draw started");
                self.points.clear();
                self.bounds = None;
                self.drag = None;
                self.phase = PolygonPhase::Drawing;
                Ok(())
            }
            _ => Err(self.invalid("start")),
        }
    }

    /// Appends a point, or closes the polygon when the press lands within the
    /// pick radius of the first point and at least three points exist.
    pub fn add_point(&mut self, point: Point) -> GestureResult<AddPointOutcome> {
        if self.phase != PolygonPhase::Drawing {
            return Err(self.invalid("add_point"));
        }
        if self.points.len() >= 3 {
            let first = self.points[0];
            if point.distance_to(first) <= self.pick_threshold() {
                self.finish();
                return Ok(AddPointOutcome::Closed);
            }
        }
        self.points.push(point);
        Ok(AddPointOutcome::Appended)
    }

    pub fn double_click(&mut self) -> GestureResult<()> {
        if self.phase != PolygonPhase::Drawing || self.points.len() < 3 {
            return Err(self.invalid("double_click"));
        }
        self.finish();
        Ok(())
    }

    pub fn escape(&mut self) -> GestureResult<()> {
        if self.phase != PolygonPhase::Drawing {
            return Err(self.invalid("escape"));
        }
        tracing::debug!(discarded = self.points.len(), "polygon draw discarded");
        self.points.clear();
        self.bounds = None;
        self.phase = PolygonPhase::Idle;
        Ok(())
    }

    pub fn begin_vertex_drag(&mut self, index: usize) -> GestureResult<()> {
        if self.phase != PolygonPhase::Finished {
            return Err(self.invalid("begin_vertex_drag"));
        }
        if index >= self.points.len() {
            return Err(GestureError::UnknownVertex {
                index,
                count: self.points.len(),
            });
        }
        self.drag = Some(DragContext {
            kind: DragKind::Vertex(index),
            origin: self.points[index],
            snapshot: self.points.clone(),
        });
        self.phase = PolygonPhase::DraggingVertex;
        Ok(())
    }

    pub fn begin_polygon_drag(&mut self, origin: Point) -> GestureResult<()> {
        if self.phase != PolygonPhase::Finished {
            return Err(self.invalid("begin_polygon_drag"));
        }
        self.drag = Some(DragContext {
            kind: DragKind::Whole,
            origin,
            snapshot: self.points.clone(),
        });
        self.phase = PolygonPhase::DraggingPolygon;
        Ok(())
    }

    /// Recomputes the live points from the drag snapshot for the current
    /// pointer position.
    pub fn drag_to(&mut self, pointer: Point) -> GestureResult<()> {
        let Some(drag) = self.drag.as_ref() else {
            return Err(self.invalid("drag_to"));
        };
        let bounds = self.media.as_rect();
        self.points = match drag.kind {
            DragKind::Vertex(index) => polygon::move_vertex(&drag.snapshot, index, pointer, bounds),
            DragKind::Whole => {
                let delta = Point::new(pointer.x - drag.origin.x, pointer.y - drag.origin.y);
                polygon::move_polygon(&drag.snapshot, delta, bounds)
            }
        };
        Ok(())
    }

    pub fn release(&mut self) -> GestureResult<()> {
        match self.phase {
            PolygonPhase::DraggingVertex | PolygonPhase::DraggingPolygon => {
                self.drag = None;
                self.bounds = polygon::path_bounds(&self.points);
                self.phase = PolygonPhase::Finished;
                Ok(())
            }
            _ => Err(self.invalid("release")),
        }
    }

    /// Splits an edge of a finished polygon at the projected point.
    pub fn insert_vertex(&mut self, hit: polygon::EdgeHit) -> GestureResult<()> {
        if self.phase != PolygonPhase::Finished {
            return Err(self.invalid("insert_vertex"));
        }
        self.points = polygon::insert_vertex_on_edge(&self.points, hit.edge, hit.projected);
        self.bounds = polygon::path_bounds(&self.points);
        Ok(())
    }

    /// Removes a vertex of a finished polygon; silently keeps the minimum of
    /// three vertices.
    pub fn remove_vertex(&mut self, index: usize) -> GestureResult<()> {
        if self.phase != PolygonPhase::Finished {
            return Err(self.invalid("remove_vertex"));
        }
        self.points = polygon::remove_vertex(&self.points, index);
        self.bounds = polygon::path_bounds(&self.points);
        Ok(())
    }

    fn finish(&mut self) {
        if self.points.len() > self.tuning.max_freehand_points {
            let simplified =
                polygon::simplify_path(&self.points, self.tuning.simplify_tolerance);
            // A path this aggressive to simplify still has to stay a polygon.
            if simplified.len() >= 3 {
                tracing::debug!(
                    before = self.points.len(),
                    after = simplified.len(),
                    "freehand path simplified"
                );
                self.points = simplified;
            }
        }
        self.bounds = polygon::path_bounds(&self.points);
        self.phase = PolygonPhase::Finished;
    }

    fn invalid(&self, event: &'static str) -> GestureError {
        tracing::warn!(phase = self.phase.name(), event, "invalid polygon gesture");
        GestureError::InvalidTransition {
            phase: self.phase.name(),
            event,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectPhase {
    Idle,
    Drawing,
    Finished,
    Dragging,
    Resizing,
}

impl RectPhase {
    const fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Drawing => "Drawing",
            Self::Finished => "Finished",
            Self::Dragging => "Dragging",
            Self::Resizing => "Resizing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectHandle {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl RectHandle {
    fn opposite_corner(self, rect: Rect) -> Point {
        match self {
            Self::TopLeft => Point::new(rect.right(), rect.bottom()),
            Self::TopRight => Point::new(rect.x, rect.bottom()),
            Self::BottomLeft => Point::new(rect.right(), rect.y),
            Self::BottomRight => Point::new(rect.x, rect.y),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RectGesture {
    media: Size,
    phase: RectPhase,
    anchor: Point,
    rect: Option<Rect>,
    snapshot: Option<Rect>,
    handle: Option<RectHandle>,
}

impl RectGesture {
    pub fn new(media: Size) -> Self {
        Self {
            media,
            phase: RectPhase::Idle,
            anchor: Point::new(0.0, 0.0),
            rect: None,
            snapshot: None,
            handle: None,
        }
    }

    pub fn phase(&self) -> RectPhase {
        self.phase
    }

    pub fn rect(&self) -> Option<Rect> {
        self.rect
    }

    pub fn start(&mut self, pointer: Point) -> GestureResult<()> {
        match self.phase {
            RectPhase::Idle | RectPhase::Finished => {
                self.anchor = pointer.clamp_to(self.media.as_rect());
                self.rect = Some(Rect::from_corners(self.anchor, self.anchor));
                self.snapshot = None;
                self.handle = None;
                self.phase = RectPhase::Drawing;
                Ok(())
            }
            _ => Err(self.invalid("start")),
        }
    }

    pub fn begin_move(&mut self, pointer: Point) -> GestureResult<()> {
        if self.phase != RectPhase::Finished {
            return Err(self.invalid("begin_move"));
        }
        self.anchor = pointer;
        self.snapshot = self.rect;
        self.phase = RectPhase::Dragging;
        Ok(())
    }

    pub fn begin_resize(&mut self, handle: RectHandle) -> GestureResult<()> {
        if self.phase != RectPhase::Finished {
            return Err(self.invalid("begin_resize"));
        }
        self.snapshot = self.rect;
        self.handle = Some(handle);
        self.phase = RectPhase::Resizing;
        Ok(())
    }

    pub fn drag_to(&mut self, pointer: Point) -> GestureResult<()> {
        let bounded = pointer.clamp_to(self.media.as_rect());
        match self.phase {
            RectPhase::Drawing => {
                self.rect = Some(Rect::from_corners(self.anchor, bounded));
                Ok(())
            }
            RectPhase::Dragging => {
                let snapshot = self.snapshot.unwrap_or_else(|| Rect::new(0.0, 0.0, 0.0, 0.0));
                let dx = pointer.x - self.anchor.x;
                let dy = pointer.y - self.anchor.y;
                self.rect = Some(snapshot.translate_within(dx, dy, self.media.as_rect()));
                Ok(())
            }
            RectPhase::Resizing => {
                let (Some(snapshot), Some(handle)) = (self.snapshot, self.handle) else {
                    return Err(self.invalid("drag_to"));
                };
                self.rect = Some(Rect::from_corners(handle.opposite_corner(snapshot), bounded));
                Ok(())
            }
            _ => Err(self.invalid("drag_to")),
        }
    }

    pub fn release(&mut self) -> GestureResult<()> {
        match self.phase {
            RectPhase::Drawing => {
                if self.rect.is_some_and(|rect| !rect.is_empty()) {
                    self.phase = RectPhase::Finished;
                } else {
                    tracing::debug!("zero-area rect draw discarded");
                    self.rect = None;
                    self.phase = RectPhase::Idle;
                }
                Ok(())
            }
            RectPhase::Dragging | RectPhase::Resizing => {
                if self.rect.is_none_or(Rect::is_empty) {
                    self.rect = self.snapshot;
                }
                self.snapshot = None;
                self.handle = None;
                self.phase = RectPhase::Finished;
                Ok(())
            }
            _ => Err(self.invalid("release")),
        }
    }

    pub fn escape(&mut self) -> GestureResult<()> {
        if self.phase != RectPhase::Drawing {
            return Err(self.invalid("escape"));
        }
        self.rect = None;
        self.phase = RectPhase::Idle;
        Ok(())
    }

    fn invalid(&self, event: &'static str) -> GestureError {
        tracing::warn!(phase = self.phase.name(), event, "invalid rect gesture");
        GestureError::InvalidTransition {
            phase: self.phase.name(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEDIA: Size = Size::new(1000.0, 500.0);

    fn drawing_gesture(points: &[(f64, f64)]) -> PolygonGesture {
        let mut gesture = PolygonGesture::new(MEDIA, SelectionTuning::default());
        gesture.start().expect("start from idle");
        for &(x, y) in points {
            gesture
                .add_point(Point::new(x, y))
                .expect("point should append");
        }
        gesture
    }

    fn finished_square() -> PolygonGesture {
        let mut gesture =
            drawing_gesture(&[(100.0, 100.0), (300.0, 100.0), (300.0, 300.0), (100.0, 300.0)]);
        gesture.double_click().expect("double click should finish");
        gesture
    }

    #[test]
    fn polygon_draw_closes_near_first_point_with_three_or_more_points() {
        let mut gesture = drawing_gesture(&[(100.0, 100.0), (300.0, 100.0), (200.0, 300.0)]);
        // Pick radius for 1000x500 media is 10.0 content pixels.
        let outcome = gesture
            .add_point(Point::new(104.0, 103.0))
            .expect("close press should be accepted");
        assert_eq!(outcome, AddPointOutcome::Closed);
        assert_eq!(gesture.phase(), PolygonPhase::Finished);
        assert_eq!(gesture.points().len(), 3);
        assert!(gesture.bounds().is_some());
    }

    #[test]
    fn polygon_draw_near_first_point_with_two_points_just_appends() {
        let mut gesture = drawing_gesture(&[(100.0, 100.0), (300.0, 100.0)]);
        let outcome = gesture
            .add_point(Point::new(104.0, 103.0))
            .expect("press should append");
        assert_eq!(outcome, AddPointOutcome::Appended);
        assert_eq!(gesture.phase(), PolygonPhase::Drawing);
    }

    #[test]
    fn polygon_double_click_requires_three_points() {
        let mut gesture = drawing_gesture(&[(100.0, 100.0), (300.0, 100.0)]);
        assert!(matches!(
            gesture.double_click(),
            Err(GestureError::InvalidTransition { .. })
        ));
        gesture
            .add_point(Point::new(200.0, 300.0))
            .expect("third point");
        gesture.double_click().expect("three points should finish");
        assert_eq!(gesture.phase(), PolygonPhase::Finished);
    }

    #[test]
    fn polygon_finish_simplifies_long_freehand_paths() {
        let mut gesture = PolygonGesture::new(MEDIA, SelectionTuning::default());
        gesture.start().expect("start");
        // An L-shaped freehand trace: 40 samples along the top, 40 down the
        // right side.
        for i in 0..80 {
            let point = if i < 40 {
                Point::new(f64::from(i) * 5.0, 100.0)
            } else {
                Point::new(200.0, 100.0 + f64::from(i - 40) * 5.0)
            };
            gesture.add_point(point).expect("freehand point");
        }
        gesture.double_click().expect("finish");
        assert!(gesture.points().len() >= 3);
        assert!(gesture.points().len() < 80);
        assert_eq!(gesture.points().first(), Some(&Point::new(0.0, 100.0)));
        assert_eq!(gesture.points().last(), Some(&Point::new(200.0, 295.0)));
    }

    #[test]
    fn polygon_escape_discards_draw_and_restart_clears_points() {
        let mut gesture = drawing_gesture(&[(100.0, 100.0), (300.0, 100.0)]);
        gesture.escape().expect("escape while drawing");
        assert_eq!(gesture.phase(), PolygonPhase::Idle);
        assert!(gesture.points().is_empty());

        gesture.start().expect("restart");
        assert!(gesture.points().is_empty());
    }

    #[test]
    fn polygon_vertex_drag_recomputes_from_snapshot_every_move() {
        let mut gesture = finished_square();
        gesture.begin_vertex_drag(0).expect("drag vertex 0");
        gesture.drag_to(Point::new(150.0, 150.0)).expect("move");
        gesture.drag_to(Point::new(120.0, 110.0)).expect("move");
        // The second move replaces the first rather than accumulating on it.
        assert_eq!(gesture.points()[0], Point::new(120.0, 110.0));
        assert_eq!(gesture.points()[1], Point::new(300.0, 100.0));
        gesture.release().expect("release");
        assert_eq!(gesture.phase(), PolygonPhase::Finished);
    }

    #[test]
    fn polygon_vertex_drag_clamps_to_media() {
        let mut gesture = finished_square();
        gesture.begin_vertex_drag(0).expect("drag vertex 0");
        gesture.drag_to(Point::new(-50.0, -50.0)).expect("move");
        assert_eq!(gesture.points()[0], Point::new(0.0, 0.0));
    }

    #[test]
    fn polygon_whole_drag_translates_relative_to_origin() {
        let mut gesture = finished_square();
        gesture
            .begin_polygon_drag(Point::new(200.0, 200.0))
            .expect("begin drag");
        gesture.drag_to(Point::new(250.0, 220.0)).expect("move");
        assert_eq!(gesture.points()[0], Point::new(150.0, 120.0));
        gesture.drag_to(Point::new(210.0, 200.0)).expect("move");
        assert_eq!(gesture.points()[0], Point::new(110.0, 100.0));
        gesture.release().expect("release");
        assert_eq!(gesture.bounds(), Some(Rect::new(110.0, 100.0, 200.0, 200.0)));
    }

    #[test]
    fn polygon_drag_requires_finished_state() {
        let mut gesture = drawing_gesture(&[(100.0, 100.0), (300.0, 100.0)]);
        assert!(matches!(
            gesture.begin_vertex_drag(0),
            Err(GestureError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn polygon_unknown_vertex_is_reported_without_changing_phase() {
        let mut gesture = finished_square();
        assert!(matches!(
            gesture.begin_vertex_drag(9),
            Err(GestureError::UnknownVertex { index: 9, count: 4 })
        ));
        assert_eq!(gesture.phase(), PolygonPhase::Finished);
    }

    #[test]
    fn polygon_insert_and_remove_vertex_update_bounds() {
        let mut gesture = finished_square();
        let hit = gesture
            .edge_at(Point::new(200.0, 101.0))
            .expect("top edge within pick radius");
        gesture.insert_vertex(hit).expect("insert");
        assert_eq!(gesture.points().len(), 5);

        gesture.remove_vertex(hit.edge + 1).expect("remove");
        assert_eq!(gesture.points().len(), 4);
        assert_eq!(gesture.bounds(), Some(Rect::new(100.0, 100.0, 200.0, 200.0)));
    }

    #[test]
    fn rect_draw_finishes_with_normalized_rect() {
        let mut gesture = RectGesture::new(MEDIA);
        gesture.start(Point::new(300.0, 200.0)).expect("start");
        gesture.drag_to(Point::new(100.0, 400.0)).expect("drag");
        gesture.release().expect("release");
        assert_eq!(gesture.phase(), RectPhase::Finished);
        assert_eq!(gesture.rect(), Some(Rect::new(100.0, 200.0, 200.0, 200.0)));
    }

    #[test]
    fn rect_zero_area_draw_returns_to_idle() {
        let mut gesture = RectGesture::new(MEDIA);
        gesture.start(Point::new(300.0, 200.0)).expect("start");
        gesture.release().expect("release");
        assert_eq!(gesture.phase(), RectPhase::Idle);
        assert_eq!(gesture.rect(), None);
    }

    #[test]
    fn rect_move_recomputes_from_snapshot_and_stays_inside_media() {
        let mut gesture = RectGesture::new(MEDIA);
        gesture.start(Point::new(800.0, 50.0)).expect("start");
        gesture.drag_to(Point::new(950.0, 150.0)).expect("drag");
        gesture.release().expect("release");

        gesture.begin_move(Point::new(850.0, 100.0)).expect("move");
        gesture.drag_to(Point::new(980.0, 100.0)).expect("drag");
        // Blocked on the x axis at the media edge, y unchanged.
        assert_eq!(gesture.rect(), Some(Rect::new(850.0, 50.0, 150.0, 100.0)));
        gesture.drag_to(Point::new(860.0, 120.0)).expect("drag");
        assert_eq!(gesture.rect(), Some(Rect::new(810.0, 70.0, 150.0, 100.0)));
        gesture.release().expect("release");
    }

    #[test]
    fn rect_resize_anchors_opposite_corner() {
        let mut gesture = RectGesture::new(MEDIA);
        gesture.start(Point::new(100.0, 100.0)).expect("start");
        gesture.drag_to(Point::new(300.0, 200.0)).expect("drag");
        gesture.release().expect("release");

        gesture
            .begin_resize(RectHandle::TopLeft)
            .expect("resize from top-left");
        gesture.drag_to(Point::new(50.0, 80.0)).expect("drag");
        assert_eq!(gesture.rect(), Some(Rect::new(50.0, 80.0, 250.0, 120.0)));
        gesture.release().expect("release");
        assert_eq!(gesture.phase(), RectPhase::Finished);
    }

    #[test]
    fn rect_resize_collapsed_to_zero_restores_snapshot_on_release() {
        let mut gesture = RectGesture::new(MEDIA);
        gesture.start(Point::new(100.0, 100.0)).expect("start");
        gesture.drag_to(Point::new(300.0, 200.0)).expect("drag");
        gesture.release().expect("release");

        gesture
            .begin_resize(RectHandle::BottomRight)
            .expect("resize");
        gesture.drag_to(Point::new(100.0, 150.0)).expect("drag");
        gesture.release().expect("release");
        assert_eq!(gesture.rect(), Some(Rect::new(100.0, 100.0, 200.0, 100.0)));
    }
}
