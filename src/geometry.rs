//! Plane geometry kernel
//!
//! Points, line segments and edge paths (ordered runs of segments). Every
//! operation is total over finite input; NaN coordinates propagate as NaN.

use crate::types::Vec2;
use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};

/// Point in local plane coordinates, optionally carrying geographic coordinates
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            lat: None,
            lng: None,
        }
    }

    pub fn with_geo(x: f64, y: f64, lat: f64, lng: f64) -> Self {
        Self {
            x,
            y,
            lat: Some(lat),
            lng: Some(lng),
        }
    }

    pub fn distance_to(&self, other: &Point2D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn vec(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Linear interpolation; geographic coordinates only when both ends carry them
    pub fn lerp(&self, other: &Point2D, t: f64) -> Point2D {
        let geo = match (self.lat, self.lng, other.lat, other.lng) {
            (Some(la1), Some(ln1), Some(la2), Some(ln2)) => {
                Some((la1 + (la2 - la1) * t, ln1 + (ln2 - ln1) * t))
            }
            _ => None,
        };
        Point2D {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            lat: geo.map(|g| g.0),
            lng: geo.map(|g| g.1),
        }
    }
}

/// Directed segment with the walking orientation at each endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub start: Point2D,
    pub end: Point2D,
    /// Orientation (degrees) when walking start → end
    pub ori_start: f64,
    /// Orientation (degrees) when walking end → start
    pub ori_end: f64,
}

impl LineSegment {
    pub fn new(start: Point2D, end: Point2D, ori_start: f64, ori_end: f64) -> Self {
        Self {
            start,
            end,
            ori_start,
            ori_end,
        }
    }

    pub fn length(&self) -> f64 {
        self.start.distance_to(&self.end)
    }

    /// Projection parameter of `p`, clamped to [0, 1]
    ///
    /// Zero-length segments project everything onto their start.
    pub fn projection_ratio(&self, p: &Point2D) -> f64 {
        let d = self.end.vec() - self.start.vec();
        let len_sq = d.norm_squared();
        if len_sq == 0.0 {
            return 0.0;
        }
        let t = (p.vec() - self.start.vec()).dot(&d) / len_sq;
        if t.is_nan() {
            return t;
        }
        t.clamp(0.0, 1.0)
    }

    pub fn nearest_point(&self, p: &Point2D) -> Point2D {
        self.point_at_ratio(self.projection_ratio(p))
    }

    pub fn distance_to(&self, p: &Point2D) -> f64 {
        self.nearest_point(p).distance_to(p)
    }

    pub fn point_at_ratio(&self, ratio: f64) -> Point2D {
        self.start.lerp(&self.end, ratio)
    }
}

/// Free-function form of [`LineSegment::nearest_point`]
pub fn nearest_point_on_segment(segment: &LineSegment, p: &Point2D) -> Point2D {
    segment.nearest_point(p)
}

/// Free-function form of [`LineSegment::distance_to`]
pub fn distance_to_segment(segment: &LineSegment, p: &Point2D) -> f64 {
    segment.distance_to(p)
}

/// Total arc length of a run of segments
pub fn path_length(segments: &[LineSegment]) -> f64 {
    segments.iter().map(LineSegment::length).sum()
}

/// Point at `ratio` of the arc length of a run of segments (ratio clamped to [0, 1])
///
/// An empty path yields a NaN point.
pub fn point_at_ratio(segments: &[LineSegment], ratio: f64) -> Point2D {
    let Some(first) = segments.first() else {
        return Point2D::new(f64::NAN, f64::NAN);
    };
    let total = path_length(segments);
    if total == 0.0 {
        return first.start;
    }
    let mut remaining = ratio.clamp(0.0, 1.0) * total;
    for segment in segments {
        let len = segment.length();
        if remaining <= len {
            let t = if len > 0.0 { remaining / len } else { 0.0 };
            return segment.point_at_ratio(t);
        }
        remaining -= len;
    }
    segments[segments.len() - 1].end
}

/// Walking geometry of one edge, indexed by edge id
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgePath {
    pub edge_id: String,
    pub segments: Vec<LineSegment>,
    pub floor: i32,
}

impl EdgePath {
    pub fn new(edge_id: impl Into<String>, segments: Vec<LineSegment>, floor: i32) -> Self {
        Self {
            edge_id: edge_id.into(),
            segments,
            floor,
        }
    }

    /// Build a path through consecutive points with a constant orientation pair
    pub fn from_points(
        edge_id: impl Into<String>,
        points: &[Point2D],
        ori1: f64,
        ori2: f64,
        floor: i32,
    ) -> Self {
        let segments = points
            .windows(2)
            .map(|w| LineSegment::new(w[0], w[1], ori1, ori2))
            .collect();
        Self::new(edge_id, segments, floor)
    }

    pub fn length(&self) -> f64 {
        path_length(&self.segments)
    }

    pub fn point_at_ratio(&self, ratio: f64) -> Point2D {
        point_at_ratio(&self.segments, ratio)
    }

    /// Segment index and local ratio at arc length `arc` (clamped to the path)
    fn locate_arc(&self, arc: f64) -> Option<(usize, f64)> {
        let last = self.segments.len().checked_sub(1)?;
        let mut remaining = arc.max(0.0);
        for (i, segment) in self.segments.iter().enumerate() {
            let len = segment.length();
            if remaining <= len || i == last {
                let t = if len > 0.0 { (remaining / len).min(1.0) } else { 0.0 };
                return Some((i, t));
            }
            remaining -= len;
        }
        None
    }

    pub fn point_at_arc(&self, arc: f64) -> Point2D {
        match self.locate_arc(arc) {
            Some((i, t)) => self.segments[i].point_at_ratio(t),
            None => Point2D::new(f64::NAN, f64::NAN),
        }
    }

    /// Unit direction (start → end) of the segment at arc length `arc`
    pub fn direction_at_arc(&self, arc: f64) -> Vec2 {
        let Some((i, _)) = self.locate_arc(arc) else {
            return Vec2::zeros();
        };
        let segment = &self.segments[i];
        let d = segment.end.vec() - segment.start.vec();
        let norm = d.norm();
        if norm > 0.0 {
            d / norm
        } else {
            Vec2::zeros()
        }
    }

    /// Index of the segment closest to `p` (first one wins on ties)
    fn nearest_index(&self, p: &Point2D) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, segment) in self.segments.iter().enumerate() {
            let d = segment.distance_to(p);
            match best {
                Some((_, best_d)) if !(d < best_d) => {}
                _ => best = Some((i, d)),
            }
        }
        best.map(|(i, _)| i)
    }

    pub fn nearest_segment(&self, p: &Point2D) -> Option<&LineSegment> {
        self.nearest_index(p).map(|i| &self.segments[i])
    }

    pub fn nearest_point(&self, p: &Point2D) -> Option<Point2D> {
        self.nearest_segment(p).map(|s| s.nearest_point(p))
    }

    pub fn distance_to(&self, p: &Point2D) -> f64 {
        self.nearest_segment(p)
            .map(|s| s.distance_to(p))
            .unwrap_or(f64::INFINITY)
    }

    /// Arc length from the path start to the projection of `p`
    pub fn arc_position(&self, p: &Point2D) -> f64 {
        let Some(index) = self.nearest_index(p) else {
            return 0.0;
        };
        let before: f64 = self.segments[..index].iter().map(LineSegment::length).sum();
        let segment = &self.segments[index];
        before + segment.projection_ratio(p) * segment.length()
    }

    /// Arc-length ratio of the projection of `p` (0 at start, 1 at end)
    pub fn ratio_of(&self, p: &Point2D) -> f64 {
        let total = self.length();
        if total == 0.0 {
            return 0.0;
        }
        self.arc_position(p) / total
    }

    /// Distance walked along the path between the projections of two points
    pub fn distance_between(&self, from: &Point2D, to: &Point2D) -> f64 {
        (self.arc_position(to) - self.arc_position(from)).abs()
    }

    /// Polyline along the path between the projections of two points, in walking order
    pub fn path_between(&self, from: &Point2D, to: &Point2D) -> Vec<Point2D> {
        let (Some(from_i), Some(to_i)) = (self.nearest_index(from), self.nearest_index(to)) else {
            return Vec::new();
        };
        let start = self.segments[from_i].nearest_point(from);
        let end = self.segments[to_i].nearest_point(to);
        let mut points = vec![start];
        if from_i < to_i {
            points.extend(self.segments[from_i..to_i].iter().map(|s| s.end));
        } else if from_i > to_i {
            points.extend(self.segments[to_i + 1..=from_i].iter().rev().map(|s| s.start));
        }
        points.push(end);
        points
    }

    /// Sub-path between two arc positions, used for temporary edges
    pub fn slice(&self, edge_id: impl Into<String>, from_arc: f64, to_arc: f64) -> EdgePath {
        let total = self.length();
        let a = self.point_at_ratio(if total > 0.0 { from_arc / total } else { 0.0 });
        let b = self.point_at_ratio(if total > 0.0 { to_arc / total } else { 0.0 });
        let points = self.path_between(&a, &b);
        let (ori1, ori2) = self
            .segments
            .first()
            .map(|s| {
                if from_arc <= to_arc {
                    (s.ori_start, s.ori_end)
                } else {
                    (s.ori_end, s.ori_start)
                }
            })
            .unwrap_or((0.0, 0.0));
        EdgePath::from_points(edge_id, &points, ori1, ori2, self.floor)
    }

    /// Walking orientations (start → end, end → start) at the projection of `p`
    pub fn orientation_at(&self, p: &Point2D) -> (f64, f64) {
        self.nearest_segment(p)
            .map(|s| (s.ori_start, s.ori_end))
            .unwrap_or((0.0, 0.0))
    }

    pub fn to_line_string(&self) -> LineString<f64> {
        let mut coords: Vec<Coord<f64>> = Vec::with_capacity(self.segments.len() + 1);
        if let Some(first) = self.segments.first() {
            coords.push(Coord {
                x: first.start.x,
                y: first.start.y,
            });
        }
        coords.extend(self.segments.iter().map(|s| Coord { x: s.end.x, y: s.end.y }));
        LineString::new(coords)
    }
}
