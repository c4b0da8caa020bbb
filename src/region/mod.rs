//! Region wire format: validation, normalization, and (de)serialization of
//! selections for transport to the upload collaborator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Point, Rect, Size};
use crate::selection::polygon;

pub type RegionResult<T> = std::result::Result<T, ValidationError>;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("polygon needs at least 3 points, got {count}")]
    TooFewPoints { count: usize },

    #[error("point {index} has a non-finite or negative coordinate")]
    InvalidCoordinate { index: usize },

    #[error("region dimensions must be positive and finite")]
    InvalidDimensions,

    #[error("malformed region payload: {message}")]
    Malformed { message: String },
}

/// Canonical transport form of a selection. Coordinates are content-space
/// pixels unless normalized with [`normalize_polygon_points`] first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Region {
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    Polygon {
        points: Vec<[f64; 2]>,
        bounds: Rect,
    },
}

impl Region {
    pub fn rect(rect: Rect) -> RegionResult<Region> {
        if !(rect.x.is_finite() && rect.y.is_finite()) || rect.x < 0.0 || rect.y < 0.0 {
            return Err(ValidationError::InvalidDimensions);
        }
        if !(rect.width.is_finite() && rect.height.is_finite())
            || rect.width <= 0.0
            || rect.height <= 0.0
        {
            return Err(ValidationError::InvalidDimensions);
        }
        Ok(Region::Rect {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        })
    }

    /// Builds an immutable polygon region with its bounding rect memoized at
    /// construction time.
    pub fn polygon(points: &[Point]) -> RegionResult<Region> {
        validate_polygon_points(points)?;
        let bounds = polygon::path_bounds(points).ok_or(ValidationError::TooFewPoints { count: 0 })?;
        Ok(Region::Polygon {
            points: points_to_coord_array(points),
            bounds,
        })
    }

    pub fn bounds(&self) -> Rect {
        match *self {
            Region::Rect {
                x,
                y,
                width,
                height,
            } => Rect::new(x, y, width, height),
            Region::Polygon { bounds, .. } => bounds,
        }
    }

    fn validate(&self) -> RegionResult<()> {
        match self {
            Region::Rect {
                x,
                y,
                width,
                height,
            } => {
                Region::rect(Rect::new(*x, *y, *width, *height))?;
                Ok(())
            }
            Region::Polygon { points, .. } => {
                let points = coord_array_to_points(points);
                validate_polygon_points(&points)
            }
        }
    }
}

/// Ok iff the path has at least three points and every coordinate is finite
/// and non-negative.
pub fn validate_polygon_points(points: &[Point]) -> RegionResult<()> {
    if points.len() < 3 {
        return Err(ValidationError::TooFewPoints {
            count: points.len(),
        });
    }
    for (index, point) in points.iter().enumerate() {
        if !point.is_finite() || point.x < 0.0 || point.y < 0.0 {
            return Err(ValidationError::InvalidCoordinate { index });
        }
    }
    Ok(())
}

/// Divides by the native media dimensions so the receiving side is
/// resolution-independent.
pub fn normalize_polygon_points(points: &[Point], dims: Size) -> RegionResult<Vec<Point>> {
    if dims.is_degenerate() {
        return Err(ValidationError::InvalidDimensions);
    }
    validate_polygon_points(points)?;
    Ok(points
        .iter()
        .map(|point| Point::new(point.x / dims.width, point.y / dims.height))
        .collect())
}

pub fn denormalize_polygon_points(points: &[Point], dims: Size) -> RegionResult<Vec<Point>> {
    if dims.is_degenerate() {
        return Err(ValidationError::InvalidDimensions);
    }
    validate_polygon_points(points)?;
    Ok(points
        .iter()
        .map(|point| Point::new(point.x * dims.width, point.y * dims.height))
        .collect())
}

/// Compact `[[x,y],…]` transport form.
pub fn points_to_coord_array(points: &[Point]) -> Vec<[f64; 2]> {
    points.iter().map(|point| [point.x, point.y]).collect()
}

pub fn coord_array_to_points(coords: &[[f64; 2]]) -> Vec<Point> {
    coords.iter().map(|[x, y]| Point::new(*x, *y)).collect()
}

pub fn serialize_region(region: &Region) -> RegionResult<String> {
    serde_json::to_string(region).map_err(|err| ValidationError::Malformed {
        message: err.to_string(),
    })
}

/// Parses and re-validates a region. Malformed or semantically invalid input
/// rejects with [`ValidationError`], never a generic error.
pub fn deserialize_region(json: &str) -> RegionResult<Region> {
    let region: Region = serde_json::from_str(json).map_err(|err| ValidationError::Malformed {
        message: err.to_string(),
    })?;
    region.validate()?;
    Ok(region)
}
