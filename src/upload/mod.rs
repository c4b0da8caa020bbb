//! Wire types and the trait seam for the external upload collaborator.
//!
//! Regions are normalized to `[0,1]` of the native media dimensions before
//! they leave the player, so the receiving side is resolution-independent.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Rect, Size};
use crate::region::{self, Region, ValidationError};

pub type UploadResult<T> = std::result::Result<T, UploadError>;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload rejected: {message}")]
    Rejected { message: String },

    #[error("upload transport failed: {message}")]
    Transport { message: String },

    #[error(transparent)]
    InvalidRegion(#[from] ValidationError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polygon_points: Option<Vec<[f64; 2]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_bounds: Option<Rect>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRequest {
    #[serde(rename = "mediaDataUrl")]
    pub media_data_url: String,
    #[serde(rename = "providerId")]
    pub provider_id: String,
    #[serde(rename = "uploadContext")]
    pub upload_context: UploadContext,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(rename = "providerSucceeded")]
    pub provider_succeeded: bool,
    #[serde(default)]
    pub data: UploadData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The upload endpoint itself lives outside the player; consumers inject an
/// implementation, tests inject a recording mock.
pub trait UploadSink: Send + Sync {
    fn submit(&self, request: &UploadRequest) -> UploadResult<UploadResponse>;
}

/// Builds the region part of an upload request, normalizing all coordinates
/// by the native media dimensions.
pub fn build_upload_context(region: &Region, media: Size) -> UploadResult<UploadContext> {
    if media.is_degenerate() {
        return Err(ValidationError::InvalidDimensions.into());
    }
    let bounds = region.bounds();
    let normalized_bounds = Rect::new(
        bounds.x / media.width,
        bounds.y / media.height,
        bounds.width / media.width,
        bounds.height / media.height,
    );
    let polygon_points = match region {
        Region::Polygon { points, .. } => {
            let points = region::coord_array_to_points(points);
            let normalized = region::normalize_polygon_points(&points, media)?;
            Some(region::points_to_coord_array(&normalized))
        }
        Region::Rect { .. } => None,
    };
    Ok(UploadContext {
        polygon_points,
        region_bounds: Some(normalized_bounds),
    })
}
