use crate::region::ValidationError;
use crate::sandbox::SandboxError;
use crate::selection::GestureError;
use crate::transcode::ConversionError;
use crate::upload::UploadError;
use thiserror::Error;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Gesture(#[from] GestureError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}
