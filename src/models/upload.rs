use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    error::FieldError,
    validation::{Validate, Validator},
};

/// PresignedUrlRequest
///
/// Client-side metadata for a direct-to-storage upload.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PresignedUrlRequest {
    pub filename: String,
    // MIME type, checked against the configured allow-list.
    pub file_type: String,
}

impl Validate for PresignedUrlRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new()
            .required("filename", &self.filename)
            .max_length("filename", Some(&self.filename), 255)
            .required("fileType", &self.file_type)
            .finish()
    }
}

/// PresignedUrlResponse
///
/// The signed PUT URL plus the object key the client stores once the upload completes.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PresignedUrlResponse {
    pub upload_url: String,
    pub resource_key: String,
    /// Seconds until the URL stops working.
    pub expires_in: u64,
}
