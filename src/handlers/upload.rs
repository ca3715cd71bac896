use axum::{Json, extract::State};

use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiError, ApiResult},
    models::{PresignedUrlRequest, PresignedUrlResponse},
    storage::{UPLOAD_URL_TTL, upload_key},
    validation::ValidatedJson,
};

/// presigned_url
///
/// Issues a short-lived PUT URL so the client uploads straight to object storage. The URL
/// is pinned to the declared content type, which must be on the configured allow-list.
#[utoipa::path(
    post,
    path = "/api/v1/upload",
    request_body = PresignedUrlRequest,
    responses(
        (status = 200, description = "Presigned URL", body = PresignedUrlResponse),
        (status = 400, description = "File type not allowed"),
        (status = 500, description = "Storage unavailable")
    ),
    security(("bearer_auth" = []))
)]
pub async fn presigned_url(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PresignedUrlRequest>,
) -> ApiResult<Json<PresignedUrlResponse>> {
    let file_type = req.file_type.trim().to_ascii_lowercase();
    if !state
        .config
        .allowed_file_types
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&file_type))
    {
        return Err(ApiError::bad_request(
            "INVALID_FILE_TYPE",
            format!("File type '{file_type}' is not allowed"),
        ));
    }

    let key = upload_key(&req.filename);
    let upload_url = state
        .storage
        .get_presigned_upload_url(&key, &file_type)
        .await?;

    tracing::info!(user_id = %user_id, key = %key, "upload url issued");
    Ok(Json(PresignedUrlResponse {
        upload_url,
        resource_key: key,
        expires_in: UPLOAD_URL_TTL.as_secs(),
    }))
}
