use axum::{
    extract::{Extension, Multipart, State},
    response::IntoResponse,
};
use serde::Serialize;

use crate::{
    AppState,
    error::{AppError, AppResult},
    middleware::CurrentUser,
    storage::{image_extension, object_path},
    utils::success_to_api_response,
};

/// Images accepted per request, matching the per-listing limit.
pub const MAX_FILES: usize = 5;
const FIELD_NAME: &str = "image";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub urls: Vec<String>,
}

struct ImageFile {
    bytes: Vec<u8>,
    content_type: String,
    extension: String,
}

/// Accepts one part if it is a non-empty image within `max_bytes`; returns its extension.
fn check_image(
    content_type: &str,
    file_name: Option<&str>,
    len: usize,
    max_bytes: usize,
) -> Result<String, String> {
    let extension = image_extension(content_type, file_name)
        .ok_or_else(|| "Only image files can be uploaded".to_string())?;
    if len == 0 {
        return Err("Empty files cannot be uploaded".into());
    }
    if len > max_bytes {
        return Err(format!(
            "Each image must be at most {} KiB",
            max_bytes / 1024
        ));
    }
    Ok(extension)
}

fn invalid_upload(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(format!("Invalid upload: {e}"))
}

pub async fn upload_images(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let max_bytes = state.config.max_upload_bytes;
    let mut files = Vec::new();

    // every part is checked before anything reaches storage
    while let Some(field) = multipart.next_field().await.map_err(invalid_upload)? {
        if field.name() != Some(FIELD_NAME) {
            continue;
        }
        if files.len() == MAX_FILES {
            return Err(AppError::Validation(format!(
                "At most {MAX_FILES} images can be uploaded at once"
            )));
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(invalid_upload)?;
        let extension = check_image(&content_type, file_name.as_deref(), bytes.len(), max_bytes)
            .map_err(AppError::Validation)?;

        files.push(ImageFile {
            bytes: bytes.to_vec(),
            content_type,
            extension,
        });
    }

    if files.is_empty() {
        return Err(AppError::Validation("No images were uploaded".into()));
    }

    let millis = chrono::Utc::now().timestamp_millis();
    let mut urls = Vec::with_capacity(files.len());
    for (index, file) in files.into_iter().enumerate() {
        let path = object_path(user.id, millis, index, &file.extension);
        let url = state
            .storage
            .upload(&path, file.bytes, &file.content_type, &user.access_token)
            .await?;
        urls.push(url);
    }

    tracing::info!("User {} uploaded {} image(s)", user.id, urls.len());
    Ok(success_to_api_response(UploadResponse { urls }))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use tower::ServiceExt;

    use crate::auth::SESSION_COOKIE;
    use crate::cache::CachedSession;
    use crate::test_support::{MockProvider, body_json, session_for, test_app};

    use super::*;

    const BOUNDARY: &str = "marketplace-test-boundary";

    fn multipart_request(parts: &[(&str, &str, &str, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, file_name, content_type, bytes) in parts {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; \
                     filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/uploads")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::COOKIE, format!("{SESSION_COOKIE}=sid"))
            .body(Body::from(body))
            .unwrap()
    }

    #[test]
    fn images_within_limit_are_accepted() {
        assert_eq!(check_image("image/png", Some("a.png"), 10, 1024).as_deref(), Ok("png"));
        assert!(check_image("text/plain", Some("a.png"), 10, 1024).is_err());
        assert!(check_image("image/png", Some("a.png"), 0, 1024).is_err());
        assert!(check_image("image/png", Some("a.png"), 1025, 1024).is_err());
    }

    #[tokio::test]
    async fn non_image_parts_are_rejected_before_upload() {
        let app = test_app(MockProvider::signing_in("student@nits.ac.in"));
        app.sessions.insert_session(CachedSession::from_provider(
            "sid".into(),
            session_for("student@nits.ac.in"),
        ));

        let response = app
            .router
            .oneshot(multipart_request(&[(
                "image",
                "notes.pdf",
                "application/pdf",
                &b"%PDF-1.7"[..],
            )]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["msg"], "Only image files can be uploaded");
    }

    #[tokio::test]
    async fn oversized_images_are_rejected() {
        let app = test_app(MockProvider::signing_in("student@nits.ac.in"));
        app.sessions.insert_session(CachedSession::from_provider(
            "sid".into(),
            session_for("student@nits.ac.in"),
        ));
        let big = vec![0u8; app.config.max_upload_bytes + 1];

        let response = app
            .router
            .oneshot(multipart_request(&[("image", "big.png", "image/png", big.as_slice())]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn request_without_images_is_rejected() {
        let app = test_app(MockProvider::signing_in("student@nits.ac.in"));
        app.sessions.insert_session(CachedSession::from_provider(
            "sid".into(),
            session_for("student@nits.ac.in"),
        ));

        let response = app
            .router
            .oneshot(multipart_request(&[("avatar", "a.png", "image/png", &b"png"[..])]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
