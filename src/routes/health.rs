use axum::response::IntoResponse;
use serde::Serialize;

use crate::utils::success_to_api_response;

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub timestamp: i64,
}

pub async fn ping() -> impl IntoResponse {
    success_to_api_response(PingResponse {
        status: "ok",
        timestamp: chrono::Utc::now().timestamp(),
    })
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    use crate::test_support::{MockProvider, body_json, test_app};

    #[tokio::test]
    async fn ping_answers_inside_the_envelope() {
        let app = test_app(MockProvider::signing_in("student@nits.ac.in"));
        let response = app
            .router
            .oneshot(Request::builder().uri("/api/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["code"], 0);
        assert_eq!(body["resp_data"]["status"], "ok");
    }
}
