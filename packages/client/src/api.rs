//! REST collaborator client.

use async_trait::async_trait;
use reqwest::{
    Client, Response, StatusCode, Url,
    header::{COOKIE, HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    error::ApiError,
    model::{Comment, Minutes, Session, User},
};

/// Request/response operations of the meeting backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// `GET /api/user`; `None` when nobody is logged in
    async fn current_user(&self) -> Result<Option<User>, ApiError>;

    async fn create_session(&self, name: &str) -> Result<Session, ApiError>;

    async fn list_sessions(&self) -> Result<Vec<Session>, ApiError>;

    async fn delete_session(&self, session_id: &str) -> Result<(), ApiError>;

    async fn list_comments(&self, session_id: &str) -> Result<Vec<Comment>, ApiError>;

    async fn post_comment(&self, session_id: &str, content: &str, stars: u8)
    -> Result<(), ApiError>;

    async fn submit_summary(&self, session_id: &str, summary: &str) -> Result<(), ApiError>;

    async fn get_minutes(&self, session_id: &str) -> Result<Minutes, ApiError>;

    async fn save_minutes(&self, session_id: &str, content: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct PostCommentRequest<'a> {
    content: &'a str,
    stars: u8,
}

#[derive(Debug, Serialize)]
struct SubmitSummaryRequest<'a> {
    summary: &'a str,
}

#[derive(Debug, Serialize)]
struct SaveMinutesRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct UserEnvelope {
    #[serde(default)]
    user: Option<User>,
}

/// Map a non-success status to an [`ApiError`].
fn status_error(status: StatusCode, url: &Url, body: String) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized,
        StatusCode::NOT_FOUND => ApiError::NotFound(url.path().to_string()),
        _ => ApiError::Status {
            status: status.as_u16(),
            message: body,
        },
    }
}

/// [`SessionApi`] over HTTP with the opaque session cookie.
#[derive(Debug, Clone)]
pub struct HttpSessionApi {
    client: Client,
    base_url: Url,
}

impl HttpSessionApi {
    /// Create a client for `base_url`.
    ///
    /// Cookies set by the backend are kept for the lifetime of the client;
    /// `session_cookie` pre-seeds one obtained from a browser login.
    pub fn new(base_url: Url, session_cookie: Option<&str>) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = session_cookie {
            let value = HeaderValue::from_str(cookie).map_err(|_| ApiError::InvalidCookie)?;
            headers.insert(COOKIE, value);
        }

        let client = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Absolute URL for the given path segments below the base address.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        tracing::warn!("{} {} failed: {}", status, url.path(), body);
        Err(status_error(status, &url, body))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let url = self.endpoint(segments);
        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        Self::decode(Self::check(response).await?).await
    }

    async fn post<B: Serialize + Sync>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<Response, ApiError> {
        let url = self.endpoint(segments);
        tracing::debug!("POST {}", url);
        let response = self.client.post(url).json(body).send().await?;
        Self::check(response).await
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn current_user(&self) -> Result<Option<User>, ApiError> {
        match self.get::<UserEnvelope>(&["api", "user"]).await {
            Ok(envelope) => Ok(envelope.user),
            Err(ApiError::Unauthorized) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_session(&self, name: &str) -> Result<Session, ApiError> {
        let response = self
            .post(&["api", "sessions"], &CreateSessionRequest { name })
            .await?;
        Self::decode(response).await
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, ApiError> {
        let sessions: Option<Vec<Session>> = self.get(&["api", "sessions"]).await?;
        Ok(sessions.unwrap_or_default())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "sessions", session_id]);
        tracing::debug!("DELETE {}", url);
        let response = self.client.delete(url).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_comments(&self, session_id: &str) -> Result<Vec<Comment>, ApiError> {
        // The backend answers `null` for a session without comments.
        let comments: Option<Vec<Comment>> =
            self.get(&["api", "sessions", session_id, "comments"]).await?;
        Ok(comments.unwrap_or_default())
    }

    async fn post_comment(
        &self,
        session_id: &str,
        content: &str,
        stars: u8,
    ) -> Result<(), ApiError> {
        self.post(
            &["api", "sessions", session_id, "comments"],
            &PostCommentRequest { content, stars },
        )
        .await?;
        Ok(())
    }

    async fn submit_summary(&self, session_id: &str, summary: &str) -> Result<(), ApiError> {
        self.post(
            &["api", "sessions", session_id, "summaries"],
            &SubmitSummaryRequest { summary },
        )
        .await?;
        Ok(())
    }

    async fn get_minutes(&self, session_id: &str) -> Result<Minutes, ApiError> {
        let minutes: Option<Minutes> = self.get(&["api", "sessions", session_id, "minutes"]).await?;
        Ok(minutes.unwrap_or_default())
    }

    async fn save_minutes(&self, session_id: &str, content: &str) -> Result<(), ApiError> {
        self.post(
            &["api", "sessions", session_id, "minutes"],
            &SaveMinutesRequest { content },
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpSessionApi {
        HttpSessionApi::new(Url::parse(base).unwrap(), None).unwrap()
    }

    #[test]
    fn test_endpoint_below_root() {
        // テスト項目: ルートのベースアドレスに API パスが連結される
        // given (前提条件):
        let api = api("http://localhost:8080");

        // when (操作):
        let url = api.endpoint(&["api", "sessions", "s1", "comments"]);

        // then (期待する結果):
        assert_eq!(url.as_str(), "http://localhost:8080/api/sessions/s1/comments");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        // テスト項目: ベースアドレスのパスが保持される
        // given (前提条件):
        let api = api("https://example.com/meeting/");

        // when (操作):
        let url = api.endpoint(&["api", "user"]);

        // then (期待する結果):
        assert_eq!(url.as_str(), "https://example.com/meeting/api/user");
    }

    #[test]
    fn test_status_error_maps_auth_failures() {
        // テスト項目: 401 と 403 は認証エラーに変換される
        // given (前提条件):
        let url = Url::parse("http://localhost/api/user").unwrap();

        // when (操作):
        let unauthorized = status_error(StatusCode::UNAUTHORIZED, &url, String::new());
        let forbidden = status_error(StatusCode::FORBIDDEN, &url, String::new());

        // then (期待する結果):
        assert!(matches!(unauthorized, ApiError::Unauthorized));
        assert!(matches!(forbidden, ApiError::Unauthorized));
    }

    #[test]
    fn test_status_error_keeps_body_for_server_errors() {
        // テスト項目: その他のステータスはコードと本文を保持する
        // given (前提条件):
        let url = Url::parse("http://localhost/api/sessions").unwrap();

        // when (操作):
        let error = status_error(StatusCode::BAD_GATEWAY, &url, "upstream down".to_string());

        // then (期待する結果):
        match error {
            ApiError::Status { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_cookie_is_rejected() {
        // テスト項目: ヘッダーに使えない Cookie 値は拒否される
        // given (前提条件):
        let base = Url::parse("http://localhost:8080").unwrap();

        // when (操作):
        let result = HttpSessionApi::new(base, Some("session=abc\nevil"));

        // then (期待する結果):
        assert!(matches!(result, Err(ApiError::InvalidCookie)));
    }
}
