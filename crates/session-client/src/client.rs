use async_trait::async_trait;
use interview_core::{
    AnswerSubmission, Feedback, FeedbackGenerator, InterviewSessionStore, SessionSnapshot,
    StoreError,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;

pub mod config;
mod consts;

pub use config::{Config, ConfigBuilder};

#[derive(serde::Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// Talks to the platform's interview REST API. One instance is shared by
/// every live session.
pub struct HttpSessionStore {
    http: reqwest::Client,
    base_url: Url,
    config: Config,
}

impl HttpSessionStore {
    pub fn new(config: Config) -> Result<Self, StoreError> {
        let base_url = Url::parse(config.base_url())
            .map_err(|e| StoreError::Transport(format!("invalid base URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Transport(format!(
                "invalid base URL: {}",
                config.base_url()
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // The session id always lands in a single percent-encoded path segment.
    fn url(&self, session_id: &str, action: Option<&str>) -> Result<Url, StoreError> {
        if session_id.is_empty() || session_id == "." || session_id == ".." {
            return Err(StoreError::NotFound(session_id.to_string()));
        }
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::Transport("base URL cannot hold a path".to_string()))?;
            segments
                .pop_if_empty()
                .push(consts::INTERVIEWS_PATH)
                .push(session_id);
            if let Some(action) = action {
                segments.push(action);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.http.request(method, url);
        match self.config.api_token() {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        session_id: &str,
        request: RequestBuilder,
    ) -> Result<T, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let response = Self::check_status(session_id, response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn check_status(session_id: &str, response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(session_id.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message.or(b.error))
            .unwrap_or(body);
        tracing::warn!(
            "Interview API answered {} for session {}: {}",
            status,
            session_id,
            message
        );
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl InterviewSessionStore for HttpSessionStore {
    async fn get_session(&self, session_id: &str) -> Result<SessionSnapshot, StoreError> {
        let url = self.url(session_id, None)?;
        tracing::debug!("GET {}", url);
        self.send(session_id, self.request(Method::GET, url)).await
    }

    async fn start_session(&self, session_id: &str) -> Result<SessionSnapshot, StoreError> {
        let url = self.url(session_id, Some("start"))?;
        tracing::debug!("POST {}", url);
        self.send(session_id, self.request(Method::POST, url)).await
    }

    async fn submit_answer(
        &self,
        session_id: &str,
        submission: &AnswerSubmission,
    ) -> Result<SessionSnapshot, StoreError> {
        let url = self.url(session_id, Some("answers"))?;
        tracing::debug!("POST {} ({} s)", url, submission.time_spent_secs);
        let request = self.request(Method::POST, url).json(submission);
        self.send(session_id, request).await
    }

    async fn end_session(&self, session_id: &str) -> Result<SessionSnapshot, StoreError> {
        let url = self.url(session_id, Some("end"))?;
        tracing::debug!("POST {}", url);
        self.send(session_id, self.request(Method::POST, url)).await
    }
}

#[async_trait]
impl FeedbackGenerator for HttpSessionStore {
    async fn generate_feedback(&self, session_id: &str) -> Result<Feedback, StoreError> {
        let url = self.url(session_id, Some("feedback"))?;
        tracing::debug!("POST {}", url);
        self.send(session_id, self.request(Method::POST, url)).await
    }
}
