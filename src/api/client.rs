//! reqwest implementation of [`LabApi`]

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::types::{
    CreatePatientRequest, CreatePatientResponse, EmailCheckResponse, ErrorBody,
    ForgotPasswordRequest, InterpretationResponse, LabSetPage, LabUpload, LoginRequest,
    LoginResponse, MessageResponse, Observation, ObservationsBody, PageRequest, Patient,
    PatientEnvelope, PatientPage, ResetPasswordRequest, UploadResponse,
};
use super::error::{CONNECT_MESSAGE, GENERIC_ERROR_MESSAGE, TIMEOUT_MESSAGE};
use super::{is_public_endpoint, ApiError, LabApi};
use crate::config::Config;
use crate::session::{SessionNotifier, TokenStore};

const CSRF_COOKIE: &str = "csrf_token";
const CSRF_HEADER: &str = "X-CSRF-Token";
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// User-facing message for a request that never got a response
fn transport_error(error: &reqwest::Error) -> ApiError {
    let message = if error.is_timeout() {
        TIMEOUT_MESSAGE
    } else if error.is_connect() {
        CONNECT_MESSAGE
    } else {
        GENERIC_ERROR_MESSAGE
    };
    ApiError::network(message)
}

pub struct ApiClient {
    client: reqwest::Client,
    base_url: reqwest::Url,
    jar: Arc<Jar>,
    tokens: Arc<TokenStore>,
    notifier: SessionNotifier,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        timeout: Option<Duration>,
        tokens: Arc<TokenStore>,
        notifier: SessionNotifier,
    ) -> Result<Self, ApiError> {
        let base_url = reqwest::Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ApiError::network(format!("Invalid API base URL '{base_url}': {e}")))?;
        let jar = Arc::new(Jar::default());
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("labsexplained/", env!("CARGO_PKG_VERSION")))
            .cookie_provider(Arc::clone(&jar));
        // No timeout unless configured: interpretation can take minutes
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            jar,
            tokens,
            notifier,
        })
    }

    pub fn from_config(
        config: &Config,
        tokens: Arc<TokenStore>,
        notifier: SessionNotifier,
    ) -> Result<Self, ApiError> {
        Self::new(
            &config.api.base_url,
            config.request_timeout(),
            tokens,
            notifier,
        )
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Current value of the `csrf_token` cookie set by the server
    fn csrf_token(&self) -> Option<String> {
        let header = self.jar.cookies(&self.base_url)?;
        let cookies = header.to_str().ok()?;
        cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == CSRF_COOKIE)
            .map(|(_, value)| value.to_string())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response, ApiError> {
        let mut request = self.client.request(method.clone(), self.url(path));

        if let Some(token) = self.tokens.bearer() {
            request = request.bearer_auth(token);
        }
        if method != Method::GET && method != Method::HEAD {
            if let Some(csrf) = self.csrf_token() {
                request = request.header(CSRF_HEADER, csrf);
            }
        }
        let request = build(request);

        debug!(%method, path, "API request");
        let response = request.send().await.map_err(|e| {
            warn!(%method, path, error = %e, "API request could not be sent");
            transport_error(&e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = response
            .text()
            .await
            .ok()
            .and_then(|body| serde_json::from_str::<ErrorBody>(&body).ok())
            .and_then(|body| body.detail_message());
        let error = ApiError::from_status(status.as_u16(), detail, is_public_endpoint(path));
        warn!(%method, path, status = status.as_u16(), "API request failed");

        if error.is_session_expired() {
            self.notifier.notify_expired(path);
        }
        Err(error)
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| ApiError::parse(e.to_string()))
    }
}

#[async_trait]
impl LabApi for ApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let body = LoginRequest { email, password };
        let response = self
            .send(Method::POST, "/auth/login", |r| r.json(&body))
            .await?;
        Self::json(response).await
    }

    async fn check_email(&self, email: &str) -> Result<bool, ApiError> {
        let response = self
            .send(Method::GET, "/auth/check-email", |r| {
                r.query(&[("email", email)])
            })
            .await?;
        let body: EmailCheckResponse = Self::json(response).await?;
        Ok(body.exists)
    }

    async fn forgot_password(&self, email: &str) -> Result<MessageResponse, ApiError> {
        let body = ForgotPasswordRequest { email };
        let response = self
            .send(Method::POST, "/auth/forgot-password", |r| r.json(&body))
            .await?;
        Self::json(response).await
    }

    async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<MessageResponse, ApiError> {
        let body = ResetPasswordRequest {
            token,
            new_password,
        };
        let response = self
            .send(Method::POST, "/auth/reset-password", |r| r.json(&body))
            .await?;
        Self::json(response).await
    }

    async fn list_patients(&self, page: PageRequest) -> Result<PatientPage, ApiError> {
        let response = self
            .send(Method::GET, "/api/patients", |r| r.query(&page))
            .await?;
        Self::json(response).await
    }

    async fn get_patient(&self, fhir_id: &str) -> Result<Patient, ApiError> {
        let path = format!("/api/patients/{fhir_id}");
        let response = self.send(Method::GET, &path, |r| r).await?;
        let envelope: PatientEnvelope = Self::json(response).await?;
        Ok(envelope.patient)
    }

    async fn create_patient(
        &self,
        request: &CreatePatientRequest,
        idempotency_key: Option<Uuid>,
    ) -> Result<CreatePatientResponse, ApiError> {
        let response = self
            .send(Method::POST, "/api/patients", |r| {
                let r = r.json(request);
                match idempotency_key {
                    Some(key) => r.header(IDEMPOTENCY_HEADER, key.to_string()),
                    None => r,
                }
            })
            .await?;
        Self::json(response).await
    }

    async fn delete_patient(&self, fhir_id: &str) -> Result<(), ApiError> {
        let path = format!("/api/patients/{fhir_id}");
        self.send(Method::DELETE, &path, |r| r).await?;
        Ok(())
    }

    async fn list_lab_sets(
        &self,
        fhir_id: &str,
        page: PageRequest,
    ) -> Result<LabSetPage, ApiError> {
        let path = format!("/api/patients/{fhir_id}/lab-tests");
        let response = self.send(Method::GET, &path, |r| r.query(&page)).await?;
        Self::json(response).await
    }

    async fn upload_lab_set(
        &self,
        fhir_id: &str,
        test_date: NaiveDate,
        file: LabUpload,
    ) -> Result<UploadResponse, ApiError> {
        let part = reqwest::multipart::Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.content_type)
            .map_err(|e| ApiError::parse(format!("Invalid file type: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("testDate", test_date.format("%Y-%m-%d").to_string());

        let path = format!("/api/patients/{fhir_id}/lab-tests");
        let response = self
            .send(Method::POST, &path, |r| r.multipart(form))
            .await?;
        Self::json(response).await
    }

    async fn delete_lab_set(&self, lab_set_id: &str) -> Result<(), ApiError> {
        let path = format!("/api/lab-tests/{lab_set_id}");
        self.send(Method::DELETE, &path, |r| r).await?;
        Ok(())
    }

    async fn interpret_lab_set(
        &self,
        lab_set_id: &str,
    ) -> Result<InterpretationResponse, ApiError> {
        let path = format!("/api/lab-tests/{lab_set_id}/interpret");
        let response = self.send(Method::POST, &path, |r| r).await?;
        Self::json(response).await
    }

    async fn observations(&self, observation_id: &str) -> Result<Vec<Observation>, ApiError> {
        let path = format!("/api/observations/{observation_id}");
        let response = self.send(Method::GET, &path, |r| r).await?;
        let body: ObservationsBody = Self::json(response).await?;
        Ok(body.into_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> ApiClient {
        ApiClient::new(
            base_url,
            Some(Duration::from_secs(5)),
            Arc::new(TokenStore::in_memory()),
            SessionNotifier::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let api = client("http://localhost:8000/");
        assert_eq!(api.url("/api/patients"), "http://localhost:8000/api/patients");
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let result = ApiClient::new(
            "not a url",
            None,
            Arc::new(TokenStore::in_memory()),
            SessionNotifier::new(),
        );
        assert!(matches!(result, Err(ApiError::Network { .. })));
    }

    #[test]
    fn test_csrf_token_read_from_cookie_jar() {
        let api = client("http://localhost:8000");
        assert!(api.csrf_token().is_none());

        let url = reqwest::Url::parse("http://localhost:8000").unwrap();
        api.jar.add_cookie_str("other=1; Path=/", &url);
        api.jar.add_cookie_str("csrf_token=abc123; Path=/", &url);
        assert_eq!(api.csrf_token().as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        // Port 9 (discard) on localhost is expected to refuse connections
        let api = client("http://127.0.0.1:9");
        let err = api.list_patients(PageRequest::first(10)).await.unwrap_err();
        assert!(matches!(err, ApiError::Network { .. }));
        assert_eq!(err.to_string(), CONNECT_MESSAGE);
    }
}
