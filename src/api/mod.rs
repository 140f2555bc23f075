use crate::config::EnvConfig;
use crate::models::{DocumentData, DocumentEnvelope, UpdateDocumentRequest};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiErrorKind {
    Unauthorized,
    Network,
    Http,
    Parse,
    /// The store answered but flagged the request as unsuccessful.
    Rejected,
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn network(e: reqwest::Error) -> Self {
        Self::new(ApiErrorKind::Network, e.to_string())
    }

    fn parse(e: impl std::fmt::Display) -> Self {
        Self::new(ApiErrorKind::Parse, e.to_string())
    }

    fn unauthorized() -> Self {
        Self::new(ApiErrorKind::Unauthorized, "Unauthorized")
    }

    fn http(status: reqwest::StatusCode, body: String, ctx: &str) -> Self {
        Self::new(ApiErrorKind::Http, format!("{ctx} ({status}): {body}"))
    }

    fn rejected(message: &str) -> Self {
        let message = if message.trim().is_empty() {
            "Request rejected by server"
        } else {
            message
        };
        Self::new(ApiErrorKind::Rejected, message)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Remote document store as seen by an editing session.
///
/// Writes are whole-document replacements; the store is not aware of local
/// section ids.
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    async fn fetch_document(&self, document_id: &str) -> ApiResult<DocumentData>;

    async fn update_document(
        &self,
        document_id: &str,
        req: &UpdateDocumentRequest,
    ) -> ApiResult<()>;
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    pub(crate) base_url: String,
    pub(crate) token: Option<String>,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_env(env: &EnvConfig) -> Self {
        Self::new(env.api_url.clone())
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub(crate) fn get_auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {t}"))
    }

    pub(crate) fn document_url(&self, document_id: &str) -> String {
        format!(
            "{}/documents/{}",
            self.base_url,
            urlencoding::encode(document_id)
        )
    }

    fn with_auth_headers(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(header) = self.get_auth_header() {
            req = req.header("Authorization", header);
        }
        req
    }

    async fn send(&self, req: reqwest::RequestBuilder, ctx: &str) -> ApiResult<reqwest::Response> {
        let res = self
            .with_auth_headers(req)
            .send()
            .await
            .map_err(ApiError::network)?;

        if res.status().is_success() {
            Ok(res)
        } else if res.status().as_u16() == 401 {
            Err(ApiError::unauthorized())
        } else {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            Err(ApiError::http(status, body, ctx))
        }
    }

    pub async fn get_document(&self, document_id: &str) -> ApiResult<DocumentData> {
        let res = self
            .send(
                self.http.get(self.document_url(document_id)),
                "Failed to fetch document",
            )
            .await?;
        let envelope: DocumentEnvelope = res.json().await.map_err(ApiError::parse)?;
        Self::unwrap_document_envelope(envelope)
    }

    pub async fn update_document(
        &self,
        document_id: &str,
        req: &UpdateDocumentRequest,
    ) -> ApiResult<()> {
        let res = self
            .send(
                self.http.put(self.document_url(document_id)).json(req),
                "Failed to update document",
            )
            .await?;

        // The acknowledgement body is informational; only an explicit
        // `success: false` counts as a failed write.
        let ack: serde_json::Value = res.json().await.unwrap_or(serde_json::Value::Null);
        Self::check_ack(&ack)
    }

    pub(crate) fn unwrap_document_envelope(envelope: DocumentEnvelope) -> ApiResult<DocumentData> {
        if !envelope.success {
            return Err(ApiError::rejected(&envelope.message));
        }
        envelope
            .data
            .ok_or_else(|| ApiError::parse("Document response is missing data"))
    }

    pub(crate) fn check_ack(ack: &serde_json::Value) -> ApiResult<()> {
        match ack.get("success").and_then(|v| v.as_bool()) {
            Some(false) => {
                let message = ack.get("message").and_then(|v| v.as_str()).unwrap_or("");
                Err(ApiError::rejected(message))
            }
            _ => Ok(()),
        }
    }
}

impl DocumentStore for ApiClient {
    async fn fetch_document(&self, document_id: &str) -> ApiResult<DocumentData> {
        self.get_document(document_id).await
    }

    async fn update_document(
        &self,
        document_id: &str,
        req: &UpdateDocumentRequest,
    ) -> ApiResult<()> {
        ApiClient::update_document(self, document_id, req).await
    }
}
