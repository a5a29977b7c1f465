use std::sync::RwLock;
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::models::enums::Phase;
use crate::models::{Draft, DraftId, FormSnapshot};

use super::{
    BackendError, CaseRecord, CaseRef, DraftKey, DraftRef, DraftUpdate, NewDraft,
    RegistryBackend,
};

/// Domain appended to bare usernames at login.
const LOCAL_LOGIN_DOMAIN: &str = "mear.local";

/// Registry client over HTTP with bearer-token auth.
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
    token: RwLock<Option<String>>,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Reply to `POST /auth/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub user: Option<serde_json::Value>,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| BackendError::Client(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            token: RwLock::new(None),
            timeout_secs,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, BackendError> {
        let backend = Self::new(&config.api_base_url, config.http_timeout_secs)?;
        backend.set_token(config.api_token.clone());
        Ok(backend)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_token(&self, token: Option<String>) {
        match self.token.write() {
            Ok(mut guard) => *guard = token,
            Err(_) => tracing::error!("Token lock poisoned, token not updated"),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|guard| guard.clone())
    }

    /// Authenticate and keep the returned token for later calls.
    /// Bare usernames are qualified with the local registry domain.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, BackendError> {
        let email = if username.contains('@') {
            username.to_string()
        } else {
            format!("{username}@{LOCAL_LOGIN_DOMAIN}")
        };

        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&LoginRequest {
                email: &email,
                password,
            })
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let parsed: LoginResponse = parse(check(response).await?).await?;
        self.set_token(Some(parsed.token.clone()));
        tracing::info!(email = %email, "Registry login succeeded");
        Ok(parsed)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn send_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_connect() {
            BackendError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            BackendError::Timeout(self.timeout_secs)
        } else {
            BackendError::Client(e.to_string())
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, BackendError> {
        self.authed(builder)
            .send()
            .await
            .map_err(|e| self.send_error(e))
    }
}

/// Map non-success statuses to errors.
async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(BackendError::Unauthorized);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::Http {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    response
        .json()
        .await
        .map_err(|e| BackendError::ResponseParsing(e.to_string()))
}

impl RegistryBackend for HttpBackend {
    async fn create_draft(&self, form: &FormSnapshot, phase: Phase) -> Result<DraftRef, BackendError> {
        let body = NewDraft {
            form,
            current_phase: phase,
        };
        let response = self.send(self.client.post(self.url("/api/draft")).json(&body)).await?;
        parse(check(response).await?).await
    }

    async fn update_draft(&self, update: &DraftUpdate) -> Result<DraftRef, BackendError> {
        let response = self.send(self.client.put(self.url("/api/draft")).json(update)).await?;
        parse(check(response).await?).await
    }

    async fn fetch_draft(&self, key: &DraftKey) -> Result<Option<Draft>, BackendError> {
        let response = self
            .send(self.client.get(self.url("/api/draft")).query(&[key.query()]))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        parse(check(response).await?).await.map(Some)
    }

    async fn delete_draft(&self, key: &DraftKey) -> Result<(), BackendError> {
        let response = self
            .send(self.client.delete(self.url("/api/draft")).query(&[key.query()]))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(key = %key, "Draft already absent on registry");
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }

    async fn list_drafts(&self) -> Result<Vec<Draft>, BackendError> {
        let response = self.send(self.client.get(self.url("/api/drafts"))).await?;
        parse(check(response).await?).await
    }

    async fn submit_case(&self, form: &FormSnapshot) -> Result<CaseRef, BackendError> {
        let response = self.send(self.client.post(self.url("/api/mear")).json(form)).await?;
        parse(check(response).await?).await
    }

    async fn fetch_case(&self, id: &DraftId) -> Result<Option<CaseRecord>, BackendError> {
        let response = self
            .send(self.client.get(self.url(&format!("/api/mear/{id}"))))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        parse(check(response).await?).await.map(Some)
    }

    async fn list_cases(&self, limit: usize) -> Result<Vec<CaseRecord>, BackendError> {
        let response = self
            .send(self.client.get(self.url("/api/mear")).query(&[("limit", limit)]))
            .await?;
        parse(check(response).await?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn spawn_registry(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn bearer(headers: &HeaderMap) -> Option<String> {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    fn registry() -> Router {
        Router::new()
            .route(
                "/auth/login",
                post(|Json(body): Json<Value>| async move {
                    if body["password"] == "secret" {
                        (AxumStatus::OK, Json(json!({"token": "tok-1", "user": {"email": body["email"]}})))
                    } else {
                        (AxumStatus::UNAUTHORIZED, Json(json!({"message": "Invalid credentials"})))
                    }
                }),
            )
            .route(
                "/api/draft",
                post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    assert_eq!(bearer(&headers).as_deref(), Some("Bearer tok-1"));
                    assert_eq!(body["currentPhase"], "demographics");
                    Json(json!({"id": 17}))
                })
                .put(|Json(body): Json<Value>| async move {
                    Json(json!({"id": body["draftId"], "hospitalNo": body["hospitalNo"]}))
                })
                .get(|Query(q): Query<HashMap<String, String>>| async move {
                    match q.get("draftId").map(String::as_str) {
                        Some("17") => Ok(Json(json!({
                            "id": 17,
                            "form": {"demographics": {"hospitalNo": "HN-17"}},
                            "currentPhase": "vitals",
                            "hospitalNo": "HN-17"
                        }))),
                        _ => Err(AxumStatus::NOT_FOUND),
                    }
                })
                .delete(|Query(q): Query<HashMap<String, String>>| async move {
                    if q.contains_key("hospitalNo") {
                        AxumStatus::NO_CONTENT
                    } else {
                        AxumStatus::INTERNAL_SERVER_ERROR
                    }
                }),
            )
            .route(
                "/api/mear",
                post(|Json(_body): Json<Value>| async { Json(json!({"id": "case-1"})) }).get(
                    |Query(q): Query<HashMap<String, String>>| async move {
                        assert_eq!(q.get("limit").map(String::as_str), Some("2"));
                        Json(json!([{"id": 1, "form": {}}, {"id": 2, "form": {}}]))
                    },
                ),
            )
            .route(
                "/api/mear/:id",
                get(|Path(id): Path<String>| async move {
                    if id == "1" {
                        Ok(Json(json!({"id": 1, "form": {}, "created_at": "2026-01-01T00:00:00Z"})))
                    } else {
                        Err(AxumStatus::NOT_FOUND)
                    }
                }),
            )
    }

    #[tokio::test]
    async fn login_stores_token_for_later_calls() {
        let base = spawn_registry(registry()).await;
        let backend = HttpBackend::new(&base, 5).unwrap();

        let login = backend.login("resident", "secret").await.unwrap();
        assert_eq!(login.token, "tok-1");
        assert_eq!(login.user.unwrap()["email"], "resident@mear.local");
        assert_eq!(backend.token().as_deref(), Some("tok-1"));

        let created = backend
            .create_draft(&FormSnapshot::default(), Phase::Demographics)
            .await
            .unwrap();
        assert_eq!(created.id.as_str(), "17");
    }

    #[tokio::test]
    async fn bad_credentials_are_unauthorized() {
        let base = spawn_registry(registry()).await;
        let backend = HttpBackend::new(&base, 5).unwrap();
        match backend.login("resident", "wrong").await {
            Err(BackendError::Unauthorized) => {}
            other => panic!("expected Unauthorized, got {other:?}"),
        }
        assert_eq!(backend.token(), None);
    }

    #[tokio::test]
    async fn fetch_draft_found_and_missing() {
        let base = spawn_registry(registry()).await;
        let backend = HttpBackend::new(&base, 5).unwrap();

        let draft = backend
            .fetch_draft(&DraftKey::Id(DraftId::new("17")))
            .await
            .unwrap()
            .expect("draft 17 exists");
        assert_eq!(draft.current_phase, Phase::Vitals);
        assert_eq!(draft.form.hospital_no(), Some("HN-17"));

        let missing = backend
            .fetch_draft(&DraftKey::Id(DraftId::new("99")))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn update_echoes_identifiers() {
        let base = spawn_registry(registry()).await;
        let backend = HttpBackend::new(&base, 5).unwrap();
        let update = DraftUpdate {
            form: FormSnapshot::default(),
            current_phase: Phase::Leon,
            hospital_no: Some("HN-5".into()),
            draft_id: Some(DraftId::new("5")),
        };
        let reply = backend.update_draft(&update).await.unwrap();
        assert_eq!(reply.id.as_str(), "5");
        assert_eq!(reply.hospital_no.as_deref(), Some("HN-5"));
    }

    #[tokio::test]
    async fn delete_reports_server_errors() {
        let base = spawn_registry(registry()).await;
        let backend = HttpBackend::new(&base, 5).unwrap();

        backend
            .delete_draft(&DraftKey::HospitalNo("HN-1".into()))
            .await
            .unwrap();

        match backend.delete_draft(&DraftKey::Id(DraftId::new("1"))).await {
            Err(BackendError::Http { status: 500, .. }) => {}
            other => panic!("expected HTTP 500, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cases_submit_fetch_and_list() {
        let base = spawn_registry(registry()).await;
        let backend = HttpBackend::new(&base, 5).unwrap();

        let submitted = backend.submit_case(&FormSnapshot::default()).await.unwrap();
        assert_eq!(submitted.id.as_str(), "case-1");

        let record = backend.fetch_case(&DraftId::new("1")).await.unwrap().unwrap();
        assert!(record.created_at.is_some());
        assert!(backend.fetch_case(&DraftId::new("2")).await.unwrap().is_none());

        let listed = backend.list_cases(2).await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn unreachable_registry_is_connection_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = HttpBackend::new(&format!("http://{addr}/"), 2).unwrap();
        assert_eq!(backend.base_url(), format!("http://{addr}"));
        match backend.list_cases(1).await {
            Err(BackendError::Connection(url)) => assert_eq!(url, format!("http://{addr}")),
            other => panic!("expected Connection error, got {other:?}"),
        }
    }
}
