//! HTTP backend for a hosted BaaS speaking the common REST dialect:
//! identity under `/auth/v1`, tables under `/rest/v1`, objects under
//! `/storage/v1`.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use pubtrack_auth::Session;
use pubtrack_core::{Clock, SubjectId, SystemClock};
use pubtrack_events::{AuthChange, AuthChangeKind, ListenerHandle, Listeners};

use crate::error::{BackendError, BackendResult};
use crate::provider::{AuthChangeCallback, AuthProvider, UserUpdate};
use crate::storage::ObjectStorage;
use crate::store::{DataStore, Query, Row};

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const RETURN_REPRESENTATION: &str = "return=representation";
const MERGE_DUPLICATES: &str = "resolution=merge-duplicates,return=representation";

#[derive(Debug, Clone)]
struct StoredTokens {
    session: Session,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: SubjectId,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_confirmed_at: Option<DateTime<Utc>>,
}

pub struct RestBackend {
    http: reqwest::Client,
    base: Url,
    anon_key: String,
    clock: Arc<dyn Clock>,
    tokens: RwLock<Option<StoredTokens>>,
    listeners: Listeners<AuthChange>,
}

impl RestBackend {
    pub fn new(base: Url, anon_key: impl Into<String>) -> BackendResult<Self> {
        if base.cannot_be_a_base() {
            return Err(BackendError::Config(format!("{base} cannot be used as a base URL")));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            anon_key: anon_key.into(),
            clock: Arc::new(SystemClock),
            tokens: RwLock::new(None),
            listeners: Listeners::new(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Adopt a session persisted by an earlier run. Does not emit a change.
    pub fn restore_session(&self, session: Session, refresh_token: Option<String>) {
        if let Ok(mut tokens) = self.tokens.write() {
            *tokens = Some(StoredTokens { session, refresh_token });
        }
    }

    /// Exchange the refresh token for a new session.
    ///
    /// A failed refresh leaves the current session in place and emits nothing.
    pub async fn refresh_session(&self) -> BackendResult<Session> {
        let refresh_token = self
            .stored()
            .and_then(|t| t.refresh_token)
            .ok_or(BackendError::Unauthorized)?;

        let mut url = self.endpoint(&["auth", "v1", "token"])?;
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");

        let resp = self
            .send(
                self.request(Method::POST, url)
                    .json(&json!({ "refresh_token": refresh_token })),
            )
            .await?;
        let token: TokenResponse = decode_json(resp).await?;
        let (session, refresh_token) = session_from_token(token, self.clock.now());

        self.store(Some(StoredTokens {
            session: session.clone(),
            refresh_token,
        }));
        self.listeners.notify(&AuthChange::new(
            AuthChangeKind::TokenRefreshed,
            Some(session.clone()),
        ));
        Ok(session)
    }

    fn stored(&self) -> Option<StoredTokens> {
        self.tokens.read().ok().and_then(|t| t.clone())
    }

    fn store(&self, tokens: Option<StoredTokens>) {
        if let Ok(mut slot) = self.tokens.write() {
            *slot = tokens;
        }
    }

    fn endpoint(&self, segments: &[&str]) -> BackendResult<Url> {
        build_endpoint(&self.base, segments)
    }

    fn bearer(&self) -> String {
        self.stored()
            .map(|t| t.session.access_token)
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        tracing::debug!(%method, path = url.path(), "backend request");
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
    }

    async fn send(&self, request: RequestBuilder) -> BackendResult<Response> {
        let resp = request
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(map_status(status.as_u16(), &body))
    }

    fn table_url(&self, table: &str, query: &Query) -> BackendResult<Url> {
        let mut url = self.endpoint(&["rest", "v1", table])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", "*");
            for (column, filter) in query.to_query_pairs() {
                pairs.append_pair(&column, &filter);
            }
        }
        Ok(url)
    }
}

impl core::fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RestBackend")
            .field("base", &self.base.as_str())
            .field("signed_in", &self.stored().is_some())
            .finish_non_exhaustive()
    }
}

fn build_endpoint(base: &Url, segments: &[&str]) -> BackendResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| BackendError::Config(format!("{base} cannot be used as a base URL")))?
        .pop_if_empty()
        .extend(segments.iter().flat_map(|s| s.split('/')));
    Ok(url)
}

/// Translate an HTTP failure into the backend error model.
fn map_status(status: u16, body: &str) -> BackendError {
    let message = error_message(body);
    match status {
        400 if message.contains("invalid_grant") || message.contains("Invalid login credentials") => {
            BackendError::InvalidCredentials
        }
        401 | 403 => BackendError::Unauthorized,
        404 | 406 => BackendError::NotFound,
        409 => BackendError::Conflict(message),
        _ => BackendError::api(status, message),
    }
}

fn error_message(body: &str) -> String {
    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    let mut parts: Vec<&str> = ["error", "error_description", "msg", "message"]
        .iter()
        .filter_map(|key| fields.get(*key).and_then(Value::as_str))
        .collect();
    parts.dedup();
    if parts.is_empty() {
        body.to_string()
    } else {
        parts.join(": ")
    }
}

fn session_from_token(token: TokenResponse, now: DateTime<Utc>) -> (Session, Option<String>) {
    let expires_at = token
        .expires_at
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .or_else(|| token.expires_in.map(|secs| now + Duration::seconds(secs)));

    let session = Session {
        subject: token.user.id,
        email: token.user.email,
        email_verified: token.user.email_confirmed_at.is_some(),
        access_token: token.access_token,
        expires_at,
    };
    (session, token.refresh_token)
}

async fn decode_json<T: serde::de::DeserializeOwned>(resp: Response) -> BackendResult<T> {
    let body = resp
        .bytes()
        .await
        .map_err(|e| BackendError::Network(e.to_string()))?;
    Ok(serde_json::from_slice(&body)?)
}

fn first_row(rows: Vec<Row>) -> BackendResult<Row> {
    rows.into_iter()
        .next()
        .ok_or_else(|| BackendError::Decode("empty representation".to_string()))
}

#[async_trait]
impl AuthProvider for RestBackend {
    async fn get_current_session(&self) -> BackendResult<Option<Session>> {
        let Some(stored) = self.stored() else {
            return Ok(None);
        };

        if !stored.session.is_valid(self.clock.now()) && stored.refresh_token.is_some() {
            return self.refresh_session().await.map(Some);
        }

        let url = self.endpoint(&["auth", "v1", "user"])?;
        match self.send(self.request(Method::GET, url)).await {
            Ok(resp) => {
                let user: UserResponse = decode_json(resp).await?;
                let mut session = stored.session;
                session.email = user.email.or(session.email);
                session.email_verified = user.email_confirmed_at.is_some();
                self.store(Some(StoredTokens {
                    session: session.clone(),
                    refresh_token: stored.refresh_token,
                }));
                Ok(Some(session))
            }
            Err(BackendError::Unauthorized) => {
                self.store(None);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn on_auth_state_change(&self, callback: AuthChangeCallback) -> ListenerHandle {
        self.listeners.subscribe(move |change| callback(change))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> BackendResult<Session> {
        let mut url = self.endpoint(&["auth", "v1", "token"])?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let resp = self
            .send(
                self.http
                    .post(url)
                    .header("apikey", &self.anon_key)
                    .json(&json!({ "email": email, "password": password })),
            )
            .await?;
        let token: TokenResponse = decode_json(resp).await?;
        let (session, refresh_token) = session_from_token(token, self.clock.now());

        self.store(Some(StoredTokens {
            session: session.clone(),
            refresh_token,
        }));
        self.listeners.notify(&AuthChange::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> BackendResult<()> {
        if self.stored().is_some() {
            let url = self.endpoint(&["auth", "v1", "logout"])?;
            if let Err(err) = self.send(self.request(Method::POST, url)).await {
                tracing::warn!("remote sign-out failed, clearing local session anyway: {err}");
            }
        }
        self.store(None);
        self.listeners.notify(&AuthChange::signed_out());
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &Url) -> BackendResult<()> {
        let mut url = self.endpoint(&["auth", "v1", "recover"])?;
        url.query_pairs_mut().append_pair("redirect_to", redirect_to.as_str());

        self.send(self.request(Method::POST, url).json(&json!({ "email": email })))
            .await?;
        Ok(())
    }

    async fn update_user(&self, update: UserUpdate) -> BackendResult<()> {
        let stored = self.stored().ok_or(BackendError::Unauthorized)?;

        let mut body = serde_json::Map::new();
        if let Some(password) = update.password {
            body.insert("password".into(), Value::String(password));
        }

        let url = self.endpoint(&["auth", "v1", "user"])?;
        let resp = self.send(self.request(Method::PUT, url).json(&body)).await?;
        let user: UserResponse = decode_json(resp).await?;

        let mut session = stored.session;
        session.email_verified = user.email_confirmed_at.is_some();
        self.store(Some(StoredTokens {
            session: session.clone(),
            refresh_token: stored.refresh_token,
        }));
        self.listeners
            .notify(&AuthChange::new(AuthChangeKind::UserUpdated, Some(session)));
        Ok(())
    }
}

#[async_trait]
impl DataStore for RestBackend {
    async fn fetch_rows(&self, table: &str, query: &Query) -> BackendResult<Vec<Row>> {
        let url = self.table_url(table, query)?;
        let resp = self.send(self.request(Method::GET, url)).await?;
        decode_json(resp).await
    }

    async fn fetch_row(&self, table: &str, query: &Query) -> BackendResult<Row> {
        let url = self.table_url(table, query)?;
        let resp = self
            .send(self.request(Method::GET, url).header("Accept", SINGLE_OBJECT))
            .await?;
        decode_json(resp).await
    }

    async fn insert_row(&self, table: &str, row: Row) -> BackendResult<Row> {
        let url = self.endpoint(&["rest", "v1", table])?;
        let resp = self
            .send(
                self.request(Method::POST, url)
                    .header("Prefer", RETURN_REPRESENTATION)
                    .json(&[row]),
            )
            .await?;
        first_row(decode_json(resp).await?)
    }

    async fn upsert_row(&self, table: &str, row: Row, on_conflict: &str) -> BackendResult<Row> {
        let mut url = self.endpoint(&["rest", "v1", table])?;
        url.query_pairs_mut().append_pair("on_conflict", on_conflict);
        let resp = self
            .send(
                self.request(Method::POST, url)
                    .header("Prefer", MERGE_DUPLICATES)
                    .json(&[row]),
            )
            .await?;
        first_row(decode_json(resp).await?)
    }

    async fn update_rows(&self, table: &str, query: &Query, patch: Row) -> BackendResult<Vec<Row>> {
        let url = self.table_url(table, query)?;
        let resp = self
            .send(
                self.request(Method::PATCH, url)
                    .header("Prefer", RETURN_REPRESENTATION)
                    .json(&patch),
            )
            .await?;
        decode_json(resp).await
    }

    async fn delete_rows(&self, table: &str, query: &Query) -> BackendResult<Vec<Row>> {
        let url = self.table_url(table, query)?;
        let resp = self
            .send(self.request(Method::DELETE, url).header("Prefer", RETURN_REPRESENTATION))
            .await?;
        decode_json(resp).await
    }
}

#[async_trait]
impl ObjectStorage for RestBackend {
    async fn upload_file(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> BackendResult<()> {
        let url = self.endpoint(&["storage", "v1", "object", bucket, path])?;
        self.send(
            self.request(Method::POST, url)
                .header("Content-Type", content_type)
                .header("x-upsert", "false")
                .body(bytes),
        )
        .await?;
        Ok(())
    }

    async fn remove_files(&self, bucket: &str, paths: &[String]) -> BackendResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let url = self.endpoint(&["storage", "v1", "object", bucket])?;
        self.send(self.request(Method::DELETE, url).json(&json!({ "prefixes": paths })))
            .await?;
        Ok(())
    }

    fn get_public_url(&self, bucket: &str, path: &str) -> BackendResult<Url> {
        self.endpoint(&["storage", "v1", "object", "public", bucket, path])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://project.example.co/").unwrap()
    }

    #[test]
    fn endpoints_append_to_base_path() {
        let url = build_endpoint(&base(), &["rest", "v1", "profiles"]).unwrap();
        assert_eq!(url.as_str(), "https://project.example.co/rest/v1/profiles");

        let nested = Url::parse("https://gw.example.co/pubtrack/").unwrap();
        let url = build_endpoint(&nested, &["auth", "v1", "user"]).unwrap();
        assert_eq!(url.as_str(), "https://gw.example.co/pubtrack/auth/v1/user");
    }

    #[test]
    fn object_paths_keep_their_segments() {
        let backend = RestBackend::new(base(), "anon").unwrap();
        let url = backend
            .get_public_url("publication-documents", "abc/1700000000000_paper.pdf")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://project.example.co/storage/v1/object/public/publication-documents/abc/1700000000000_paper.pdf"
        );
    }

    #[test]
    fn table_urls_carry_filters() {
        let backend = RestBackend::new(base(), "anon").unwrap();
        let url = backend
            .table_url("profiles", &Query::new().is_in("role", ["faculty", "hod"]))
            .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("select".to_string(), "*".to_string()),
                ("role".to_string(), "in.(faculty,hod)".to_string()),
            ]
        );
    }

    #[test]
    fn cannot_be_a_base_is_rejected() {
        let err = RestBackend::new(Url::parse("mailto:x@example.edu").unwrap(), "anon").unwrap_err();
        assert!(matches!(err, BackendError::Config(_)));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            map_status(400, r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#),
            BackendError::InvalidCredentials
        );
        assert_eq!(map_status(401, ""), BackendError::Unauthorized);
        assert_eq!(map_status(403, "{}"), BackendError::Unauthorized);
        assert_eq!(map_status(406, r#"{"code":"PGRST116"}"#), BackendError::NotFound);
        assert!(matches!(map_status(409, r#"{"message":"duplicate key"}"#), BackendError::Conflict(m) if m == "duplicate key"));
        assert_eq!(
            map_status(500, "boom"),
            BackendError::Api {
                status: 500,
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn token_response_becomes_session() {
        let now = Utc::now();
        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "jwt",
            "expires_in": 3600,
            "refresh_token": "r1",
            "user": {
                "id": "0190f0c4-8a1e-7cc3-9a4b-3d2f1e0a9b8c",
                "email": "f@example.edu",
                "email_confirmed_at": "2024-01-01T00:00:00Z"
            }
        }))
        .unwrap();

        let (session, refresh) = session_from_token(token, now);

        assert!(session.email_verified);
        assert_eq!(session.expires_at, Some(now + Duration::seconds(3600)));
        assert_eq!(refresh.as_deref(), Some("r1"));
    }

    #[test]
    fn unconfirmed_user_is_not_verified() {
        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "jwt",
            "expires_at": 1_900_000_000,
            "user": { "id": "0190f0c4-8a1e-7cc3-9a4b-3d2f1e0a9b8c" }
        }))
        .unwrap();

        let (session, refresh) = session_from_token(token, Utc::now());

        assert!(!session.email_verified);
        assert_eq!(session.expires_at.map(|t| t.timestamp()), Some(1_900_000_000));
        assert!(refresh.is_none());
    }
}
