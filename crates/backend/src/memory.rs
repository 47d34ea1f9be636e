//! In-memory backend for tests and local development.
//!
//! Implements all three contracts over plain collections and announces
//! auth changes synchronously, like the hosted provider does. Test hooks
//! allow injecting latency and failures into data fetches.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;
use url::Url;

use pubtrack_auth::Session;
use pubtrack_core::{Clock, SubjectId, SystemClock};
use pubtrack_events::{AuthChange, AuthChangeKind, ListenerHandle, Listeners};

use crate::error::{BackendError, BackendResult};
use crate::provider::{AuthChangeCallback, AuthProvider, UserUpdate};
use crate::storage::ObjectStorage;
use crate::store::{DataStore, Query, Row};

const DEFAULT_PUBLIC_BASE: &str = "http://localhost:54321";

#[derive(Debug, Clone)]
struct Account {
    subject: SubjectId,
    password: String,
    email_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetRequest {
    pub email: String,
    pub redirect_to: Url,
}

pub struct InMemoryBackend {
    clock: Arc<dyn Clock>,
    public_base: String,
    session_ttl: Duration,

    accounts: RwLock<HashMap<String, Account>>,
    current: RwLock<Option<Session>>,
    listeners: Listeners<AuthChange>,

    tables: RwLock<HashMap<String, Vec<Row>>>,
    objects: RwLock<BTreeMap<(String, String), StoredObject>>,

    fetch_count: AtomicUsize,
    fetch_delay: Mutex<Option<std::time::Duration>>,
    fetch_failures: Mutex<VecDeque<BackendError>>,
    write_failures: Mutex<VecDeque<BackendError>>,
    session_failure: Mutex<Option<BackendError>>,
    reset_requests: Mutex<Vec<ResetRequest>>,
}

fn poisoned() -> BackendError {
    BackendError::api(500, "in-memory backend lock poisoned")
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            public_base: DEFAULT_PUBLIC_BASE.to_string(),
            session_ttl: Duration::hours(1),
            accounts: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            listeners: Listeners::new(),
            tables: RwLock::new(HashMap::new()),
            objects: RwLock::new(BTreeMap::new()),
            fetch_count: AtomicUsize::new(0),
            fetch_delay: Mutex::new(None),
            fetch_failures: Mutex::new(VecDeque::new()),
            write_failures: Mutex::new(VecDeque::new()),
            session_failure: Mutex::new(None),
            reset_requests: Mutex::new(Vec::new()),
        }
    }

    /// Create an account and return its subject.
    pub fn register_account(&self, email: &str, password: &str, email_verified: bool) -> SubjectId {
        let subject = SubjectId::new();
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.insert(
                email.to_lowercase(),
                Account {
                    subject,
                    password: password.to_string(),
                    email_verified,
                },
            );
        }
        subject
    }

    pub fn verify_email(&self, email: &str) {
        if let Ok(mut accounts) = self.accounts.write() {
            if let Some(account) = accounts.get_mut(&email.to_lowercase()) {
                account.email_verified = true;
            }
        }
    }

    /// Issue a session for a registered account without emitting a change,
    /// as if it had been persisted by an earlier run.
    pub fn restore_session(&self, email: &str) -> Option<Session> {
        let account = self.accounts.read().ok()?.get(&email.to_lowercase()).cloned()?;
        let session = self.issue_session(email, &account);
        if let Ok(mut current) = self.current.write() {
            *current = Some(session.clone());
        }
        Some(session)
    }

    /// Push a change to subscribers, as the hosted provider would.
    pub fn emit(&self, change: AuthChange) {
        self.listeners.notify(&change);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn seed_rows(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        if let Ok(mut tables) = self.tables.write() {
            tables.entry(table.to_string()).or_default().extend(rows);
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .ok()
            .and_then(|tables| tables.get(table).cloned())
            .unwrap_or_default()
    }

    /// Delay every subsequent fetch by `delay` (tokio time).
    pub fn set_fetch_delay(&self, delay: Option<std::time::Duration>) {
        if let Ok(mut slot) = self.fetch_delay.lock() {
            *slot = delay;
        }
    }

    /// Make the next fetch fail with `err`. Queued failures are consumed in order.
    pub fn fail_next_fetch(&self, err: BackendError) {
        if let Ok(mut queue) = self.fetch_failures.lock() {
            queue.push_back(err);
        }
    }

    /// Make the next row write (insert, upsert, update, delete) fail with `err`.
    pub fn fail_next_write(&self, err: BackendError) {
        if let Ok(mut queue) = self.write_failures.lock() {
            queue.push_back(err);
        }
    }

    /// Make the next `get_current_session` call fail with `err`.
    pub fn fail_session_lookup(&self, err: BackendError) {
        if let Ok(mut slot) = self.session_failure.lock() {
            *slot = Some(err);
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn reset_requests(&self) -> Vec<ResetRequest> {
        self.reset_requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .ok()?
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    fn issue_session(&self, email: &str, account: &Account) -> Session {
        Session {
            subject: account.subject,
            email: Some(email.to_lowercase()),
            email_verified: account.email_verified,
            access_token: format!("mem-{}", uuid::Uuid::now_v7()),
            expires_at: Some(self.clock.now() + self.session_ttl),
        }
    }

    fn take_write_failure(&self) -> BackendResult<()> {
        match self.write_failures.lock().map_err(|_| poisoned())?.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn current_session(&self) -> Option<Session> {
        self.current.read().ok().and_then(|s| s.clone())
    }

    fn set_current(&self, session: Option<Session>) -> BackendResult<()> {
        let mut current = self.current.write().map_err(|_| poisoned())?;
        *current = session;
        Ok(())
    }

    fn with_defaults(&self, mut row: Row) -> Row {
        if !row.contains_key("id") {
            row.insert("id".into(), Value::String(uuid::Uuid::now_v7().to_string()));
        }
        if !row.contains_key("created_at") {
            row.insert("created_at".into(), Value::String(self.clock.now().to_rfc3339()));
        }
        row
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("listeners", &self.listeners.len())
            .field("fetch_count", &self.fetch_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthProvider for InMemoryBackend {
    async fn get_current_session(&self) -> BackendResult<Option<Session>> {
        if let Some(err) = self.session_failure.lock().map_err(|_| poisoned())?.take() {
            return Err(err);
        }
        Ok(self.current_session())
    }

    fn on_auth_state_change(&self, callback: AuthChangeCallback) -> ListenerHandle {
        self.listeners.subscribe(move |change| callback(change))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> BackendResult<Session> {
        let account = {
            let accounts = self.accounts.read().map_err(|_| poisoned())?;
            accounts.get(&email.to_lowercase()).cloned()
        };
        let account = match account {
            Some(account) if account.password == password => account,
            _ => return Err(BackendError::InvalidCredentials),
        };

        let session = self.issue_session(email, &account);
        self.set_current(Some(session.clone()))?;
        self.emit(AuthChange::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> BackendResult<()> {
        self.set_current(None)?;
        self.emit(AuthChange::signed_out());
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &Url) -> BackendResult<()> {
        self.reset_requests.lock().map_err(|_| poisoned())?.push(ResetRequest {
            email: email.to_string(),
            redirect_to: redirect_to.clone(),
        });
        Ok(())
    }

    async fn update_user(&self, update: UserUpdate) -> BackendResult<()> {
        let session = self.current_session().ok_or(BackendError::Unauthorized)?;

        if let Some(password) = update.password {
            let mut accounts = self.accounts.write().map_err(|_| poisoned())?;
            if let Some(account) = accounts.values_mut().find(|a| a.subject == session.subject) {
                account.password = password;
            }
        }

        self.emit(AuthChange::new(AuthChangeKind::UserUpdated, Some(session)));
        Ok(())
    }
}

#[async_trait]
impl DataStore for InMemoryBackend {
    async fn fetch_rows(&self, table: &str, query: &Query) -> BackendResult<Vec<Row>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.fetch_delay.lock().map_err(|_| poisoned())?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.fetch_failures.lock().map_err(|_| poisoned())?.pop_front();
        if let Some(err) = failure {
            return Err(err);
        }

        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_row(&self, table: &str, row: Row) -> BackendResult<Row> {
        self.take_write_failure()?;
        let row = self.with_defaults(row);
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let rows = tables.entry(table.to_string()).or_default();

        let id = row.get("id");
        if rows.iter().any(|existing| existing.get("id") == id) {
            return Err(BackendError::Conflict(format!("duplicate id in {table}")));
        }

        rows.push(row.clone());
        Ok(row)
    }

    async fn upsert_row(&self, table: &str, row: Row, on_conflict: &str) -> BackendResult<Row> {
        self.take_write_failure()?;
        let key = row.get(on_conflict).cloned();
        {
            let mut tables = self.tables.write().map_err(|_| poisoned())?;
            let rows = tables.entry(table.to_string()).or_default();
            let position = key
                .as_ref()
                .and_then(|key| rows.iter().position(|r| r.get(on_conflict) == Some(key)));
            if let Some(index) = position {
                let existing = &mut rows[index];
                existing.extend(row);
                return Ok(existing.clone());
            }
        }
        self.insert_row(table, row).await
    }

    async fn update_rows(&self, table: &str, query: &Query, patch: Row) -> BackendResult<Vec<Row>> {
        self.take_write_failure()?;
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };

        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|r| query.matches(r)) {
            row.extend(patch.clone());
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete_rows(&self, table: &str, query: &Query) -> BackendResult<Vec<Row>> {
        self.take_write_failure()?;
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };

        let (deleted, kept): (Vec<Row>, Vec<Row>) = rows.drain(..).partition(|r| query.matches(r));
        *rows = kept;
        Ok(deleted)
    }
}

#[async_trait]
impl ObjectStorage for InMemoryBackend {
    async fn upload_file(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> BackendResult<()> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        let key = (bucket.to_string(), path.to_string());
        if objects.contains_key(&key) {
            return Err(BackendError::Conflict("The resource already exists".to_string()));
        }
        objects.insert(
            key,
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn remove_files(&self, bucket: &str, paths: &[String]) -> BackendResult<()> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        for path in paths {
            objects.remove(&(bucket.to_string(), path.clone()));
        }
        Ok(())
    }

    fn get_public_url(&self, bucket: &str, path: &str) -> BackendResult<Url> {
        Url::parse(&format!("{}/storage/v1/object/public/{bucket}/{path}", self.public_base))
            .map_err(|e| BackendError::Config(e.to_string()))
    }
}
