//! Token lifecycle manager
//!
//! [`TokenManager`] owns the cached [`Token`] for one OAuth2 relationship
//! and keeps it usable:
//!
//! - [`TokenManager::get_access_token`] returns the cached credential while
//!   it is valid, without any I/O.
//! - [`TokenManager::refresh_token`] renews it. Concurrent callers share a
//!   single in-flight renewal.
//! - After every successful renewal a background task is armed to renew
//!   again one minute before expiry.
//! - [`TokenManager::fetch_mw`] attaches the bearer credential to an
//!   outbound request and retries exactly once after a `401`.
//!
//! # Renewal strategies
//!
//! Renewal tries, in order, and the first success wins:
//!
//! 1. the `refresh_token` grant, if the cached token is refreshable (a
//!    failure is logged and falls through);
//! 2. the caller-supplied [`TokenSource`];
//! 3. otherwise the renewal fails with [`OAuth2Error::Unrecoverable`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use oauth2_fetch::client::{ClientCredentialsParams, OAuth2Client};
//! use oauth2_fetch::config::ClientSettings;
//! use oauth2_fetch::manager::{TokenManager, TokenManagerOptions};
//!
//! # async fn example() -> oauth2_fetch::error::Result<()> {
//! let client = Arc::new(OAuth2Client::with_default_transport(
//!     ClientSettings::new("my-client")
//!         .with_server("https://auth.example.com/")
//!         .with_client_secret("s3cret"),
//! ));
//!
//! let source_client = Arc::clone(&client);
//! let manager = TokenManager::new(
//!     TokenManagerOptions::new(client).token_source(move || {
//!         let client = Arc::clone(&source_client);
//!         async move {
//!             let token = client
//!                 .client_credentials(ClientCredentialsParams::default())
//!                 .await?;
//!             Ok::<_, anyhow::Error>(Some(token))
//!         }
//!     }),
//! );
//!
//! let access_token = manager.get_access_token().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::StatusCode;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use crate::client::{OAuth2Client, RefreshParams};
use crate::error::{OAuth2Error, Result};
use crate::token::Token;
use crate::transport::{HttpRequest, HttpResponse};

/// Background renewal fires this long before expiry.
pub const REFRESH_LEAD_TIME: Duration = Duration::from_secs(60);

/// Tokens expiring sooner than this are not scheduled for background
/// renewal.
pub const MIN_SCHEDULE_WINDOW: Duration = Duration::from_secs(120);

/// Callback invoked when a renewal fails.
pub type ErrorCallback = Arc<dyn Fn(&OAuth2Error) + Send + Sync>;

type SharedRefresh = Shared<BoxFuture<'static, Result<Token>>>;

// ---------------------------------------------------------------------------
// Caller-supplied seams
// ---------------------------------------------------------------------------

/// Obtains a brand-new token when refreshing is impossible, e.g. by running
/// the `client_credentials` grant.
///
/// Implemented for any `Fn() -> impl Future<Output = anyhow::Result<Option<Token>>>`.
/// Returning `Ok(None)` means no token is available.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    /// Produces a new token.
    async fn new_token(&self) -> anyhow::Result<Option<Token>>;
}

#[async_trait::async_trait]
impl<F, Fut> TokenSource for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<Token>>> + Send,
{
    async fn new_token(&self) -> anyhow::Result<Option<Token>> {
        (self)().await
    }
}

/// Persists tokens across manager instances.
#[async_trait::async_trait]
pub trait TokenStorage: Send + Sync {
    /// Loads a previously stored token. Consulted once, before the first
    /// token is handed out.
    async fn load(&self) -> anyhow::Result<Option<Token>>;

    /// Stores a freshly obtained token.
    async fn store(&self, token: &Token) -> anyhow::Result<()>;
}

/// In-memory [`TokenStorage`], mostly useful for tests and for sharing a
/// token between managers in one process.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    token: Mutex<Option<Token>>,
}

impl MemoryTokenStorage {
    /// Creates storage pre-seeded with `token`.
    pub fn with_token(token: Token) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }

    /// The stored token, if any.
    pub fn get(&self) -> Option<Token> {
        lock(&self.token).clone()
    }
}

#[async_trait::async_trait]
impl TokenStorage for MemoryTokenStorage {
    async fn load(&self) -> anyhow::Result<Option<Token>> {
        Ok(self.get())
    }

    async fn store(&self, token: &Token) -> anyhow::Result<()> {
        *lock(&self.token) = Some(token.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TokenManagerOptions
// ---------------------------------------------------------------------------

/// Builder for [`TokenManager`].
pub struct TokenManagerOptions {
    client: Arc<OAuth2Client>,
    token: Option<Token>,
    token_source: Option<Arc<dyn TokenSource>>,
    storage: Option<Arc<dyn TokenStorage>>,
    on_error: Option<ErrorCallback>,
    schedule_refresh: bool,
}

impl TokenManagerOptions {
    /// Options with only the protocol client set. Background renewal is
    /// enabled by default.
    pub fn new(client: Arc<OAuth2Client>) -> Self {
        Self {
            client,
            token: None,
            token_source: None,
            storage: None,
            on_error: None,
            schedule_refresh: true,
        }
    }

    /// Starts with a known token.
    pub fn token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }

    /// Sets the strategy for obtaining a brand-new token.
    pub fn token_source(mut self, source: impl TokenSource + 'static) -> Self {
        self.token_source = Some(Arc::new(source));
        self
    }

    /// Sets token storage.
    pub fn storage(mut self, storage: Arc<dyn TokenStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sets a callback invoked whenever a renewal fails.
    pub fn on_error(mut self, callback: impl Fn(&OAuth2Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Enables or disables background renewal.
    pub fn schedule_refresh(mut self, enabled: bool) -> Self {
        self.schedule_refresh = enabled;
        self
    }
}

// ---------------------------------------------------------------------------
// TokenManager
// ---------------------------------------------------------------------------

/// Caches, renews and attaches the bearer credential of one OAuth2
/// relationship.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

struct ScheduledRefresh {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    client: Arc<OAuth2Client>,
    token_source: Option<Arc<dyn TokenSource>>,
    storage: Option<Arc<dyn TokenStorage>>,
    on_error: Option<ErrorCallback>,
    schedule_enabled: bool,
    token: RwLock<Option<Token>>,
    active_refresh: Mutex<Option<SharedRefresh>>,
    refresh_timer: Mutex<Option<ScheduledRefresh>>,
    timer_generation: AtomicU64,
    stored_token_loaded: OnceCell<()>,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("client", &self.inner.client)
            .field("token", &self.inner.current())
            .field("refreshing", &lock(&self.inner.active_refresh).is_some())
            .field("scheduled", &lock(&self.inner.refresh_timer).is_some())
            .finish()
    }
}

impl TokenManager {
    /// Creates a manager.
    ///
    /// If the options carry a token, background renewal is armed for it
    /// right away (when called inside a Tokio runtime).
    pub fn new(options: TokenManagerOptions) -> Self {
        let inner = Arc::new(Inner {
            client: options.client,
            token_source: options.token_source,
            storage: options.storage,
            on_error: options.on_error,
            schedule_enabled: options.schedule_refresh,
            token: RwLock::new(options.token),
            active_refresh: Mutex::new(None),
            refresh_timer: Mutex::new(None),
            timer_generation: AtomicU64::new(0),
            stored_token_loaded: OnceCell::new(),
        });
        inner.schedule_refresh();
        Self { inner }
    }

    /// The protocol client this manager renews tokens with.
    pub fn client(&self) -> &Arc<OAuth2Client> {
        &self.inner.client
    }

    /// The cached token, without any validity check or I/O.
    pub fn token(&self) -> Option<Token> {
        self.inner.current()
    }

    /// Returns a valid token, renewing it first if it is missing or
    /// expired.
    ///
    /// # Errors
    ///
    /// Returns the renewal error if renewal was needed and failed.
    pub async fn get_token(&self) -> Result<Token> {
        self.inner.load_stored_token().await;

        if let Some(token) = self.inner.current().filter(|t| !t.is_expired()) {
            return Ok(token);
        }
        self.refresh_token().await
    }

    /// Returns a valid access token. See [`TokenManager::get_token`].
    pub async fn get_access_token(&self) -> Result<String> {
        Ok(self.get_token().await?.access_token)
    }

    /// Renews the token now, regardless of its expiry.
    ///
    /// If a renewal is already in flight, this waits for it and returns its
    /// outcome instead of starting another one.
    ///
    /// # Errors
    ///
    /// Returns [`OAuth2Error::Unrecoverable`] when no strategy produced a
    /// token, or the error of the token source.
    pub async fn refresh_token(&self) -> Result<Token> {
        Inner::refresh(&self.inner).await
    }

    /// Replaces the cached token and re-arms background renewal.
    pub fn set_token(&self, token: Token) {
        *self
            .inner
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(token);
        self.inner.schedule_refresh();
    }

    /// Sends `request` through `next` with a bearer credential attached.
    ///
    /// On a `401` the token is renewed and a fresh copy of the original
    /// request is sent once more with the new credential. The second
    /// response is returned whatever its status.
    ///
    /// # Errors
    ///
    /// Returns renewal errors, and [`OAuth2Error::Transport`] when `next`
    /// fails.
    pub async fn fetch_mw<F, Fut>(&self, request: HttpRequest, next: F) -> Result<HttpResponse>
    where
        F: Fn(HttpRequest) -> Fut,
        Fut: Future<Output = anyhow::Result<HttpResponse>>,
    {
        let access_token = self.get_access_token().await?;
        let mut authenticated = request.clone();
        authenticated.set_bearer(&access_token)?;

        let response = next(authenticated).await.map_err(OAuth2Error::transport)?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!(url = %request.url, "Received 401, renewing token and retrying once");
        let token = self.refresh_token().await?;
        let mut retry = request;
        retry.set_bearer(&token.access_token)?;
        next(retry).await.map_err(OAuth2Error::transport)
    }

    /// [`TokenManager::fetch_mw`] over the client's own transport.
    pub async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse> {
        let transport = self.inner.client.transport();
        self.fetch_mw(request, |req| {
            let transport = Arc::clone(&transport);
            async move { transport.send(req).await }
        })
        .await
    }

    /// Disarms background renewal.
    ///
    /// The manager stays usable; the next successful renewal arms a new
    /// timer.
    pub fn dispose(&self) {
        self.inner.cancel_timer();
    }
}

impl Inner {
    fn current(&self) -> Option<Token> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn load_stored_token(&self) {
        let Some(storage) = &self.storage else { return };
        self.stored_token_loaded
            .get_or_init(|| async {
                match storage.load().await {
                    Ok(Some(token)) => {
                        let mut slot = self.token.write().unwrap_or_else(PoisonError::into_inner);
                        if slot.is_none() {
                            tracing::debug!("Loaded token from storage");
                            *slot = Some(token);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "Failed to load stored token"),
                }
            })
            .await;
    }

    async fn refresh(self: &Arc<Self>) -> Result<Token> {
        let shared = lock(&self.active_refresh)
            .get_or_insert_with(|| {
                let inner = Arc::clone(self);
                async move {
                    let result = inner.renew().await;
                    lock(&inner.active_refresh).take();
                    result
                }
                .boxed()
                .shared()
            })
            .clone();
        shared.await
    }

    async fn renew(self: &Arc<Self>) -> Result<Token> {
        // Make sure a stored refresh credential is considered even when the
        // first call is an explicit refresh.
        self.load_stored_token().await;

        let mut renewed = None;

        if let Some(current) = self.current().filter(Token::is_refreshable) {
            match self
                .client
                .refresh_token(&current, RefreshParams::default())
                .await
            {
                Ok(token) => renewed = Some(token),
                Err(e) => tracing::warn!(error = %e, "Refresh token grant failed"),
            }
        }

        if renewed.is_none() {
            if let Some(source) = &self.token_source {
                match source.new_token().await {
                    Ok(token) => renewed = token,
                    Err(e) => return Err(self.fail(OAuth2Error::callback(e))),
                }
            }
        }

        let Some(token) = renewed else {
            return Err(self.fail(OAuth2Error::Unrecoverable));
        };

        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.store(&token).await {
                tracing::warn!(error = %e, "Failed to store renewed token");
            }
        }

        self.schedule_refresh();
        tracing::debug!(expires_at = ?token.expires_at, "Token renewed");
        Ok(token)
    }

    fn fail(&self, err: OAuth2Error) -> OAuth2Error {
        if let Some(callback) = &self.on_error {
            callback(&err);
        }
        err
    }

    fn cancel_timer(&self) {
        if let Some(scheduled) = lock(&self.refresh_timer).take() {
            scheduled.handle.abort();
        }
    }

    fn schedule_refresh(self: &Arc<Self>) {
        let mut timer = lock(&self.refresh_timer);
        if let Some(previous) = timer.take() {
            previous.handle.abort();
        }

        if !self.schedule_enabled {
            return;
        }

        let Some(token) = self.current() else { return };
        let (Some(expires_at), true) = (token.expires_at, token.is_refreshable()) else {
            return;
        };

        let expires_in = (expires_at - Utc::now()).to_std().unwrap_or_default();
        if expires_in < MIN_SCHEDULE_WINDOW {
            tracing::debug!(?expires_in, "Token expires too soon for background renewal");
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No Tokio runtime, background renewal not scheduled");
            return;
        };

        let delay = expires_in - REFRESH_LEAD_TIME;
        let generation = self.timer_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let weak: Weak<Inner> = Arc::downgrade(self);
        tracing::debug!(?delay, "Scheduling background token renewal");

        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else { return };

            // Detach from the slot so the renewal's own re-arming does not
            // abort this task.
            {
                let mut slot = lock(&inner.refresh_timer);
                if slot.as_ref().map(|s| s.generation) == Some(generation) {
                    slot.take();
                }
            }

            if let Err(e) = Inner::refresh(&inner).await {
                tracing::error!(error = %e, "Background OAuth2 token renewal failed");
            }
        });

        *timer = Some(ScheduledRefresh { generation, handle });
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(scheduled) = self
            .refresh_timer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            scheduled.handle.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
