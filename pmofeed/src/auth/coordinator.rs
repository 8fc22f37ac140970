//! Single-flight token refresh
//!
//! Every request that fails with HTTP 401 asks the coordinator whether it
//! should be replayed. The first one starts a refresh cycle; the others
//! queue up behind it and are all answered, in arrival order, once the
//! exchange settles. Whatever the number of concurrent 401s, a cycle calls
//! the token endpoint exactly once.
//!
//! Credentials are versioned by a generation counter. A request signed with
//! an older generation than the current one failed because of a token that
//! has already been replaced, so it is replayed without a new cycle.

use super::credential::{mask_token, Credential, TokenSet};
use super::exchange::TokenExchange;
use crate::error::{FeedError, Result};
use crate::transport::{HttpRequest, TransportError};
use chrono::Duration;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

/// Capacity of the refresh event channel
const REFRESH_EVENT_CAPACITY: usize = 16;

/// Default margin before expiry at which a token is refreshed proactively
pub const DEFAULT_REFRESH_LEAD_SECS: i64 = 60;

/// Answer given to a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Replay the request with the current credential
    Retry,
    /// Surface the failure to the caller
    DoNotRetry,
}

impl RetryDecision {
    pub fn should_retry(self) -> bool {
        matches!(self, Self::Retry)
    }
}

/// Outcome of a refresh cycle, broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshEvent {
    /// A new credential was stored under `generation`
    Refreshed { generation: u64 },
    /// The token endpoint rejected the refresh token
    Failed { reason: String },
}

#[derive(Debug, Clone)]
enum Outcome {
    Refreshed(u64),
    Failed(String),
}

impl Outcome {
    fn decision(&self) -> RetryDecision {
        match self {
            Outcome::Refreshed(_) => RetryDecision::Retry,
            Outcome::Failed(_) => RetryDecision::DoNotRetry,
        }
    }
}

struct State {
    credential: Credential,
    generation: u64,
    refreshing: bool,
    waiters: VecDeque<oneshot::Sender<Outcome>>,
    refresh_lead: Duration,
}

struct Inner {
    state: Mutex<State>,
    exchange: Arc<dyn TokenExchange>,
    events: broadcast::Sender<RefreshEvent>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owner of one provider's credential
///
/// Cheap to clone; all clones share the same credential and refresh cycle.
/// The cycle runs on its own task, so dropping a waiting caller never
/// cancels it for the others.
///
/// # Example
///
/// ```no_run
/// use pmofeed::{Credential, OAuth2TokenExchange, TokenRefreshCoordinator};
///
/// # fn main() -> pmofeed::Result<()> {
/// let exchange = OAuth2TokenExchange::new("https://oauth2.googleapis.com/token", "client-id")?;
/// let coordinator = TokenRefreshCoordinator::new(
///     Credential::new("access-token", "refresh-token"),
///     exchange,
/// );
///
/// let mut events = coordinator.subscribe();
/// # let _ = &mut events;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TokenRefreshCoordinator {
    inner: Arc<Inner>,
}

impl TokenRefreshCoordinator {
    pub fn new(credential: Credential, exchange: impl TokenExchange) -> Self {
        Self::with_shared_exchange(credential, Arc::new(exchange))
    }

    pub fn with_shared_exchange(credential: Credential, exchange: Arc<dyn TokenExchange>) -> Self {
        let (events, _) = broadcast::channel(REFRESH_EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    credential,
                    generation: 0,
                    refreshing: false,
                    waiters: VecDeque::new(),
                    refresh_lead: Duration::seconds(DEFAULT_REFRESH_LEAD_SECS),
                }),
                exchange,
                events,
            }),
        }
    }

    /// Margin before expiry used by [`refresh_if_expired`](Self::refresh_if_expired)
    pub fn set_refresh_lead(&self, lead: Duration) {
        self.inner.lock().refresh_lead = lead;
    }

    /// Signs `request` with the current access token
    ///
    /// Returns the generation of the credential used, to hand back to
    /// [`should_retry`](Self::should_retry) if the request fails.
    pub fn authorize(&self, request: HttpRequest) -> (HttpRequest, u64) {
        let state = self.inner.lock();
        (
            request.bearer(&state.credential.access_token),
            state.generation,
        )
    }

    /// Decides whether a request signed with `generation` and failed with
    /// `error` should be replayed
    ///
    /// Non-401 failures are never retried. A 401 waits for the outcome of
    /// the current refresh cycle, starting one if none is in flight.
    pub async fn should_retry(&self, generation: u64, error: &TransportError) -> RetryDecision {
        if !error.is_unauthorized() {
            return RetryDecision::DoNotRetry;
        }

        let receiver = {
            let mut state = self.inner.lock();
            if generation < state.generation && !state.refreshing {
                debug!(
                    generation,
                    current = state.generation,
                    "Stale token rejected, replaying with current credential"
                );
                return RetryDecision::Retry;
            }
            match self.enqueue(&mut state) {
                Some(receiver) => receiver,
                None => return RetryDecision::DoNotRetry,
            }
        };

        Self::wait(receiver).await.decision()
    }

    /// Refreshes the credential, joining the cycle in flight if any
    pub async fn refresh(&self) -> Result<u64> {
        let receiver = {
            let mut state = self.inner.lock();
            self.enqueue(&mut state)
        };
        let receiver =
            receiver.ok_or_else(|| FeedError::refresh_failed("No async runtime available"))?;

        match Self::wait(receiver).await {
            Outcome::Refreshed(generation) => Ok(generation),
            Outcome::Failed(reason) => Err(FeedError::RefreshFailed(reason)),
        }
    }

    /// Refreshes only when the access token is about to expire
    pub async fn refresh_if_expired(&self) -> Result<()> {
        let expired = {
            let state = self.inner.lock();
            state.credential.is_expired(state.refresh_lead)
        };
        if expired {
            debug!("Access token about to expire, refreshing proactively");
            self.refresh().await?;
        }
        Ok(())
    }

    /// Replaces the credential after an out-of-band re-authentication
    pub fn replace_credential(&self, credential: Credential) -> u64 {
        let mut state = self.inner.lock();
        state.credential = credential;
        state.generation += 1;
        state.generation
    }

    /// Receives the outcome of every subsequent refresh cycle
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot of the current credential
    pub fn credential(&self) -> Credential {
        self.inner.lock().credential.clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.lock().refreshing
    }

    /// Number of requests blocked on the cycle in flight
    pub fn waiter_count(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// Queues a waiter and starts a cycle if none is running
    ///
    /// Must be called with the state lock held.
    fn enqueue(&self, state: &mut State) -> Option<oneshot::Receiver<Outcome>> {
        let runtime = tokio::runtime::Handle::try_current().ok();
        if !state.refreshing && runtime.is_none() {
            warn!("Cannot start a token refresh outside a tokio runtime");
            return None;
        }

        let (sender, receiver) = oneshot::channel();
        state.waiters.push_back(sender);

        if let (false, Some(runtime)) = (state.refreshing, runtime) {
            state.refreshing = true;
            let refresh_token = state.credential.refresh_token.clone();
            info!(
                generation = state.generation,
                refresh_token = %mask_token(&refresh_token),
                "Starting token refresh"
            );
            runtime.spawn(Self::run_refresh(Arc::clone(&self.inner), refresh_token));
        } else {
            debug!(waiters = state.waiters.len(), "Joining token refresh in flight");
        }

        Some(receiver)
    }

    async fn wait(receiver: oneshot::Receiver<Outcome>) -> Outcome {
        receiver
            .await
            .unwrap_or_else(|_| Outcome::Failed("Token refresh was abandoned".to_string()))
    }

    async fn run_refresh(inner: Arc<Inner>, refresh_token: String) {
        let guard = SettleGuard(Some(Arc::clone(&inner)));

        let exchange = Arc::clone(&inner.exchange);
        let result = match tokio::spawn(async move { exchange.exchange(&refresh_token).await })
            .await
        {
            Ok(result) => result,
            Err(e) => Err(FeedError::refresh_failed(format!(
                "Token exchange aborted: {}",
                e
            ))),
        };

        guard.settle(result);
    }
}

/// Ends the cycle in flight, whatever happens to the task running it
///
/// When the refresh task is dropped before the exchange settles (its
/// runtime shut down, for instance), the waiters are failed and the
/// coordinator can start a new cycle.
struct SettleGuard(Option<Arc<Inner>>);

impl SettleGuard {
    fn settle(mut self, result: Result<TokenSet>) {
        if let Some(inner) = self.0.take() {
            inner.settle(result);
        }
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.0.take() {
            inner.settle(Err(FeedError::refresh_failed("Token refresh was abandoned")));
        }
    }
}

impl Inner {
    fn settle(&self, result: Result<TokenSet>) {
        let (outcome, waiters) = {
            let mut state = self.lock();
            let outcome = match result {
                Ok(tokens) => {
                    state.credential.apply(tokens);
                    state.generation += 1;
                    Outcome::Refreshed(state.generation)
                }
                Err(FeedError::RefreshFailed(reason)) => Outcome::Failed(reason),
                Err(e) => Outcome::Failed(e.to_string()),
            };
            state.refreshing = false;
            (outcome, std::mem::take(&mut state.waiters))
        };

        let event = match &outcome {
            Outcome::Refreshed(generation) => {
                info!(
                    generation,
                    waiters = waiters.len(),
                    "Token refreshed, replaying waiting requests"
                );
                RefreshEvent::Refreshed {
                    generation: *generation,
                }
            }
            Outcome::Failed(reason) => {
                warn!(waiters = waiters.len(), "Token refresh failed: {}", reason);
                RefreshEvent::Failed {
                    reason: reason.clone(),
                }
            }
        };
        let _ = self.events.send(event);

        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl std::fmt::Debug for TokenRefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("TokenRefreshCoordinator")
            .field("credential", &state.credential)
            .field("generation", &state.generation)
            .field("refreshing", &state.refreshing)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}
