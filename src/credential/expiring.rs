//! Single-flight expiring-value cache.
//!
//! Grounded on the real `aws-config` IMDS token cache (`TokenResolverInner`,
//! `ExpiringCache`): a cached value paired with an expiration instant, a
//! background-refresh threshold, and at most one outstanding refresh task
//! shared across every concurrent caller. The state machine is the one
//! spec'd in §3/§4.6 (`NoValue`/`Loading`/`Fresh`/`FreshWithRefresh`/`Failed`),
//! collapsed here onto a `tokio::sync::Mutex`-guarded enum plus a
//! `tokio::sync::broadcast`-style shared future for in-flight refreshes.
//!
//! The locking discipline in §5 ("never hold a lock across an await";
//! "unlock before resuming a continuation") is realized by never calling
//! `.await` while holding the `Mutex` guard: every method below drops the
//! guard (or clones what it needs out of it) before awaiting anything.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::Mutex;

/// Errors surfaced by a refresh function, shared (via `Clone`) across every
/// waiter on a failed in-flight refresh.
#[derive(Clone, Debug)]
pub struct ExpiringValueError(pub Arc<dyn std::error::Error + Send + Sync>);

impl fmt::Display for ExpiringValueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ExpiringValueError {}

impl ExpiringValueError {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        ExpiringValueError(Arc::new(err))
    }
}

/// A future that every waiter on the same in-flight refresh can `.await`
/// independently; cancelling one waiter's future does not cancel the
/// underlying task (§5's "cancelling the wait, not the refresh").
type SharedRefresh<T> = futures::future::Shared<
    futures::future::BoxFuture<'static, Result<(T, DateTime<Utc>), ExpiringValueError>>,
>;

enum State<T> {
    NoValue,
    Loading(SharedRefresh<T>),
    Fresh { value: T, expires_at: DateTime<Utc> },
    FreshWithRefresh {
        value: T,
        expires_at: DateTime<Utc>,
        refresh: SharedRefresh<T>,
    },
    Failed(ExpiringValueError),
}

/// Shared cache for one refreshable value. `get` is called by every
/// concurrent caller; at most one refresh is ever in flight regardless of
/// how many callers observe a stale/expired value at once.
pub struct ExpiringValue<T> {
    state: Mutex<State<T>>,
    /// How long before expiry to kick off a background refresh while still
    /// serving the (still valid) cached value.
    threshold: ChronoDuration,
}

impl<T: Clone + Send + Sync + 'static> ExpiringValue<T> {
    pub fn new(threshold: ChronoDuration) -> Self {
        ExpiringValue {
            state: Mutex::new(State::NoValue),
            threshold,
        }
    }

    /// Returns the cached value, refreshing it first (and awaiting that
    /// refresh) if there is none or it has expired; otherwise returns
    /// immediately, kicking off a background refresh if within
    /// `threshold` of expiring.
    pub async fn get<F, Fut>(&self, refresh: F) -> Result<T, ExpiringValueError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(T, DateTime<Utc>), ExpiringValueError>> + Send + 'static,
    {
        let now = Utc::now();
        let shared = {
            // Take ownership of the current state via `mem::replace` rather
            // than matching on a borrow of the guard, so the arms below are
            // free to write back into `*guard` without fighting the borrow
            // checker over a reference still alive from the match scrutinee.
            let mut guard = self.state.lock().await;
            let current = std::mem::replace(&mut *guard, State::NoValue);
            match current {
                State::Fresh { value, expires_at } if expires_at > now + self.threshold => {
                    *guard = State::Fresh { value: value.clone(), expires_at };
                    return Ok(value);
                }
                State::Fresh { value, expires_at } if expires_at > now => {
                    let shared = spawn_shared(refresh);
                    *guard = State::FreshWithRefresh {
                        value: value.clone(),
                        expires_at,
                        refresh: shared,
                    };
                    return Ok(value);
                }
                State::FreshWithRefresh { value, expires_at, refresh } if expires_at > now => {
                    *guard = State::FreshWithRefresh { value: value.clone(), expires_at, refresh };
                    return Ok(value);
                }
                State::FreshWithRefresh { refresh, .. } => {
                    *guard = State::Loading(refresh.clone());
                    refresh
                }
                State::Loading(task) => {
                    *guard = State::Loading(task.clone());
                    task
                }
                State::NoValue | State::Fresh { .. } | State::Failed(_) => {
                    let shared = spawn_shared(refresh);
                    *guard = State::Loading(shared.clone());
                    shared
                }
            }
        };

        match shared.await {
            Ok((value, expires_at)) => {
                let mut guard = self.state.lock().await;
                *guard = State::Fresh {
                    value: value.clone(),
                    expires_at,
                };
                Ok(value)
            }
            Err(err) => {
                let mut guard = self.state.lock().await;
                *guard = State::Failed(err.clone());
                Err(err)
            }
        }
    }

    /// Drops any cached value and in-flight refresh handle, forcing the
    /// next `get` to start fresh. Does not cancel a task another waiter may
    /// still be awaiting (single-flight semantics: the task itself keeps
    /// running for whoever else holds the shared future).
    pub async fn invalidate(&self) {
        let mut guard = self.state.lock().await;
        *guard = State::NoValue;
    }
}

fn spawn_shared<T, F, Fut>(refresh: F) -> SharedRefresh<T>
where
    T: Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(T, DateTime<Utc>), ExpiringValueError>> + Send + 'static,
{
    use futures::FutureExt;
    let handle = tokio::spawn(async move { refresh().await });
    let fut: futures::future::BoxFuture<'static, Result<(T, DateTime<Utc>), ExpiringValueError>> =
        Box::pin(async move {
            match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(ExpiringValueError::new(JoinErrorWrapper(join_err))),
            }
        });
    fut.shared()
}

#[derive(Debug)]
struct JoinErrorWrapper(tokio::task::JoinError);

impl fmt::Display for JoinErrorWrapper {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "refresh task panicked or was cancelled: {}", self.0)
    }
}

impl std::error::Error for JoinErrorWrapper {}
