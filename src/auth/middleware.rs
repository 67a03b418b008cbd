// Pending-authentication registry and exactly-once completion dispatch

use crate::auth::correlation::CorrelationId;
use crate::core::models::AuthenticationResult;
use crate::core::traits::AuthenticationListener;
use dashmap::DashMap;
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long a registration waits for its passphrase before it is evicted
pub const DEFAULT_REGISTRATION_TTL: Duration = Duration::from_secs(300);

/// Upper bound on a single timeout notification during a sweep
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

struct PendingRegistration {
    correlation_id: CorrelationId,
    listener: Arc<dyn AuthenticationListener>,
    registered_at: Instant,
}

impl PendingRegistration {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.registered_at.elapsed() >= ttl
    }
}

/// What happened to a completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The listener ran and returned `Ok`
    Delivered,
    /// The listener ran but returned `Err` or panicked
    ListenerFailed,
    /// No live registration matched; nothing was invoked
    Stale,
}

/// Correlates a passphrase submission with the command waiting for it
///
/// Holds at most one registration per user. Registering again supersedes the
/// previous registration without invoking its listener. A registration is
/// removed before its listener runs, so a listener can be invoked at most once
/// and its failures never leave the registry inconsistent.
pub struct AuthenticationMiddleware {
    registrations: DashMap<u64, PendingRegistration>,
    registration_ttl: Duration,
    notify_timeout: Duration,
}

impl Default for AuthenticationMiddleware {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRATION_TTL)
    }
}

impl AuthenticationMiddleware {
    pub fn new(registration_ttl: Duration) -> Self {
        Self {
            registrations: DashMap::new(),
            registration_ttl,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    /// Bound how long a sweep waits on each expired listener
    pub fn with_notify_timeout(mut self, notify_timeout: Duration) -> Self {
        self.notify_timeout = notify_timeout;
        self
    }

    /// Store a registration for `user_id`, replacing any existing one
    ///
    /// The returned id goes into the passphrase prompt and must come back with
    /// the submission.
    pub fn register_authentication_listener(
        &self,
        user_id: u64,
        listener: Arc<dyn AuthenticationListener>,
    ) -> CorrelationId {
        let correlation_id = CorrelationId::generate();
        let registration = PendingRegistration {
            correlation_id: correlation_id.clone(),
            listener,
            registered_at: Instant::now(),
        };

        if let Some(previous) = self.registrations.insert(user_id, registration) {
            debug!(
                user_id,
                superseded = previous.correlation_id.short(),
                "Superseded pending authentication"
            );
        }

        debug!(
            user_id,
            correlation_id = correlation_id.short(),
            "Registered authentication listener"
        );
        correlation_id
    }

    /// Deliver `result` to the listener registered under `correlation_id`
    ///
    /// The registration is consumed only if the id matches and has not expired.
    /// Anything else is a stale completion and a no-op.
    pub async fn complete_authentication(
        &self,
        correlation_id: &CorrelationId,
        result: AuthenticationResult,
    ) -> Completion {
        let user_id = result.user_id();
        let ttl = self.registration_ttl;

        let removed = self.registrations.remove_if(&user_id, |_, registration| {
            registration.correlation_id.ct_eq(correlation_id) && !registration.is_expired(ttl)
        });

        let Some((_, registration)) = removed else {
            debug!(
                user_id,
                correlation_id = correlation_id.short(),
                "Ignoring stale authentication completion"
            );
            return Completion::Stale;
        };

        debug!(
            user_id,
            success = result.is_success(),
            "Dispatching authentication result"
        );
        dispatch(user_id, registration.listener, result).await
    }

    /// Whether `correlation_id` is the live registration for `user_id`
    pub fn is_pending(&self, user_id: u64, correlation_id: &CorrelationId) -> bool {
        self.registrations
            .get(&user_id)
            .map(|registration| {
                registration.correlation_id.ct_eq(correlation_id) && !registration.is_expired(self.registration_ttl)
            })
            .unwrap_or(false)
    }

    pub fn pending_count(&self) -> usize {
        self.registrations.len()
    }

    pub fn registration_ttl(&self) -> Duration {
        self.registration_ttl
    }

    pub fn notify_timeout(&self) -> Duration {
        self.notify_timeout
    }

    /// Evict expired registrations, notifying each listener with a timeout result
    ///
    /// Every expired registration is removed before any listener runs. The
    /// notifications then run concurrently, each bounded by the notify timeout,
    /// so a listener that never returns cannot hold up the sweep.
    ///
    /// Returns the number of registrations evicted.
    pub async fn sweep_expired(&self) -> usize {
        let ttl = self.registration_ttl;
        let expired_users: Vec<u64> = self
            .registrations
            .iter()
            .filter(|entry| entry.value().is_expired(ttl))
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = Vec::with_capacity(expired_users.len());
        for user_id in expired_users {
            // Re-checked: the user may have registered again since the scan
            let Some((_, registration)) = self
                .registrations
                .remove_if(&user_id, |_, registration| registration.is_expired(ttl))
            else {
                continue;
            };

            debug!(
                user_id,
                correlation_id = registration.correlation_id.short(),
                "Pending authentication timed out"
            );
            evicted.push((user_id, registration.listener));
        }

        let swept = evicted.len();
        let notify_timeout = self.notify_timeout;
        join_all(evicted.into_iter().map(|(user_id, listener)| async move {
            let notification = dispatch(user_id, listener, AuthenticationResult::timeout(user_id));
            if tokio::time::timeout(notify_timeout, notification).await.is_err() {
                warn!(
                    user_id,
                    timeout_ms = notify_timeout.as_millis() as u64,
                    "Authentication listener did not finish timeout notification"
                );
            }
        }))
        .await;

        swept
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `interval` until `cancel` fires
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let middleware = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Registration sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let swept = middleware.sweep_expired().await;
                        if swept > 0 {
                            info!(swept, remaining = middleware.pending_count(), "Evicted expired pending authentications");
                        }
                    }
                }
            }
        })
    }
}

/// Invoke a listener, containing its errors and panics
async fn dispatch(
    user_id: u64,
    listener: Arc<dyn AuthenticationListener>,
    result: AuthenticationResult,
) -> Completion {
    match AssertUnwindSafe(listener.on_authentication_completed(result))
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => Completion::Delivered,
        Ok(Err(e)) => {
            error!(user_id, error = %e, "Authentication listener returned an error");
            Completion::ListenerFailed
        }
        Err(panic) => {
            error!(user_id, panic = %panic_message(panic.as_ref()), "Authentication listener panicked");
            Completion::ListenerFailed
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
