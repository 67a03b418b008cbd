// Authentication resume protocol: correlation, registry and consumer glue

pub mod authenticator;
pub mod correlation;
pub mod middleware;

pub use authenticator::{AuthOutcome, Authenticator, InMemoryCredentialRepository};
pub use correlation::CorrelationId;
pub use middleware::{AuthenticationMiddleware, Completion};

use crate::config::Config;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Build the middleware from `REGISTRATION_*` settings and start its sweeper
///
/// The sweeper runs until `cancel` fires.
pub fn build_middleware(config: &Config, cancel: CancellationToken) -> (Arc<AuthenticationMiddleware>, JoinHandle<()>) {
    let middleware = Arc::new(AuthenticationMiddleware::new(config.registration_timeout()));
    let sweeper = middleware.spawn_sweeper(config.registration_sweep_interval(), cancel);

    tracing::info!(
        registration_timeout_secs = config.registration_timeout_secs,
        sweep_interval_secs = config.registration_sweep_interval_secs,
        "Authentication middleware ready"
    );
    (middleware, sweeper)
}
