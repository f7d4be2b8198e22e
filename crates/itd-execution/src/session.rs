use std::future::Future;

use tracing::{info, warn};

use crate::broker::{BrokerError, SessionRefresher};

/// Run `op`; on [`BrokerError::SessionExpired`] refresh the session and run
/// it exactly once more. Whatever the second attempt returns is final.
pub async fn with_session_retry<T, F, Fut>(
    refresher: &dyn SessionRefresher,
    op_name: &str,
    mut op: F,
) -> Result<T, BrokerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BrokerError>>,
{
    match op().await {
        Err(BrokerError::SessionExpired(msg)) => {
            warn!(op = op_name, reason = %msg, "broker session expired; refreshing");
            refresher.refresh().await?;
            info!(op = op_name, "session refreshed; retrying once");
            op().await
        }
        other => other,
    }
}
