use std::time::Duration;

use cradle_proto::{Envelope, StoreStatus};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::signaling::ExchangeApi;

/// Sleep for `duration`; returns `false` if `cancel` fired first.
pub(crate) async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(duration) => true,
    }
}

/// Write `envelope` until the exchange acknowledges it with `expected`.
///
/// Failed or unexpected writes are logged and retried after `interval`.
/// Returns `false` if cancelled first.
pub(crate) async fn store_until<E>(
    exchange: &E,
    envelope: &Envelope,
    expected: StoreStatus,
    interval: Duration,
    cancel: &CancellationToken,
    role: &'static str,
) -> bool
where
    E: ExchangeApi + ?Sized,
{
    let mut attempt: u32 = 0;
    while !cancel.is_cancelled() {
        attempt += 1;
        match exchange.store(envelope).await {
            Ok(status) if status == expected => {
                debug!(target = "cradle::polling", role, attempt, %status, "exchange acknowledged");
                return true;
            }
            Ok(status) => {
                warn!(target = "cradle::polling", role, attempt, %status, "unexpected exchange acknowledgement");
            }
            Err(err) => {
                warn!(target = "cradle::polling", role, attempt, error = %err, "exchange write failed");
            }
        }
        if !pause(interval, cancel).await {
            break;
        }
    }
    false
}
