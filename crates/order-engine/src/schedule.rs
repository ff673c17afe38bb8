//! Cancellable waits on the shutdown channel.

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

/// Sleep until `deadline` unless shutdown is signalled first.
///
/// Returns `true` if the deadline was reached, `false` on shutdown. A
/// dropped sender means shutdown can no longer be requested, so the wait
/// simply runs to the deadline.
pub(crate) async fn pause_until(deadline: Instant, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    let sleep = sleep_until(deadline);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => match changed {
                Ok(()) if *shutdown.borrow() => return false,
                Ok(()) => {}
                Err(_) => {
                    sleep.as_mut().await;
                    return true;
                }
            },
            _ = sleep.as_mut() => return true,
        }
    }
}

pub(crate) fn is_shutdown(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}
