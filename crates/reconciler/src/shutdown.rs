//! Shutdown signalling shared by the long-running loops.

use tokio::sync::watch;

/// Receiving half of the shutdown channel. `true` means stop.
pub type ShutdownSignal = watch::Receiver<bool>;

/// Create a shutdown channel in the running state.
pub fn channel() -> (watch::Sender<bool>, ShutdownSignal) {
    watch::channel(false)
}

/// Whether shutdown has been requested.
pub fn is_requested(signal: &ShutdownSignal) -> bool {
    *signal.borrow()
}

/// Resolve once shutdown is requested or the sender is gone.
pub async fn requested(signal: &mut ShutdownSignal) {
    loop {
        if *signal.borrow_and_update() {
            return;
        }
        if signal.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep for `duration` unless shutdown is requested first. Returns false if
/// interrupted.
pub async fn sleep_or_shutdown(duration: std::time::Duration, signal: &ShutdownSignal) -> bool {
    let mut signal = signal.clone();
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = requested(&mut signal) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_shutdown() {
        let (tx, rx) = channel();
        assert!(sleep_or_shutdown(Duration::from_secs(1), &rx).await);

        tx.send(true).unwrap();
        assert!(is_requested(&rx));
        assert!(!sleep_or_shutdown(Duration::from_secs(3600), &rx).await);
    }

    #[tokio::test]
    async fn test_dropped_sender_counts_as_shutdown() {
        let (tx, mut rx) = channel();
        drop(tx);
        requested(&mut rx).await;
    }
}
