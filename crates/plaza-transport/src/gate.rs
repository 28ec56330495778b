use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use plaza_core::{PlazaError, PlazaResult, TokenPair};
use tokio::sync::oneshot;
use tracing::debug;

/// Outcome delivered to suspended waiters: the fresh access token, or
/// the refresh failure rendered as a message.
type Settled = Result<String, String>;

#[derive(Debug, Default)]
struct GateState {
    refreshing: bool,
    waiters: VecDeque<oneshot::Sender<Settled>>,
}

/// Single-flight coordinator for credential refresh.
///
/// At most one refresh call is in flight per gate. The first caller to
/// arrive while the gate is idle becomes the winner and runs the
/// refresh; everyone else suspends on a queue and is woken with the
/// outcome, in arrival order, once the refresh settles. The in-flight
/// flag clears as the final step of either outcome, so the next 401
/// can start a fresh cycle.
///
/// Cancellation-safe: a winner whose future is dropped mid-refresh
/// (a caller-side timeout or `select!` arm losing) reopens the gate on
/// the way out and releases every parked waiter to contend again, so
/// one of them becomes the next winner instead of the queue hanging
/// forever.
///
/// One gate is owned per [`ApiClient`](crate::ApiClient), never stored
/// in module-level state, so tests can run independent gates side by
/// side.
#[derive(Debug, Default)]
pub struct RefreshGate {
    // Sync mutex: the critical sections are short, never held across
    // an await, and the claim guard must reach the state from `Drop`.
    state: Mutex<GateState>,
}

impl RefreshGate {
    /// Idle gate with no waiters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh access token, running `refresh` only if no
    /// refresh is already in flight.
    ///
    /// The closure is invoked solely by the winning caller; losers
    /// never build their future. A refresh failure rejects every
    /// waiter with [`PlazaError::AuthExpired`] carrying the winner's
    /// error message.
    pub async fn acquire<F, Fut>(&self, refresh: F) -> PlazaResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PlazaResult<TokenPair>>,
    {
        loop {
            let rx = {
                let mut state = self.lock_state();
                if !state.refreshing {
                    state.refreshing = true;
                    break;
                }
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                rx
            };
            debug!("suspending on in-flight credential refresh");
            match rx.await {
                Ok(Ok(token)) => return Ok(token),
                Ok(Err(message)) => return Err(PlazaError::AuthExpired(message)),
                // The winner was cancelled before settling; contend
                // for the reopened gate.
                Err(_) => continue,
            }
        }

        let claim = RefreshClaim {
            gate: self,
            settled: false,
        };
        let outcome = refresh().await;
        let settled: Settled = match &outcome {
            Ok(pair) => Ok(pair.access_token.clone()),
            Err(err) => Err(err.to_string()),
        };
        claim.settle(settled);
        outcome.map(|pair| pair.access_token)
    }

    /// Locks the state, recovering it if a panicking holder left the
    /// mutex poisoned.
    fn lock_state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn waiting(&self) -> usize {
        self.lock_state().waiters.len()
    }
}

/// Held by the winning caller while its refresh future runs.
///
/// Settling wakes the queue in FIFO order and reopens the gate.
/// Dropping the claim unsettled means the winner was cancelled
/// mid-refresh: the gate reopens and the queued senders are dropped,
/// which wakes every parked waiter to contend again.
struct RefreshClaim<'a> {
    gate: &'a RefreshGate,
    settled: bool,
}

impl RefreshClaim<'_> {
    fn settle(mut self, settled: Settled) {
        let mut state = self.gate.lock_state();
        let woken = state.waiters.len();
        while let Some(waiter) = state.waiters.pop_front() {
            // A waiter whose request was dropped mid-wait is fine to skip.
            let _ = waiter.send(settled.clone());
        }
        state.refreshing = false;
        drop(state);
        self.settled = true;

        if woken > 0 {
            debug!(waiters = woken, "credential refresh settled, queue drained");
        }
    }
}

impl Drop for RefreshClaim<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.gate.lock_state();
        let released = state.waiters.len();
        state.waiters.clear();
        state.refreshing = false;
        drop(state);
        if released > 0 {
            debug!(
                waiters = released,
                "refresh abandoned mid-flight, waiters released"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn lone_caller_runs_refresh_and_gets_token() {
        let gate = RefreshGate::new();
        let token = gate
            .acquire(|| async { Ok(TokenPair::access_only("fresh")) })
            .await
            .unwrap();
        assert_eq!(token, "fresh");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh_in_fifo_order() {
        let gate = Arc::new(RefreshGate::new());
        let refreshes = Arc::new(AtomicUsize::new(0));
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();

        let winner = tokio::spawn({
            let gate = Arc::clone(&gate);
            let refreshes = Arc::clone(&refreshes);
            async move {
                gate.acquire(move || async move {
                    refreshes.fetch_add(1, Ordering::SeqCst);
                    let _ = entered_tx.send(());
                    // Hold the gate until the test has queued waiters.
                    let _ = release_rx.await;
                    Ok(TokenPair::access_only("fresh"))
                })
                .await
            }
        });
        entered_rx.await.unwrap();

        let resolved = Arc::new(Mutex::new(Vec::new()));
        let mut waiters = Vec::new();
        for idx in 0..4_usize {
            let handle = tokio::spawn({
                let gate = Arc::clone(&gate);
                let refreshes = Arc::clone(&refreshes);
                let resolved = Arc::clone(&resolved);
                async move {
                    let token = gate
                        .acquire(|| async move {
                            refreshes.fetch_add(1, Ordering::SeqCst);
                            Ok(TokenPair::access_only("stray"))
                        })
                        .await
                        .unwrap();
                    resolved.lock().unwrap().push(idx);
                    token
                }
            });
            // Wait until this caller is queued before spawning the next,
            // so arrival order is deterministic.
            while gate.waiting() < idx + 1 {
                tokio::task::yield_now().await;
            }
            waiters.push(handle);
        }

        release_tx.send(()).unwrap();
        assert_eq!(winner.await.unwrap().unwrap(), "fresh");
        for handle in waiters {
            assert_eq!(handle.await.unwrap(), "fresh");
        }
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(*resolved.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn failed_refresh_rejects_waiters_and_reopens_gate() {
        let gate = Arc::new(RefreshGate::new());
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();

        let winner = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move {
                gate.acquire(move || async move {
                    let _ = entered_tx.send(());
                    let _ = release_rx.await;
                    Err::<TokenPair, _>(PlazaError::AuthExpired(
                        "refresh rejected with status 401".to_owned(),
                    ))
                })
                .await
            }
        });
        entered_rx.await.unwrap();

        let waiter = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move {
                gate.acquire(|| async { Ok(TokenPair::access_only("unused")) })
                    .await
            }
        });
        while gate.waiting() < 1 {
            tokio::task::yield_now().await;
        }

        release_tx.send(()).unwrap();
        assert!(matches!(
            winner.await.unwrap(),
            Err(PlazaError::AuthExpired(_))
        ));
        let err = waiter.await.unwrap().unwrap_err();
        match err {
            PlazaError::AuthExpired(message) => {
                assert!(message.contains("refresh rejected with status 401"));
            }
            other => panic!("expected AuthExpired, got {other:?}"),
        }

        // The flag cleared, so a later caller runs its own refresh.
        let token = gate
            .acquire(|| async { Ok(TokenPair::access_only("second")) })
            .await
            .unwrap();
        assert_eq!(token, "second");
    }

    #[tokio::test]
    async fn cancelled_winner_reopens_gate_and_promotes_a_waiter() {
        let gate = Arc::new(RefreshGate::new());
        let (entered_tx, entered_rx) = oneshot::channel();

        let winner = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move {
                gate.acquire(move || async move {
                    let _ = entered_tx.send(());
                    // A refresh that never settles on its own, so only
                    // cancellation can end it.
                    std::future::pending::<PlazaResult<TokenPair>>().await
                })
                .await
            }
        });
        entered_rx.await.unwrap();

        let waiter = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move {
                gate.acquire(|| async { Ok(TokenPair::access_only("recovered")) })
                    .await
            }
        });
        while gate.waiting() < 1 {
            tokio::task::yield_now().await;
        }

        winner.abort();
        assert!(winner.await.unwrap_err().is_cancelled());

        // The parked caller wakes, claims the reopened gate, and runs
        // its own refresh instead of hanging on the abandoned one.
        let token = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("gate reopened after the cancelled refresh")
            .unwrap()
            .unwrap();
        assert_eq!(token, "recovered");
        assert_eq!(gate.waiting(), 0);

        let direct = gate
            .acquire(|| async { Ok(TokenPair::access_only("after")) })
            .await
            .unwrap();
        assert_eq!(direct, "after");
    }

    #[tokio::test]
    async fn sequential_acquires_each_run_their_own_refresh() {
        let gate = RefreshGate::new();
        let refreshes = AtomicUsize::new(0);
        for _ in 0..3 {
            let token = gate
                .acquire(|| async {
                    refreshes.fetch_add(1, Ordering::SeqCst);
                    Ok(TokenPair::access_only("t"))
                })
                .await
                .unwrap();
            assert_eq!(token, "t");
        }
        assert_eq!(refreshes.load(Ordering::SeqCst), 3);
    }
}
