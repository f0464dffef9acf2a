//! Run completion notification.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Final report of a run, delivered once to every listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: u64,

    /// Whether every target rendered and was finalized.
    pub success: bool,

    /// Human-readable failure reason.
    pub error: Option<String>,

    /// Display names of the targets that rendered successfully.
    pub completed_targets: Vec<String>,

    /// Run start time (ISO 8601).
    pub started_at: String,

    /// Run end time (ISO 8601).
    pub finished_at: String,
}

/// Listener callback for finished runs.
pub type FinishedCallback = Arc<dyn Fn(&RunOutcome) + Send + Sync>;

/// Handle for removing a registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

const CHANNEL_CAPACITY: usize = 16;

/// One-shot-per-run broadcaster of [`RunOutcome`]s.
///
/// The renderer arms the notifier with a run's id when the run starts;
/// `notify` delivers only for an armed id and disarms it, so each run
/// produces at most one delivery no matter how many times notification
/// is attempted. Several ids may be armed at once: arming a new run
/// never cancels the pending delivery of an earlier one.
pub struct CompletionNotifier {
    inner: Mutex<NotifierState>,
    channel: broadcast::Sender<RunOutcome>,
}

struct NotifierState {
    listeners: Vec<(ListenerId, FinishedCallback)>,
    next_listener: u64,
    armed_runs: BTreeSet<u64>,
}

impl CompletionNotifier {
    pub fn new() -> Self {
        let (channel, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(NotifierState {
                listeners: vec![],
                next_listener: 0,
                armed_runs: BTreeSet::new(),
            }),
            channel,
        }
    }

    /// Register a callback invoked with every future outcome.
    pub fn on_finished<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&RunOutcome) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        let id = ListenerId(state.next_listener);
        state.next_listener += 1;
        state.listeners.push((id, Arc::new(callback)));
        id
    }

    /// Unregister a callback. Returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(listener, _)| *listener != id);
        state.listeners.len() != before
    }

    /// Receive outcomes asynchronously.
    pub fn subscribe(&self) -> broadcast::Receiver<RunOutcome> {
        self.channel.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len() + self.channel.receiver_count()
    }

    /// Allow one delivery for `run_id`.
    pub fn arm(&self, run_id: u64) {
        self.lock().armed_runs.insert(run_id);
    }

    pub fn is_armed(&self, run_id: u64) -> bool {
        self.lock().armed_runs.contains(&run_id)
    }

    /// Deliver `outcome` if its run is armed. Returns whether it was
    /// delivered.
    pub fn notify(&self, outcome: &RunOutcome) -> bool {
        let listeners: Vec<FinishedCallback> = {
            let mut state = self.lock();
            if !state.armed_runs.remove(&outcome.run_id) {
                tracing::warn!(
                    run_id = outcome.run_id,
                    "Dropping completion for a run that is not armed"
                );
                return false;
            }
            state.listeners.iter().map(|(_, cb)| cb.clone()).collect()
        };

        // Callbacks run without the lock so they may register listeners.
        for listener in listeners {
            listener(outcome);
        }
        // No receivers is not an error.
        let _ = self.channel.send(outcome.clone());
        true
    }

    fn lock(&self) -> MutexGuard<'_, NotifierState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CompletionNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompletionNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (listeners, armed_runs) = {
            let state = self.lock();
            (state.listeners.len(), state.armed_runs.clone())
        };
        f.debug_struct("CompletionNotifier")
            .field("listeners", &listeners)
            .field("armed_runs", &armed_runs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn outcome(run_id: u64, success: bool) -> RunOutcome {
        RunOutcome {
            run_id,
            success,
            error: None,
            completed_targets: vec![],
            started_at: String::new(),
            finished_at: String::new(),
        }
    }

    #[test]
    fn test_delivers_once_per_armed_run() {
        let notifier = CompletionNotifier::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        notifier.on_finished(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!notifier.notify(&outcome(1, true)));
        notifier.arm(1);
        assert!(notifier.notify(&outcome(1, true)));
        assert!(!notifier.notify(&outcome(1, false)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_arming_a_new_run_keeps_the_pending_one() {
        let notifier = CompletionNotifier::new();
        let delivered = Arc::new(Mutex::new(vec![]));
        let seen = delivered.clone();
        notifier.on_finished(move |o| seen.lock().unwrap().push(o.run_id));

        notifier.arm(1);
        notifier.arm(2);
        assert!(notifier.notify(&outcome(1, true)));
        assert!(notifier.is_armed(2));
        assert!(notifier.notify(&outcome(2, false)));
        assert!(!notifier.notify(&outcome(1, true)));

        assert_eq!(*delivered.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_every_listener_receives_the_outcome() {
        let notifier = CompletionNotifier::new();
        let seen = Arc::new(Mutex::new(vec![]));
        for tag in ["a", "b"] {
            let seen = seen.clone();
            notifier.on_finished(move |o| seen.lock().unwrap().push((tag, o.success)));
        }

        notifier.arm(3);
        notifier.notify(&outcome(3, false));

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec![("a", false), ("b", false)]);
    }

    #[test]
    fn test_removed_listener_is_not_called() {
        let notifier = CompletionNotifier::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let id = notifier.on_finished(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(notifier.remove_listener(id));
        assert!(!notifier.remove_listener(id));
        notifier.arm(1);
        notifier.notify(&outcome(1, true));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_outcome() {
        let notifier = CompletionNotifier::new();
        let mut rx = notifier.subscribe();

        notifier.arm(9);
        notifier.notify(&outcome(9, true));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.run_id, 9);
        assert!(received.success);
    }
}
