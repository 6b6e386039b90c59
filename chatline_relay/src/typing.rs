// Client-side "is typing" indicator.
//
// The relay only forwards `TYPING <nick> <chatKey>` lines and keeps no
// state. The receiving client shows the indicator for `TYPING_WINDOW` after
// the most recent signal from that sender.
//
// Each sender has one deadline in a shared map. A new signal overwrites it
// under the lock, so a repeated signal restarts the window instead of
// stacking a second timer. A single worker thread waits with `recv_timeout`
// until the earliest deadline and removes expired entries under the same
// lock. A refreshed deadline therefore can never be expired early by a stale
// timer. Signals wake the worker through an `mpsc` channel so it can re-plan.
// Dropping the indicator closes the channel and joins the worker.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long an indicator stays up after the last signal.
pub const TYPING_WINDOW: Duration = Duration::from_secs(2);

/// Worker sleep when nobody is typing; any signal wakes it early.
const IDLE_WAIT: Duration = Duration::from_secs(60);

struct Typist {
    chat_key: String,
    deadline: Instant,
}

type Typists = Arc<Mutex<HashMap<String, Typist>>>;

pub struct TypingIndicator {
    window: Duration,
    typists: Typists,
    wake: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl TypingIndicator {
    pub fn new(window: Duration) -> Self {
        Self::with_expiry(window, |_| {})
    }

    /// Like `new`, calling `on_expire(sender)` from the worker thread each
    /// time a sender's indicator times out.
    pub fn with_expiry(window: Duration, on_expire: impl FnMut(&str) + Send + 'static) -> Self {
        let typists = Typists::default();
        let (wake, wake_rx) = mpsc::channel();
        let worker_typists = Arc::clone(&typists);
        let worker = thread::spawn(move || expiry_loop(&worker_typists, &wake_rx, on_expire));
        Self {
            window,
            typists,
            wake: Some(wake),
            worker: Some(worker),
        }
    }

    /// Show (or keep showing) `sender` as typing in `chat_key`, restarting
    /// its window.
    pub fn signal(&self, sender: &str, chat_key: &str) {
        lock(&self.typists).insert(
            sender.to_string(),
            Typist {
                chat_key: chat_key.to_string(),
                deadline: Instant::now() + self.window,
            },
        );
        if let Some(wake) = &self.wake {
            let _ = wake.send(());
        }
    }

    pub fn is_typing(&self, sender: &str) -> bool {
        let now = Instant::now();
        lock(&self.typists)
            .get(sender)
            .is_some_and(|t| t.deadline > now)
    }

    /// Senders currently shown as typing in `chat_key`, sorted.
    pub fn typing_users(&self, chat_key: &str) -> Vec<String> {
        let now = Instant::now();
        let mut users: Vec<String> = lock(&self.typists)
            .iter()
            .filter(|(_, t)| t.deadline > now && t.chat_key == chat_key)
            .map(|(name, _)| name.clone())
            .collect();
        users.sort();
        users
    }
}

impl Drop for TypingIndicator {
    fn drop(&mut self) {
        self.wake.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn lock(typists: &Typists) -> MutexGuard<'_, HashMap<String, Typist>> {
    typists.lock().unwrap_or_else(PoisonError::into_inner)
}

fn expiry_loop(typists: &Typists, wake: &Receiver<()>, mut on_expire: impl FnMut(&str)) {
    loop {
        let (expired, next_deadline) = take_expired(typists, Instant::now());
        for sender in &expired {
            on_expire(sender);
        }
        let wait = next_deadline.map_or(IDLE_WAIT, |deadline| {
            deadline.saturating_duration_since(Instant::now())
        });
        match wake.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Remove every entry whose deadline has passed. Returns the removed senders
/// and the earliest remaining deadline.
fn take_expired(typists: &Typists, now: Instant) -> (Vec<String>, Option<Instant>) {
    let mut map = lock(typists);
    let expired: Vec<String> = map
        .iter()
        .filter(|(_, t)| t.deadline <= now)
        .map(|(name, _)| name.clone())
        .collect();
    for sender in &expired {
        map.remove(sender);
    }
    let next_deadline = map.values().map(|t| t.deadline).min();
    (expired, next_deadline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_shows_indicator() {
        let indicator = TypingIndicator::new(Duration::from_secs(5));
        assert!(!indicator.is_typing("alice"));

        indicator.signal("alice", "All");
        assert!(indicator.is_typing("alice"));
        assert_eq!(indicator.typing_users("All"), vec!["alice"]);
        assert!(indicator.typing_users("bob").is_empty());
    }

    #[test]
    fn indicator_expires_after_window() {
        let (tx, rx) = mpsc::channel();
        let indicator = TypingIndicator::with_expiry(Duration::from_millis(100), move |sender| {
            let _ = tx.send(sender.to_string());
        });

        indicator.signal("bob", "All");
        let expired = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(expired, "bob");
        assert!(!indicator.is_typing("bob"));
        assert!(indicator.typing_users("All").is_empty());
    }

    #[test]
    fn repeated_signal_restarts_window_without_stacking() {
        let (tx, rx) = mpsc::channel();
        let indicator = TypingIndicator::with_expiry(Duration::from_millis(400), move |sender| {
            let _ = tx.send(sender.to_string());
        });

        indicator.signal("alice", "All");
        thread::sleep(Duration::from_millis(250));
        indicator.signal("alice", "All");
        thread::sleep(Duration::from_millis(250));

        // 500ms since the first signal, 250ms since the second.
        assert!(indicator.is_typing("alice"));
        assert!(rx.try_recv().is_err());

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "alice");
        thread::sleep(Duration::from_millis(500));
        assert!(rx.try_recv().is_err(), "expired more than once");
    }

    #[test]
    fn senders_expire_independently() {
        let indicator = TypingIndicator::new(Duration::from_millis(300));
        indicator.signal("alice", "All");
        thread::sleep(Duration::from_millis(200));
        indicator.signal("bob", "All");
        thread::sleep(Duration::from_millis(200));

        assert_eq!(indicator.typing_users("All"), vec!["bob"]);
    }

    #[test]
    fn resignal_moves_sender_to_new_chat_key() {
        let indicator = TypingIndicator::new(Duration::from_secs(5));
        indicator.signal("alice", "All");
        indicator.signal("alice", "bob");

        assert!(indicator.typing_users("All").is_empty());
        assert_eq!(indicator.typing_users("bob"), vec!["alice"]);
    }
}
