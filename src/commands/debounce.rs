// debounce.rs - Pending-update debouncer
// Editors and build tools emit several change events per logical edit. Each
// path gets one restartable timer; repeated events push its deadline back so
// the reload happens once, after the last edit.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A scheduled callback whose countdown can be restarted or cancelled
pub struct DebounceHandle {
    refresh: mpsc::UnboundedSender<Duration>,
    fired: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl DebounceHandle {
    /// Restart the countdown. Returns false once the timer has already fired.
    pub fn reschedule(&self, window: Duration) -> bool {
        !self.task.is_finished() && self.refresh.send(window).is_ok()
    }

    /// Stop the countdown. A callback that has already started runs to completion.
    pub fn cancel(&self) {
        if !self.fired.load(Ordering::SeqCst) {
            self.task.abort();
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Run `callback` after `window` unless rescheduled or cancelled first
pub fn schedule_after<F, Fut>(window: Duration, callback: F) -> DebounceHandle
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (refresh, mut refreshes) = mpsc::unbounded_channel::<Duration>();
    let fired = Arc::new(AtomicBool::new(false));
    let fired_flag = fired.clone();

    let task = tokio::spawn(async move {
        let sleep = tokio::time::sleep(window);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => break,
                next = refreshes.recv() => match next {
                    Some(window) => sleep.as_mut().reset(Instant::now() + window),
                    None => {
                        (&mut sleep).await;
                        break;
                    }
                },
            }
        }

        // Later refreshes must fail so the caller schedules a fresh timer.
        drop(refreshes);
        fired_flag.store(true, Ordering::SeqCst);
        callback().await;
    });

    DebounceHandle {
        refresh,
        fired,
        task,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    Created,
    Refreshed,
}

struct PendingUpdate {
    id: u64,
    handle: DebounceHandle,
}

/// `path -> timer` for updates that have been observed but not yet applied
#[derive(Default)]
pub struct PendingUpdates {
    timers: Mutex<HashMap<PathBuf, PendingUpdate>>,
    next_id: AtomicU64,
}

impl PendingUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh the live timer for `path`, or start one that calls `on_fire`
    /// with its id when the window elapses.
    pub async fn schedule<F, Fut>(&self, path: &Path, window: Duration, on_fire: F) -> Scheduled
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut timers = self.timers.lock().await;

        if let Some(pending) = timers.get(path) {
            if pending.handle.reschedule(window) {
                return Scheduled::Refreshed;
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = schedule_after(window, move || on_fire(id));
        timers.insert(path.to_path_buf(), PendingUpdate { id, handle });
        Scheduled::Created
    }

    /// Clear the entry for `path` if it still belongs to timer `id`
    pub async fn complete(&self, path: &Path, id: u64) {
        let mut timers = self.timers.lock().await;
        if timers.get(path).map(|pending| pending.id) == Some(id) {
            timers.remove(path);
        }
    }

    /// Cancel the countdowns for `path` and everything below it. Returns how
    /// many entries were dropped.
    pub async fn cancel(&self, path: &Path) -> usize {
        let mut timers = self.timers.lock().await;
        let doomed: Vec<PathBuf> = timers
            .keys()
            .filter(|pending| pending.starts_with(path))
            .cloned()
            .collect();
        for pending in &doomed {
            if let Some(update) = timers.remove(pending) {
                if update.handle.has_fired() {
                    log::debug!("[COMMANDS] Update for {} is already running", pending.display());
                }
                update.handle.cancel();
            }
        }
        doomed.len()
    }

    pub async fn cancel_all(&self) {
        for (_, pending) in self.timers.lock().await.drain() {
            pending.handle.cancel();
        }
    }

    pub async fn len(&self) -> usize {
        self.timers.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex as AsyncMutex;

    type FireLog = Arc<AsyncMutex<Vec<Instant>>>;

    fn recorder(log: &FireLog) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> {
        let log = log.clone();
        move || {
            Box::pin(async move {
                log.lock().await.push(Instant::now());
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_window() {
        let log: FireLog = Arc::default();
        let start = Instant::now();
        let handle = schedule_after(Duration::from_secs(4), recorder(&log));

        tokio::time::sleep(Duration::from_secs(5)).await;

        let fired = log.lock().await.clone();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0] - start, Duration::from_secs(4));
        assert!(handle.is_finished());
        assert!(!handle.reschedule(Duration::from_secs(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_restarts_the_countdown() {
        let log: FireLog = Arc::default();
        let start = Instant::now();
        let handle = schedule_after(Duration::from_secs(4), recorder(&log));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(handle.reschedule(Duration::from_secs(4)));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(log.lock().await.is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let fired = log.lock().await.clone();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0] - start, Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let log: FireLog = Arc::default();
        let handle = schedule_after(Duration::from_secs(1), recorder(&log));
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(log.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_updates_coalesce_per_path() {
        let pending = Arc::new(PendingUpdates::new());
        let fired: Arc<AsyncMutex<Vec<u64>>> = Arc::default();
        let path = Path::new("commands/ping.json");

        for _ in 0..3 {
            let fired = fired.clone();
            let done = pending.clone();
            pending
                .schedule(path, Duration::from_secs(4), move |id| async move {
                    done.complete(Path::new("commands/ping.json"), id).await;
                    fired.lock().await.push(id);
                })
                .await;
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        assert_eq!(pending.len().await, 1);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(fired.lock().await.len(), 1);
        assert_eq!(pending.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fired_entry_is_replaced_by_a_fresh_timer() {
        let pending = PendingUpdates::new();
        let path = Path::new("commands/echo.json");

        let first = pending
            .schedule(path, Duration::from_secs(1), |_| async {})
            .await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        let second = pending
            .schedule(path, Duration::from_secs(1), |_| async {})
            .await;

        assert_eq!(first, Scheduled::Created);
        assert_eq!(second, Scheduled::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_removes_the_entry() {
        let pending = PendingUpdates::new();
        let path = Path::new("commands/help.json");
        pending
            .schedule(path, Duration::from_secs(1), |_| async {})
            .await;

        assert_eq!(pending.cancel(path).await, 1);
        assert_eq!(pending.cancel(path).await, 0);
        assert_eq!(pending.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_covers_a_whole_directory() {
        let pending = PendingUpdates::new();
        for path in ["commands/music/play.json", "commands/music/skip.json", "commands/ping.json"] {
            pending
                .schedule(Path::new(path), Duration::from_secs(1), |_| async {})
                .await;
        }

        assert_eq!(pending.cancel(Path::new("commands/music")).await, 2);
        assert_eq!(pending.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_does_not_interrupt_a_running_callback() {
        let release = Arc::new(tokio::sync::Notify::new());
        let finished = Arc::new(AtomicBool::new(false));
        let handle = {
            let release = release.clone();
            let finished = finished.clone();
            schedule_after(Duration::from_secs(1), move || async move {
                release.notified().await;
                finished.store(true, Ordering::SeqCst);
            })
        };

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(handle.has_fired());
        handle.cancel();
        release.notify_one();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(finished.load(Ordering::SeqCst));
        assert!(handle.is_finished());
    }
}
