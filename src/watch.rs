//! Filesystem events to pipeline signals.
//!
//! `notify` delivers raw events on its own thread. They are funnelled into an
//! unbounded channel and debounced here: a path is forwarded as
//! [`FileSignal::Touched`] once it has been quiet for the settle delay, so a
//! file that is still being written is not picked up half-way. Manifests due
//! in the same tick are sent before other files.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use larder_inbox::FileSignal;
use larder_inbox::job::is_manifest;
use larder_storage::backend::LocalBackend;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Paths waiting to settle, with the time each was last touched.
#[derive(Debug, Default)]
pub struct Debouncer {
    pending: HashMap<PathBuf, Instant>,
    settle: Duration,
}
impl Debouncer {
    pub fn new(settle: Duration) -> Self {
        Self { pending: HashMap::new(), settle }
    }

    pub fn touch(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path, now);
    }

    /// When the next path settles, if any are pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().map(|touched| *touched + self.settle)
    }

    /// Removes and returns every settled path, manifests first, each group in
    /// path order.
    pub fn drain_due(&mut self, now: Instant) -> Vec<PathBuf> {
        let settle = self.settle;
        let mut due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, touched)| **touched + settle <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &due {
            self.pending.remove(path);
        }
        due.sort_by(|a, b| is_manifest(b).cmp(&is_manifest(a)).then_with(|| a.cmp(b)));
        due
    }
}

fn is_change(event: &Event) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any)
}

/// Watches the vault until Ctrl-C, forwarding settled paths and periodic scan
/// requests to `signals`. Dropping `signals` on return lets the pipeline
/// drain.
pub async fn forward(
    backend: Arc<LocalBackend>,
    settle: Duration,
    interval: Option<Duration>,
    signals: mpsc::Sender<FileSignal>,
) -> Result<()> {
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
        let _ = events_tx.send(event);
    })
    .or_raise(|| ErrorKind::Watch)?;
    watcher.watch(backend.root(), RecursiveMode::Recursive).or_raise(|| ErrorKind::Watch)?;
    tracing::info!(root = %backend.root().display(), "Watching for captures");

    let mut debouncer = Debouncer::new(settle);
    let mut scans = interval.map(|period| {
        let mut scans = tokio::time::interval_at(Instant::now() + period, period);
        scans.set_missed_tick_behavior(MissedTickBehavior::Skip);
        scans
    });
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let deadline = debouncer.next_deadline();
        tokio::select! {
            event = events.recv() => match event {
                Some(Ok(event)) if is_change(&event) => {
                    let now = Instant::now();
                    for path in event.paths.iter().filter(|path| path.is_file()) {
                        if let Ok(relative) = backend.relative_path(path) {
                            debouncer.touch(relative, now);
                        }
                    }
                },
                Some(Ok(_)) => {},
                Some(Err(err)) => tracing::warn!(error = %err, "Watcher error"),
                None => break,
            },
            () = sleep_until(deadline) => {
                for path in debouncer.drain_due(Instant::now()) {
                    if signals.send(FileSignal::Touched(path)).await.is_err() {
                        return Ok(());
                    }
                }
            },
            () = tick(&mut scans) => {
                tracing::debug!("Periodic scan");
                if signals.send(FileSignal::Scan).await.is_err() {
                    return Ok(());
                }
            },
            result = &mut shutdown => {
                if let Err(err) = result {
                    tracing::error!(error = %err, "Could not listen for Ctrl-C");
                }
                tracing::info!("Shutting down; waiting for jobs in flight");
                break;
            },
        }
    }
    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick(scans: &mut Option<Interval>) {
    match scans {
        Some(scans) => {
            scans.tick().await;
        },
        None => std::future::pending().await,
    }
}
