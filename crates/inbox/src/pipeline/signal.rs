use crate::pipeline::Pipeline;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Work requests delivered to [`Pipeline::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSignal {
    /// A file in the vault was created or modified.
    Touched(PathBuf),
    /// Scan the whole inbox.
    Scan,
}

impl Pipeline {
    /// Handles signals until the channel closes, then waits for every run it
    /// started to finish.
    ///
    /// Each signal is handled on its own task; the in-flight guard and the
    /// per-identity locks inside [`process_file`](Self::process_file) keep
    /// overlapping signals and scans safe.
    pub async fn run(self: Arc<Self>, mut signals: mpsc::Receiver<FileSignal>) {
        let mut tasks = JoinSet::new();
        while let Some(signal) = signals.recv().await {
            let pipeline = self.clone();
            match signal {
                FileSignal::Touched(path) => {
                    tasks.spawn(async move {
                        let outcome = pipeline.on_file_touched(&path).await;
                        tracing::trace!(?outcome, "Handled touched file");
                    });
                },
                FileSignal::Scan => {
                    tasks.spawn(async move {
                        pipeline.scan_all().await;
                    });
                },
            }
            // Reap whatever has finished so the set does not grow unbounded.
            while let Some(result) = tasks.try_join_next() {
                if let Err(err) = result {
                    tracing::error!(error = %err, "Pipeline task panicked");
                }
            }
        }
        tracing::debug!(pending = tasks.len(), "Signal channel closed; draining");
        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                tracing::error!(error = %err, "Pipeline task panicked");
            }
        }
    }
}
