use crate::error::{ErrorKind as InboxErrorKind, Result as InboxResult};
use crate::job::is_manifest;
use crate::pipeline::{Outcome, Pipeline};
use async_stream::stream;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use std::path::PathBuf;

/// Progress events emitted by [`Pipeline::scan`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started): exactly once.
/// 2. [`DiscoveryComplete`](Self::DiscoveryComplete): exactly once, with the
///    number of candidate files found.
/// 3. [`Processed`](Self::Processed): once per candidate file.
/// 4. [`Complete`](Self::Complete): exactly once.
///
/// Listing errors are yielded as `Err` items in between without ending the
/// stream; the files that could be listed are still processed.
#[derive(Debug)]
pub enum ScanEvent {
    Started,
    DiscoveryComplete(u64),
    Processed(Outcome),
    Complete,
}

/// Tally of a finished scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub discovered: u64,
    pub created: u64,
    pub duplicates: u64,
    pub quarantined: u64,
    pub busy: u64,
    pub vanished: u64,
    pub ignored: u64,
    /// Listing errors; the files behind them were not seen.
    pub errors: u64,
}
impl ScanSummary {
    pub fn record(&mut self, outcome: &Outcome) {
        let counter = match outcome {
            Outcome::Ignored(_) => &mut self.ignored,
            Outcome::Busy(_) => &mut self.busy,
            Outcome::Vanished(_) => &mut self.vanished,
            Outcome::Created { .. } => &mut self.created,
            Outcome::Duplicate { .. } => &mut self.duplicates,
            Outcome::Quarantined { .. } => &mut self.quarantined,
        };
        *counter += 1;
    }

    /// Files that reached a terminal outcome during this scan.
    pub fn processed(&self) -> u64 {
        self.created + self.duplicates + self.quarantined
    }
}

impl Pipeline {
    /// Streams [`ScanEvent`]s for every candidate file in the inbox.
    ///
    /// Manifests go first, and all of them finish before any other file
    /// starts: an image manifest archives its sibling, which must not be
    /// picked up as a job of its own. Within each group files run
    /// concurrently, at most [`Settings::concurrency`](super::Settings) at a
    /// time, in path order.
    pub fn scan(&self) -> impl Stream<Item = InboxResult<ScanEvent>> + Send + '_ {
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            yield Ok(ScanEvent::Started);

            let mut manifests = Vec::new();
            let mut others = Vec::new();
            let mut listing = self.backend.list_stream(Some(self.settings.inbox.as_path()));
            while let Some(entry) = listing.next().await {
                match entry {
                    Ok(file) if !self.is_candidate(&file.path) => {},
                    Ok(file) if is_manifest(&file.path) => manifests.push(file.path),
                    Ok(file) => others.push(file.path),
                    Err(err) => yield Err(err.raise(InboxErrorKind::Scan)),
                }
            }
            manifests.sort();
            others.sort();
            // Infallible: a usize (either 32- or 64-bit) will always fit in a u64.
            yield Ok(ScanEvent::DiscoveryComplete(u64::try_from(manifests.len() + others.len()).unwrap_or(0)));

            for group in [manifests, others] {
                let mut pending = group.into_iter();
                let mut processing = FuturesUnordered::new();
                processing.extend(pending.by_ref().take(self.settings.concurrency).map(|path| self.process_owned(path)));
                while let Some(outcome) = processing.next().await {
                    yield Ok(ScanEvent::Processed(outcome));
                    if let Some(path) = pending.next() {
                        processing.push(self.process_owned(path));
                    }
                }
            }

            yield Ok(ScanEvent::Complete);
        })
    }

    /// Runs a full scan to completion. Never fails: listing errors are
    /// logged and counted.
    pub async fn scan_all(&self) -> ScanSummary {
        let mut summary = ScanSummary::default();
        let mut events = std::pin::pin!(self.scan());
        while let Some(event) = events.next().await {
            match event {
                Ok(ScanEvent::Started) => tracing::debug!(inbox = %self.settings.inbox.display(), "Scan started"),
                Ok(ScanEvent::DiscoveryComplete(found)) => summary.discovered = found,
                Ok(ScanEvent::Processed(outcome)) => summary.record(&outcome),
                Ok(ScanEvent::Complete) => {},
                Err(err) => {
                    tracing::error!(error = ?err, "Could not list part of the inbox");
                    summary.errors += 1;
                },
            }
        }
        tracing::info!(
            discovered = summary.discovered,
            created = summary.created,
            duplicates = summary.duplicates,
            quarantined = summary.quarantined,
            "Scan complete"
        );
        summary
    }

    async fn process_owned(&self, path: PathBuf) -> Outcome {
        self.process_file(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_terminal_outcomes() {
        let mut summary = ScanSummary::default();
        summary.record(&Outcome::Created { source: "Inbox/a.txt".into(), output: "Recipes/a.md".into() });
        summary.record(&Outcome::Duplicate { source: "Inbox/b.txt".into(), archived: None });
        summary.record(&Outcome::Busy("Inbox/c.txt".into()));
        summary.record(&Outcome::Quarantined { source: "Inbox/d.txt".into(), archived: None, reason: "x".into() });
        assert_eq!(summary.processed(), 3);
        assert_eq!(summary.busy, 1);
    }
}
