//! Run orchestration: event sequencing, collection workers, progress
//!
//! One [`EventAggregator`] pairs a tracker with a sink partition and sequences
//! the per-event begin/end boundaries. The run harness gives each worker
//! thread its own pair, splits the event range into contiguous chunks, and
//! performs a terminal blocking merge of the partitions once every worker has
//! finished. A shared atomic counter feeds a progress reporter that polls on
//! a timer and stops when the expected total is reached.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::{RunSummary, SimulationSettings};
use crate::provenance::ProvenanceTracker;
use crate::sink::RecordSink;
use crate::{Error, Result};

/// Sequences per-event boundaries for one tracker/sink pair.
///
/// No two events may be open concurrently on the same pair; parallel
/// collection uses one aggregator per worker, each writing to its own sink
/// partition.
#[derive(Debug)]
pub struct EventAggregator {
    tracker: ProvenanceTracker,
    sink: RecordSink,
}

impl EventAggregator {
    /// Create an aggregator with a fresh tracker and sink partition.
    #[must_use]
    pub fn new(omit_neutrons: bool, seed: u64) -> Self {
        Self {
            tracker: ProvenanceTracker::new(omit_neutrons, seed),
            sink: RecordSink::new(),
        }
    }

    /// Open an event on the sink.
    pub fn on_event_begin(&mut self, event_id: u32) {
        self.sink.begin_event(event_id);
    }

    /// Persist the buffered records of the open event and reset the tracker.
    ///
    /// # Panics
    /// Panics if no event is open, or if the tracker still holds an
    /// unterminated track (broken callback sequence).
    pub fn on_event_end(&mut self) {
        self.sink.flush_event();
        self.tracker.reset();
    }

    /// The tracker, for the engine adapter's per-track/per-step callbacks.
    pub fn tracker_mut(&mut self) -> &mut ProvenanceTracker {
        &mut self.tracker
    }

    /// The sink partition.
    pub fn sink_mut(&mut self) -> &mut RecordSink {
        &mut self.sink
    }

    /// Split into tracker and sink for callback code that needs both.
    pub fn parts_mut(&mut self) -> (&mut ProvenanceTracker, &mut RecordSink) {
        (&mut self.tracker, &mut self.sink)
    }

    /// Finish collection, yielding the sink partition.
    #[must_use]
    pub fn into_sink(self) -> RecordSink {
        self.sink
    }
}

/// Shared "events processed so far" counter.
#[derive(Debug, Clone, Default)]
pub struct ProgressCounter(Arc<AtomicU64>);

impl ProgressCounter {
    /// Create a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one processed event.
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Events processed so far.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Spawn the progress reporter: polls `counter` every `interval`, logs
/// throughput and a time-remaining estimate, and terminates cooperatively
/// once `expected_total` events are processed.
#[must_use]
pub fn spawn_progress_reporter(
    counter: ProgressCounter,
    expected_total: u64,
    interval: Duration,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let begin = Instant::now();
        let mut last_check = Instant::now();
        let mut last_count = 0_u64;

        loop {
            let processed = counter.get();
            if processed >= expected_total {
                break;
            }
            thread::sleep(interval);

            let now = Instant::now();
            let processed = counter.get();
            let delta = processed.saturating_sub(last_count);
            let rate = delta as f64 / now.duration_since(last_check).as_secs_f64();
            last_check = now;
            last_count = processed;

            let remaining_s = if rate > 0.0 {
                (expected_total.saturating_sub(processed)) as f64 / rate
            } else {
                f64::INFINITY
            };
            info!(
                processed,
                expected_total,
                elapsed_s = begin.elapsed().as_secs_f64(),
                events_per_s = rate,
                remaining_s,
                "collection progress"
            );
        }
        info!(
            expected_total,
            elapsed_s = begin.elapsed().as_secs_f64(),
            "collection finished"
        );
    })
}

/// Worker harness shared by the in-memory and persisted collection paths.
///
/// Splits the event range into contiguous chunks, runs one worker per chunk
/// (tracker + sink partition seeded from `settings.seed + worker index`), and
/// passes each finished partition through `finish` on its own worker thread.
/// The returned vector is in worker order.
fn run_workers<F, T>(
    settings: &SimulationSettings,
    simulate_event: F,
    finish: impl Fn(usize, RecordSink) -> Result<T> + Sync,
) -> Result<Vec<T>>
where
    F: Fn(u32, &mut ProvenanceTracker, &mut RecordSink) + Sync,
    T: Send,
{
    if settings.n_events == 0 {
        return Err(Error::Config("n_events must be positive".to_string()));
    }
    if settings.n_workers == 0 {
        return Err(Error::Config("n_workers must be positive".to_string()));
    }
    // event ids are stored as u32 columns
    if settings.n_events > u64::from(u32::MAX) {
        return Err(Error::Config(format!(
            "n_events {} exceeds the event-id range",
            settings.n_events
        )));
    }

    let n_events = settings.n_events;
    let n_workers = settings.n_workers.min(n_events as usize);
    let chunk = n_events.div_ceil(n_workers as u64);

    info!(n_events, n_workers, "starting collection");

    let counter = ProgressCounter::new();
    let reporter = spawn_progress_reporter(counter.clone(), n_events, Duration::from_secs(2));

    let simulate_event = &simulate_event;
    let finish = &finish;
    let results: Vec<Result<T>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..n_workers)
            .map(|w| {
                let begin = w as u64 * chunk;
                let end = ((w as u64 + 1) * chunk).min(n_events);
                let counter = counter.clone();
                scope.spawn(move || -> Result<T> {
                    let mut aggregator =
                        EventAggregator::new(settings.omit_neutrons, settings.seed + w as u64);
                    for event_id in begin..end {
                        aggregator.on_event_begin(event_id as u32);
                        let (tracker, sink) = aggregator.parts_mut();
                        simulate_event(event_id as u32, tracker, sink);
                        aggregator.on_event_end();
                        counter.increment();
                    }
                    finish(w, aggregator.into_sink())
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("collection worker panicked"))
            .collect()
    });

    reporter.join().expect("progress reporter panicked");

    results.into_iter().collect()
}

/// Run the collection with one worker per logical thread, merging the worker
/// partitions in memory.
///
/// The event range `0..settings.n_events` is split into contiguous chunks,
/// one per worker. Each worker owns an [`EventAggregator`] (tracker + sink
/// partition seeded from `settings.seed + worker index`) and drives
/// `simulate_event` for every event in its chunk between the begin/end
/// boundaries. Partitions are merged in worker order once all workers have
/// finished, so event ids stay concatenated, never interleaved.
///
/// `simulate_event` plays the transport engine's role: it receives the event
/// id and the worker's tracker/sink pair and is expected to issue the
/// per-track and per-step callbacks.
///
/// # Errors
/// Returns a configuration error for a zero-event or zero-worker run, or when
/// `n_events` exceeds the u32 event-id range.
///
/// # Panics
/// Panics if a worker thread panics (invariant violations abort the run).
pub fn run_collection<F>(settings: &SimulationSettings, simulate_event: F) -> Result<RecordSink>
where
    F: Fn(u32, &mut ProvenanceTracker, &mut RecordSink) + Sync,
{
    let partitions = run_workers(settings, simulate_event, |_, sink| Ok(sink))?;
    Ok(RecordSink::merge(partitions))
}

/// Run the collection with per-worker Parquet partitions on disk.
///
/// Like [`run_collection`], but each worker persists its sink partition as
/// `<stem>_t<worker>.*.parquet` before exiting, and the collator rebuilds the
/// merged sink from the persisted partitions. Worker output therefore
/// survives a crash of the merge phase, and partitions can be inspected (or
/// re-merged) independently of the run that produced them.
///
/// # Errors
/// Returns a configuration error for a zero-event or zero-worker run or an
/// out-of-range `n_events`, and a storage/IO error if a partition cannot be
/// written or read back.
///
/// # Panics
/// Panics if a worker thread panics (invariant violations abort the run).
pub fn run_collection_persisted<F, P: AsRef<Path>>(
    settings: &SimulationSettings,
    stem: P,
    simulate_event: F,
) -> Result<RecordSink>
where
    F: Fn(u32, &mut ProvenanceTracker, &mut RecordSink) + Sync,
{
    let stem = stem.as_ref();
    let written = run_workers(settings, simulate_event, |w, sink| {
        sink.write_parquet(partition_stem(stem, w))?;
        Ok(())
    })?;

    let partitions = (0..written.len())
        .map(|w| RecordSink::load_parquet(partition_stem(stem, w)))
        .collect::<Result<Vec<_>>>()?;
    Ok(RecordSink::merge(partitions))
}

/// Stem of one worker's persisted partition: `<stem>_t<worker>`.
#[must_use]
pub fn partition_stem(stem: &Path, worker: usize) -> PathBuf {
    let mut name = stem.as_os_str().to_os_string();
    name.push(format!("_t{worker}"));
    PathBuf::from(name)
}

/// Persist the merged sink plus the run summary sidecar
/// (`<stem>.run.json`).
///
/// # Errors
/// Returns error on any IO or encoding failure.
pub fn write_run<P: AsRef<Path>>(
    sink: &RecordSink,
    settings: &SimulationSettings,
    stem: P,
) -> Result<()> {
    let stem = stem.as_ref();
    sink.write_parquet(stem)?;

    let summary = RunSummary {
        n_events: settings.n_events,
        settings: settings.clone(),
    };
    let json = serde_json::to_string_pretty(&summary)
        .map_err(|e| Error::Storage(format!("cannot encode run summary: {e}")))?;
    std::fs::write(summary_path(stem), json)?;
    Ok(())
}

/// Load the run summary sidecar for a run stem.
///
/// # Errors
/// Returns a configuration error if the sidecar is missing or malformed.
pub fn load_run_summary<P: AsRef<Path>>(stem: P) -> Result<RunSummary> {
    let path = summary_path(stem.as_ref());
    let json = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("cannot read run summary {}: {e}", path.display())))?;
    serde_json::from_str(&json)
        .map_err(|e| Error::Config(format!("malformed run summary {}: {e}", path.display())))
}

fn summary_path(stem: &Path) -> PathBuf {
    let mut name = stem.as_os_str().to_os_string();
    name.push(".run.json");
    PathBuf::from(name)
}
