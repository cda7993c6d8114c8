// crates/kinetoscope-stream/src/worker.rs
//
// FetchWorker: the single background thread that fetches one chunk at a
// time and writes it into shared SRAM (spec.md §4.D, §4.E, §5: "no
// multi-worker parallelism; at most one HTTP fetch is in flight at any
// time"). Modeled directly on the teacher's `MediaWorker` — a bounded
// command channel in, a bounded result channel out, an `AtomicBool` the
// caller can poll without blocking, and a poison-pill shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};

use kinetoscope_core::rle::RleDecoder;
use kinetoscope_core::sram::Sram;

use crate::fetch::HttpSource;
use crate::types::{ChunkFetch, WorkerCommand, WorkerEvent};

pub struct FetchWorker {
    cmd_tx: Sender<WorkerCommand>,
    pub events: Receiver<WorkerEvent>,
    /// Set the instant a fetch is handed to the worker, cleared when that
    /// fetch's SRAM write completes (success or failure). `flip_region`
    /// reads this without blocking to decide whether the console has
    /// outrun the network (spec.md §4.E underflow check).
    fetch_busy: Arc<AtomicBool>,
}

impl FetchWorker {
    pub fn new(source: HttpSource, sram: Arc<Mutex<Sram>>) -> Self {
        let (cmd_tx, cmd_rx) = bounded::<WorkerCommand>(4);
        let (event_tx, event_rx) = bounded::<WorkerEvent>(4);
        let fetch_busy = Arc::new(AtomicBool::new(false));

        let worker_busy = Arc::clone(&fetch_busy);
        thread::spawn(move || run(cmd_rx, event_tx, source, sram, worker_busy));

        Self {
            cmd_tx,
            events: event_rx,
            fetch_busy,
        }
    }

    pub fn fetch_busy(&self) -> bool {
        self.fetch_busy.load(Ordering::Acquire)
    }

    /// Queue a chunk fetch. Marks the worker busy synchronously, before the
    /// background thread has even picked the job up, so a `flip_region`
    /// issued a moment later always observes the in-flight state.
    pub fn start_fetch(&self, job: ChunkFetch) {
        self.fetch_busy.store(true, Ordering::Release);
        // Channel is bounded(4): a session only ever has one outstanding
        // fetch, so this send cannot block on a healthy worker.
        let _ = self.cmd_tx.send(WorkerCommand::Fetch(job));
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(WorkerCommand::Shutdown);
    }
}

fn run(
    cmd_rx: Receiver<WorkerCommand>,
    event_tx: Sender<WorkerEvent>,
    source: HttpSource,
    sram: Arc<Mutex<Sram>>,
    fetch_busy: Arc<AtomicBool>,
) {
    let mut decoder = RleDecoder::new();
    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            WorkerCommand::Shutdown => return,
            WorkerCommand::Fetch(job) => {
                let result = run_fetch(&source, &sram, &mut decoder, &job);
                fetch_busy.store(false, Ordering::Release);
                let event = match result {
                    Ok(()) => WorkerEvent::ChunkFilled { bank: job.bank },
                    Err(error) => {
                        eprintln!("[net] chunk fetch failed: {error}");
                        WorkerEvent::ChunkFailed { error }
                    }
                };
                if event_tx.send(event).is_err() {
                    return;
                }
            }
        }
    }
}

/// Fetches a chunk and writes it into SRAM as bytes arrive, rather than
/// materializing the whole chunk in RAM first — the cartridge's shared SRAM
/// bank is the only buffer this ever needs (spec.md §4.D, §4.E).
fn run_fetch(
    source: &HttpSource,
    sram: &Arc<Mutex<Sram>>,
    decoder: &mut RleDecoder,
    job: &ChunkFetch,
) -> Result<(), kinetoscope_core::KinetoscopeError> {
    let mut guard = sram.lock().expect("sram mutex poisoned");
    guard.reset(job.bank);
    if job.compressed {
        decoder.reset();
    }
    let compressed = job.compressed;

    source.fetch_range(&job.relative_url, job.first, job.last, &mut |chunk| {
        if compressed {
            decoder.decode(chunk, &mut |b| guard.write(&[b]));
        } else {
            guard.write(chunk);
        }
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fetch_busy_is_false_before_any_fetch_is_queued() {
        let source = HttpSource::new("127.0.0.1", 1, "");
        let sram = Arc::new(Mutex::new(Sram::new()));
        let worker = FetchWorker::new(source, sram);
        assert!(!worker.fetch_busy());
        worker.shutdown();
    }

    #[test]
    fn start_fetch_sets_busy_immediately_and_clears_after_failure() {
        // Port 1 is reserved and nothing listens there, so the connection
        // fails fast and deterministically without needing a live server.
        let source = HttpSource::new("127.0.0.1", 1, "");
        let sram = Arc::new(Mutex::new(Sram::new()));
        let worker = FetchWorker::new(source, sram);

        worker.start_fetch(ChunkFetch {
            relative_url: "videos/a.kinvid".to_string(),
            bank: kinetoscope_core::sram::Bank::Zero,
            first: 0,
            last: 99,
            compressed: false,
        });
        assert!(worker.fetch_busy());

        let event = worker
            .events
            .recv_timeout(Duration::from_secs(5))
            .expect("worker should report completion");
        assert!(matches!(event, WorkerEvent::ChunkFailed { .. }));
        assert!(!worker.fetch_busy());
        worker.shutdown();
    }
}
