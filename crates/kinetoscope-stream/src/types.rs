// crates/kinetoscope-stream/src/types.rs
//
// Messages that flow between the session state machine and the background
// fetch worker (spec.md §4.D, §4.E). Plain data, no sockets — mirrors the
// command/result split the teacher's media_types.rs uses between
// velocut-media's worker thread and velocut-ui.

use kinetoscope_core::sram::Bank;
use kinetoscope_core::KinetoscopeError;

/// One chunk fetch job, fully resolved: which bank to fill, the byte range
/// to request over HTTP, and whether the bytes need RLE expansion.
#[derive(Clone, Debug)]
pub struct ChunkFetch {
    pub relative_url: String,
    pub bank: Bank,
    /// Inclusive byte range to request from the server. For raw chunks this
    /// is `chunk_size` bytes; for compressed chunks it is
    /// `index.offset[n+1] - index.offset[n]` bytes (spec.md §4.D).
    pub first: u64,
    pub last: u64,
    pub compressed: bool,
}

/// Commands sent from the session to the background worker thread.
pub enum WorkerCommand {
    Fetch(ChunkFetch),
    Shutdown,
}

/// Results sent from the worker back to the session.
#[derive(Clone, Debug)]
pub enum WorkerEvent {
    ChunkFilled { bank: Bank },
    ChunkFailed { error: KinetoscopeError },
}
