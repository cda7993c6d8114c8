// crates/kinetoscope-stream/src/lib.rs
//
// The streaming session: HTTP range fetcher, background fetch worker, and
// the session state machine that drives start_video/flip_region/stop_video
// (spec.md §4.D, §4.E, §5). Builds on kinetoscope-core's pure SRAM/RLE/
// header types with real sockets and a background thread.

pub mod fetch;
pub mod session;
pub mod types;
pub mod worker;

pub use session::Session;
pub use worker::FetchWorker;
