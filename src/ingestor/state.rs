//! Driver state machine (§4.5): `Idle -> Fetching -> Decoding -> Persisting
//! -> Done`, with a `Decoding -> ReorgDetected -> Rewinding -> Fetching`
//! branch. The enum exists purely to give the driver loop's `tracing` spans
//! a name; the actual transitions live in [`super::run`].

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestorState {
    Idle,
    Fetching,
    Decoding,
    Persisting,
    ReorgDetected,
    Rewinding,
    Done,
}

impl fmt::Display for IngestorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IngestorState::Idle => "idle",
            IngestorState::Fetching => "fetching",
            IngestorState::Decoding => "decoding",
            IngestorState::Persisting => "persisting",
            IngestorState::ReorgDetected => "reorg_detected",
            IngestorState::Rewinding => "rewinding",
            IngestorState::Done => "done",
        };
        f.write_str(label)
    }
}
