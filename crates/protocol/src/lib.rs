//! Wire model for Favus progress events.
//!
//! Everything that crosses a process boundary lives here: the [`Event`]
//! envelope posted to the local agent, the typed payloads it carries, and
//! the timing/size constants both sides of the bridge agree on.

mod constants;
mod envelope;
mod payloads;

pub use constants::*;
pub use envelope::{Event, EventKind};
pub use payloads::{
    ErrorEvent, PartDone, PartProgress, PartStart, PreCompletedPart, SessionDone, SessionStart,
    TotalProgress,
};
