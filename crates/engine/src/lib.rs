//! Polling engine: drives each enabled job's query, deliver, advance and
//! commit cycle on a fixed cadence.

pub mod advance;
pub mod cycle;
pub mod engine;

pub use advance::{advance, Advance, WatermarkAnomaly};
pub use cycle::{CycleError, CycleOutcome, CyclePhase, CycleRunner};
pub use engine::{CycleReport, PollingEngine, TickReport};
