pub mod clock;
pub mod config;
pub mod error;
pub mod job;
pub mod value;
pub mod watermark;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::*;
pub use job::*;
pub use value::{FieldValue, PayloadRow, Row};
pub use watermark::Watermark;
