pub mod backoff;
pub mod clock;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock, from_unix, to_unix};
