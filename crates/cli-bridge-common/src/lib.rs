#![deny(clippy::all)]

mod sleeper;
mod sync;

pub use sleeper::MockSleeper;
pub use sleeper::RealSleeper;
pub use sleeper::Sleeper;
pub use sync::mutex_lock_or_recover;
pub use sync::rwlock_read_or_recover;
pub use sync::rwlock_write_or_recover;
