//! Wall-clock source used to stamp `mtime`.
//!
//! The core only ever needs a `(seconds, nanoseconds)` pair; it never
//! touches `SystemTime` directly so tests can supply a deterministic
//! clock instead of the real one.

use crate::error::FsError;
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock {
    /// Returns the current time as (seconds, nanoseconds) since the
    /// Unix epoch, or `BadAddress` if the underlying clock read fails
    /// (`utimens`/`write`/`truncate` all surface a clock failure this
    /// way).
    fn now(&self) -> Result<(u64, u32), FsError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<(u64, u32), FsError> {
        let dur = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| FsError::BadAddress)?;
        Ok((dur.as_secs(), dur.subsec_nanos()))
    }
}
