use std::time::Instant;

use crate::error::{ArcadiaError, ArcadiaResult};

/// Tick source for retention decisions. One tick is one millisecond.
#[derive(Debug, Clone)]
pub enum Clock {
    Monotonic(Instant),
    Manual(u64),
}

impl Clock {
    pub fn monotonic() -> Self {
        Clock::Monotonic(Instant::now())
    }

    pub fn manual(start: u64) -> Self {
        Clock::Manual(start)
    }

    pub fn now(&self) -> u64 {
        match self {
            Clock::Monotonic(start) => u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            Clock::Manual(ticks) => *ticks,
        }
    }

    pub fn advance(&mut self, ticks: u64) -> ArcadiaResult<()> {
        match self {
            Clock::Manual(now) => {
                *now = now.saturating_add(ticks);
                Ok(())
            }
            Clock::Monotonic(_) => Err(ArcadiaError::operation_invalid("cannot advance a monotonic clock")),
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::monotonic()
    }
}
