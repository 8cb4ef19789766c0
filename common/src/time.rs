//! Timing constants for the rate pipeline.

/// Pipeline timing constants.
pub mod constants {
    use std::time::Duration;

    /// Default interval between scheduled rate refreshes (30 minutes).
    pub fn default_refresh_interval() -> Duration {
        Duration::from_secs(30 * 60)
    }

    /// Shortest refresh interval accepted by the scheduler.
    pub fn min_refresh_interval() -> Duration {
        Duration::from_secs(1)
    }

    /// HTTP timeout for a single provider request.
    pub fn provider_request_timeout() -> Duration {
        Duration::from_secs(10)
    }

    /// How long shutdown waits for an in-flight tick.
    pub fn shutdown_grace_period() -> Duration {
        Duration::from_secs(30)
    }

    /// Attempts at a rate write before giving up on version conflicts.
    pub const MAX_WRITE_ATTEMPTS: u32 = 5;
}

#[cfg(test)]
mod tests {
    use super::constants::*;

    #[test]
    fn test_constants_are_consistent() {
        assert!(min_refresh_interval() <= default_refresh_interval());
        assert!(provider_request_timeout() < default_refresh_interval());
        assert!(MAX_WRITE_ATTEMPTS >= 2);
    }
}
