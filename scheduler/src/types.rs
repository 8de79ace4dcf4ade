/// Configuration knobs for the scheduling service.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How many times the accept path retries after a detected concurrent
    /// write before surfacing `Conflict` to the caller.
    pub max_accept_attempts: u32,

    /// Base backoff between accept retries, in milliseconds. Scaled by the
    /// attempt number and jittered.
    pub retry_backoff_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_accept_attempts: 3,
            retry_backoff_ms: 25,
        }
    }
}
