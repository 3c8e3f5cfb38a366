//! Session configuration

use crate::time::Duration;
use crate::wire::MAX_DATA_LEN;

/// Session tuning knobs
///
/// Timeouts are optional. `None` blocks indefinitely, which matches a peer that is trusted to
/// always answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Bound on waiting for the channel announcement to be acknowledged.
    pub handshake_timeout: Option<Duration>,
    /// Bound on waiting for a single response.
    pub response_timeout: Option<Duration>,
    /// Upper limit for the length requested by a single read.
    pub max_read_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            handshake_timeout: None,
            response_timeout: None,
            max_read_len: MAX_DATA_LEN,
        }
    }
}

impl Config {
    /// Clamps fields to what the wire format can carry.
    pub fn validated(mut self) -> Self {
        self.max_read_len = self.max_read_len.clamp(1, MAX_DATA_LEN);
        self
    }
}
