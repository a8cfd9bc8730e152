//! Server configuration.

use std::time::Duration;

use duelroom_sweep::SweepConfig;

/// Default idle timeout: none. An open socket stays attached however long
/// it is silent (spectators never send anything); only the liveness sweep
/// removes connections, and only once their socket is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::ZERO;

/// Configuration for the [`Engine`](crate::Engine) and the tasks around it.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// When nonzero, a connection that sends nothing for this long is
    /// treated as disconnected. Zero (the default) disables the timeout.
    pub idle_timeout: Duration,
    /// Liveness sweep schedule.
    pub sweep: SweepConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep: SweepConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_sweep(mut self, sweep: SweepConfig) -> Self {
        self.sweep = sweep;
        self
    }
}
