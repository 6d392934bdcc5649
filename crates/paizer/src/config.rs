//! Relay timing configuration.

use std::time::Duration;

/// Timing knobs for liveness detection and the join handshake.
///
/// The defaults reproduce the classic relay behaviour: the monitor sweeps
/// every 5 s and evicts anyone silent for more than 10 s (twice the sweep
/// period, so one late sweep never produces a false positive), and raw
/// stream clients are probed every 5 s and dropped locally after 10 s of
/// silence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// How often the heartbeat monitor scans the registry.
    pub sweep_interval: Duration,

    /// Silence longer than this gets a session evicted by the monitor.
    pub stale_after: Duration,

    /// How often raw stream clients are sent a `HEARTBEAT` probe.
    pub probe_interval: Duration,

    /// Per-connection inactivity limit for raw stream clients.
    pub idle_timeout: Duration,

    /// How long a new connection may take to send its join unit.
    pub handshake_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(5),
            stale_after: Duration::from_secs(10),
            probe_interval: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(30),
        }
    }
}

impl RelayConfig {
    /// Fixes any values that would make the relay misbehave.
    ///
    /// Called automatically by the server builder. Rules:
    /// - A zero duration is replaced by its default (a zero-period
    ///   interval panics in tokio, and a zero timeout evicts everyone).
    /// - `stale_after` is raised to at least `sweep_interval`.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        for (field, value, default) in [
            ("sweep_interval", &mut self.sweep_interval, defaults.sweep_interval),
            ("stale_after", &mut self.stale_after, defaults.stale_after),
            ("probe_interval", &mut self.probe_interval, defaults.probe_interval),
            ("idle_timeout", &mut self.idle_timeout, defaults.idle_timeout),
            (
                "handshake_timeout",
                &mut self.handshake_timeout,
                defaults.handshake_timeout,
            ),
        ] {
            if value.is_zero() {
                tracing::warn!(field, ?default, "zero duration, using default");
                *value = default;
            }
        }

        if self.stale_after < self.sweep_interval {
            tracing::warn!(
                stale_after = ?self.stale_after,
                sweep_interval = ?self.sweep_interval,
                "stale_after shorter than sweep_interval, raising it"
            );
            self.stale_after = self.sweep_interval;
        }
        self
    }
}
