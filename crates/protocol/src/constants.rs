use std::time::Duration;

/// Default bind address of the local bridge agent.
pub const DEFAULT_AGENT_ADDR: &str = "127.0.0.1:7777";

/// Environment variable overriding the agent address.
pub const AGENT_ADDR_ENV: &str = "FAVUS_AGENT_ADDR";

/// Maximum accepted `/event` body size (4 MiB).
pub const MAX_EVENT_BODY: usize = 4 * 1024 * 1024;

/// How often the agent pings its upstream WebSocket.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(15);

/// Read deadline on the upstream WebSocket. If nothing arrives within
/// this window (no pong, no server message) the connection is dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(30);

/// Timeout for the TCP half of an agent liveness probe.
pub const PROBE_DIAL_TIMEOUT: Duration = Duration::from_millis(250);

/// Timeout for the `/healthz` half of an agent liveness probe.
pub const PROBE_HTTP_TIMEOUT: Duration = Duration::from_millis(300);

/// How often a disabled reporter re-probes the agent.
pub const AGENT_RECHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Minimum gap between `total_progress` events (~4 Hz).
pub const TOTAL_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Minimum gap between `part_progress` events for one part (~5 Hz).
pub const PART_PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Minimum gap between logged reporter delivery failures.
pub const ERROR_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Returns the agent address, honoring the `FAVUS_AGENT_ADDR` override.
pub fn agent_addr() -> String {
    match std::env::var(AGENT_ADDR_ENV) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => DEFAULT_AGENT_ADDR.to_string(),
    }
}
