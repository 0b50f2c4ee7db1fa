//! Best-effort reporter that posts session and part progress to the local
//! bridge agent.
//!
//! The sink is advisory: a dead or absent agent never fails an upload. The
//! reporter probes `/healthz` at construction, flips itself off on the first
//! delivery failure, and re-probes at most every two seconds. High-frequency
//! progress updates are throttled per event type; dropped intermediate
//! updates are harmless because the next one subsumes them.
//!
//! Ordering guarantee: `session_start` is delivered before any other event
//! of the session. If the agent is down at session start and comes up later,
//! the stored start payload is re-emitted before the next event goes out.

use std::collections::HashMap;
use std::time::Instant;

use favus_protocol::{
    agent_addr, Event, EventKind, ErrorEvent, PartDone, PartProgress, PartStart, SessionDone,
    SessionStart, TotalProgress, AGENT_RECHECK_INTERVAL, ERROR_LOG_INTERVAL,
    PART_PROGRESS_INTERVAL, PROBE_HTTP_TIMEOUT, TOTAL_PROGRESS_INTERVAL,
};

/// Per-part progress bookkeeping.
struct PartTracker {
    size: u64,
    sent: u64,
    started: Instant,
    last_flush: Option<Instant>,
}

/// Session-scoped reporter. One instance per upload session, owned by a
/// single task; all methods take `&mut self` and never return an error.
pub struct Reporter {
    http: reqwest::Client,
    addr: String,
    run_id: String,
    enabled: bool,
    started: Instant,
    total_bytes: u64,
    uploaded_bytes: u64,
    last_progress_flush: Option<Instant>,
    last_check: Instant,
    last_error_log: Option<Instant>,
    start_payload: Option<SessionStart>,
    start_sent: bool,
    parts: HashMap<i32, PartTracker>,
}

impl Reporter {
    /// Creates a reporter for a session of `total_bytes`, probing the agent
    /// at the default (or `FAVUS_AGENT_ADDR`-overridden) address.
    pub async fn new(total_bytes: u64) -> Self {
        Self::with_addr(agent_addr(), total_bytes).await
    }

    /// Creates a reporter against an explicit agent address.
    pub async fn with_addr(addr: impl Into<String>, total_bytes: u64) -> Self {
        let addr = addr.into();
        let http = reqwest::Client::new();
        let enabled = probe(&http, &addr).await;
        Self {
            http,
            addr,
            run_id: uuid::Uuid::new_v4().to_string(),
            enabled,
            started: Instant::now(),
            total_bytes,
            uploaded_bytes: 0,
            last_progress_flush: None,
            // Eligible for an immediate re-probe.
            last_check: Instant::now() - AGENT_RECHECK_INTERVAL,
            last_error_log: None,
            start_payload: None,
            start_sent: false,
            parts: HashMap::new(),
        }
    }

    /// The uuid identifying this run on the wire.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Total bytes reported as uploaded so far.
    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded_bytes
    }

    /// Seeds the uploaded-bytes counter (resume: bytes already on the
    /// server), so throughput estimates start from there.
    pub fn set_uploaded_bytes(&mut self, bytes: u64) {
        self.uploaded_bytes = bytes;
    }

    /// Registers the session and attempts to emit `session_start`.
    ///
    /// Until this payload has actually been delivered, every other event is
    /// held back; the pending start is re-sent first when the agent appears.
    pub async fn session_start(&mut self, payload: SessionStart) {
        self.start_payload = Some(payload);
        self.start_sent = false;
        self.emit_start().await;
    }

    /// Accumulates session-level progress; flushes at most every 250 ms.
    pub async fn total_progress_add(&mut self, delta: u64) {
        if delta == 0 {
            return;
        }
        self.uploaded_bytes += delta;

        if !self.ensure_agent().await {
            return;
        }
        let now = Instant::now();
        let due = self
            .last_progress_flush
            .map_or(true, |t| now.duration_since(t) >= TOTAL_PROGRESS_INTERVAL);
        if !due {
            return;
        }
        let payload = TotalProgress {
            bytes: self.uploaded_bytes,
            total: self.total_bytes,
            percent: percent(self.uploaded_bytes, self.total_bytes),
            bps: rate(self.uploaded_bytes, self.started),
        };
        self.send(EventKind::TotalProgress, &payload).await;
        self.last_progress_flush = Some(now);
    }

    /// Announces a part and starts its tracker.
    pub async fn part_start(&mut self, part: i32, size: u64, offset: u64) {
        self.parts.insert(
            part,
            PartTracker {
                size,
                sent: 0,
                started: Instant::now(),
                last_flush: None,
            },
        );
        self.send(EventKind::PartStart, &PartStart { part, size, offset })
            .await;
    }

    /// Accumulates per-part progress; flushes at most every 200 ms per part.
    pub async fn part_progress_add(&mut self, part: i32, delta: u64) {
        if delta == 0 {
            return;
        }
        let Some(tracker) = self.parts.get_mut(&part) else {
            return;
        };
        tracker.sent += delta;

        let now = Instant::now();
        let due = tracker
            .last_flush
            .map_or(true, |t| now.duration_since(t) >= PART_PROGRESS_INTERVAL);
        if !due {
            return;
        }
        let payload = PartProgress {
            part,
            sent: tracker.sent,
            size: tracker.size,
            percent: percent(tracker.sent, tracker.size),
            bps: rate(tracker.sent, tracker.started),
        };
        // Mark the flush before awaiting; a failed send is just a miss.
        tracker.last_flush = Some(now);
        self.send(EventKind::PartProgress, &payload).await;
    }

    /// Reports a completed part and drops its tracker.
    pub async fn part_done(&mut self, part: i32, size: u64, etag: &str) {
        self.send(
            EventKind::PartDone,
            &PartDone {
                part,
                size,
                etag: etag.to_string(),
            },
        )
        .await;
        self.parts.remove(&part);
    }

    /// Reports an error, optionally scoped to a part.
    pub async fn error(&mut self, message: impl Into<String>, part: Option<i32>) {
        let payload = ErrorEvent {
            message: message.into(),
            part,
        };
        self.send(EventKind::Error, &payload).await;
    }

    /// Reports session termination.
    pub async fn session_done(&mut self, success: bool, upload_id: &str) {
        let payload = SessionDone {
            success,
            upload_id: upload_id.to_string(),
            duration: format_duration(self.started.elapsed()),
            bytes: self.uploaded_bytes,
            total: self.total_bytes,
        };
        self.send(EventKind::SessionDone, &payload).await;
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    /// Returns `true` when the agent is (or has just become) reachable.
    /// A disabled reporter re-probes at most every 2 s.
    async fn ensure_agent(&mut self) -> bool {
        if self.enabled {
            return true;
        }
        if self.last_check.elapsed() < AGENT_RECHECK_INTERVAL {
            return false;
        }
        self.last_check = Instant::now();
        if probe(&self.http, &self.addr).await {
            self.enabled = true;
            return true;
        }
        false
    }

    /// Emits the stored `session_start` if it has not been delivered yet.
    async fn emit_start(&mut self) {
        if self.start_sent {
            return;
        }
        let Some(payload) = self.start_payload.clone() else {
            return;
        };
        if !self.ensure_agent().await {
            return;
        }
        self.write_event(EventKind::SessionStart, &payload).await;
    }

    /// Gated send used by every event except the start itself.
    async fn send<T: serde::Serialize>(&mut self, kind: EventKind, payload: &T) {
        if !self.ensure_agent().await {
            return;
        }
        self.emit_start().await;
        if !self.enabled || (self.start_payload.is_some() && !self.start_sent) {
            return;
        }
        self.write_event(kind, payload).await;
    }

    async fn write_event<T: serde::Serialize>(&mut self, kind: EventKind, payload: &T) {
        let event = match Event::new(kind, &self.run_id, payload) {
            Ok(ev) => ev,
            Err(e) => {
                tracing::warn!(?kind, error = %e, "failed to encode event");
                return;
            }
        };
        let url = format!("http://{}/event", self.addr);
        let result = self.http.post(&url).json(&event).send().await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                if kind == EventKind::SessionStart {
                    self.start_sent = true;
                }
            }
            Ok(resp) => self.handle_send_error(kind, &format!("status {}", resp.status())),
            Err(e) => self.handle_send_error(kind, &e.to_string()),
        }
    }

    /// A failed delivery disables the reporter; the failure is logged at
    /// most once per 5 s.
    fn handle_send_error(&mut self, kind: EventKind, error: &str) {
        self.enabled = false;
        self.last_check = Instant::now();
        let due = self
            .last_error_log
            .map_or(true, |t| t.elapsed() >= ERROR_LOG_INTERVAL);
        if due {
            tracing::warn!(?kind, error, "failed to deliver event to agent");
            self.last_error_log = Some(Instant::now());
        }
    }
}

/// Health probe: `GET /healthz` with a short timeout.
async fn probe(http: &reqwest::Client, addr: &str) -> bool {
    let url = format!("http://{addr}/healthz");
    match http.get(&url).timeout(PROBE_HTTP_TIMEOUT).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        done as f64 / total as f64 * 100.0
    }
}

fn rate(bytes: u64, since: Instant) -> f64 {
    let elapsed = since.elapsed().as_secs_f64();
    if elapsed > 0.0 {
        bytes as f64 / elapsed
    } else {
        0.0
    }
}

/// Formats an elapsed time the way the UI expects, e.g. `"12.345s"` or
/// `"2m3.400s"`.
fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs_f64();
    if secs >= 60.0 {
        let mins = (secs / 60.0).floor() as u64;
        format!("{mins}m{:.3}s", secs - mins as f64 * 60.0)
    } else {
        format!("{secs:.3}s")
    }
}
