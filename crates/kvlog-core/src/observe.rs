//! Optional metrics instrumentation for kvlog.
//!
//! When the `observe` feature is enabled, the writer and replay emit counters
//! and histograms via the [`metrics`] crate. A downstream application must
//! install a metrics recorder (e.g. `metrics-exporter-prometheus`) to collect
//! the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record one persisted event (counter + latency histogram).
///
/// - `kvlog.writer.appends_total` – incremented on every append
/// - `kvlog.writer.append_duration_seconds` – histogram of append latency
#[inline]
pub fn record_append(duration: std::time::Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("kvlog.writer.appends_total").increment(1);
        metrics::histogram!("kvlog.writer.append_duration_seconds")
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = duration;
    }
}

/// Record a writer entering the failed state.
///
/// - `kvlog.writer.failures_total` – counter
#[inline]
pub fn record_write_failure() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("kvlog.writer.failures_total").increment(1);
    }
}

/// Record a replay run.
///
/// - `kvlog.replay.events_total` – counter of events applied
/// - `kvlog.replay.duration_seconds` – histogram, labelled by `outcome`
#[inline]
pub fn record_replay(duration: std::time::Duration, events: u64, success: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "fail" };
        metrics::counter!("kvlog.replay.events_total").increment(events);
        metrics::histogram!("kvlog.replay.duration_seconds", "outcome" => outcome)
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, events, success);
    }
}
