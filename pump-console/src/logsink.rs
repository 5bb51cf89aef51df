//! Wires the core's non-blocking diagnostics sink to `tracing`.

use gkl_core::log::{LogSink, LogTarget};

pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn push(&mut self, target: LogTarget, line: &str) {
        let channel = match target {
            LogTarget::Trk1 => "trk1",
            LogTarget::Trk2 => "trk2",
            LogTarget::Both => "both",
        };
        tracing::debug!(channel, "{line}");
    }
}
