use std::time::Instant;

/// Emits a pair of `measure` events around a section of pool work,
/// the second one carrying the elapsed time in microseconds.
pub struct ScopedTimer<'a> {
    subject: &'a str,
    method: &'static str,
    started: Instant,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(subject: &'a str, method: &'static str) -> Self {
        tracing::info!(
            action = "measure",
            subject = subject,
            method = method,
            event = "start"
        );
        Self {
            subject,
            method,
            started: Instant::now(),
        }
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        tracing::info!(
            action = "measure",
            subject = self.subject,
            method = self.method,
            event = "end",
            elapsed_us = self.started.elapsed().as_micros() as u64
        );
    }
}

macro_rules! trace_time {
    ($subject:expr, $method:tt, $block:expr) => {{
        let _timer = $crate::internal::common::trace::ScopedTimer::new($subject, $method);
        $block
    }};
}
