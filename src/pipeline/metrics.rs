//! Per-cycle latency bookkeeping

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Per-stage latencies for one interaction cycle
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyReport {
    /// Recording stop to transcript
    pub capture_to_transcript: Duration,
    /// Transcript to completion response
    pub transcript_to_completion: Duration,
    /// Completion response to end of playback
    pub completion_to_speech: Duration,
    /// Recording stop to end of cycle
    pub total: Duration,
}

/// Stage timestamps for the cycle in progress
#[derive(Debug, Clone, Copy)]
pub struct CycleTimings {
    stopped: Instant,
    transcribed: Option<Instant>,
    completed: Option<Instant>,
    finished: Option<Instant>,
}

impl CycleTimings {
    /// Start the clock at the recording-stop timestamp
    #[must_use]
    pub fn new() -> Self {
        Self {
            stopped: Instant::now(),
            transcribed: None,
            completed: None,
            finished: None,
        }
    }

    /// Record the transcript arrival
    pub fn mark_transcribed(&mut self) {
        self.transcribed = Some(Instant::now());
    }

    /// Record the completion response
    pub fn mark_completed(&mut self) {
        self.completed = Some(Instant::now());
    }

    /// Record the end of playback (or of the cycle, when speech failed)
    pub fn mark_finished(&mut self) {
        self.finished = Some(Instant::now());
    }

    /// Elapsed time since the recording stopped
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.stopped.elapsed()
    }

    /// Fold the timestamps into a report. Stages never reached contribute
    /// zero; the total runs to the last recorded timestamp, or to now for
    /// a cycle cut short.
    #[must_use]
    pub fn report(&self) -> LatencyReport {
        let capture_to_transcript = self
            .transcribed
            .map(|t| t.duration_since(self.stopped))
            .unwrap_or_default();
        let transcript_to_completion = match (self.transcribed, self.completed) {
            (Some(t), Some(c)) => c.duration_since(t),
            _ => Duration::ZERO,
        };
        let completion_to_speech = match (self.completed, self.finished) {
            (Some(c), Some(f)) => f.duration_since(c),
            _ => Duration::ZERO,
        };
        let total = self
            .finished
            .map_or_else(|| self.stopped.elapsed(), |f| f.duration_since(self.stopped));

        LatencyReport {
            capture_to_transcript,
            transcript_to_completion,
            completion_to_speech,
            total,
        }
    }
}

impl Default for CycleTimings {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded trailing history of cycle totals, oldest dropped first
#[derive(Debug)]
pub struct LatencyHistory {
    totals: VecDeque<Duration>,
    capacity: usize,
}

impl LatencyHistory {
    /// History keeping the last `capacity` cycle totals
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            totals: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append a cycle total, dropping the oldest entry when full
    pub fn push(&mut self, total: Duration) {
        if self.totals.len() == self.capacity {
            self.totals.pop_front();
        }
        self.totals.push_back(total);
    }

    /// Number of recorded cycles
    #[must_use]
    pub fn len(&self) -> usize {
        self.totals.len()
    }

    /// Whether no cycles have been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// Running average over the retained totals
    #[must_use]
    pub fn average(&self) -> Option<Duration> {
        if self.totals.is_empty() {
            return None;
        }
        let sum: Duration = self.totals.iter().sum();
        u32::try_from(self.totals.len())
            .ok()
            .map(|count| sum / count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_drops_oldest_when_full() {
        let mut history = LatencyHistory::new(3);
        for ms in [10, 20, 30, 40] {
            history.push(Duration::from_millis(ms));
        }

        assert_eq!(history.len(), 3);
        // Oldest (10ms) is gone: average of 20/30/40
        assert_eq!(history.average(), Some(Duration::from_millis(30)));
    }

    #[test]
    fn average_of_empty_history_is_none() {
        let history = LatencyHistory::new(8);
        assert!(history.average().is_none());
        assert!(history.is_empty());
    }

    #[test]
    fn report_zeroes_unreached_stages() {
        let timings = CycleTimings::new();
        let report = timings.report();

        assert_eq!(report.capture_to_transcript, Duration::ZERO);
        assert_eq!(report.transcript_to_completion, Duration::ZERO);
        assert_eq!(report.completion_to_speech, Duration::ZERO);
    }

    #[test]
    fn report_orders_stage_durations() {
        let mut timings = CycleTimings::new();
        std::thread::sleep(Duration::from_millis(5));
        timings.mark_transcribed();
        std::thread::sleep(Duration::from_millis(5));
        timings.mark_completed();
        timings.mark_finished();

        let report = timings.report();
        assert!(report.capture_to_transcript >= Duration::from_millis(5));
        assert!(report.transcript_to_completion >= Duration::from_millis(5));
        assert!(report.total >= report.capture_to_transcript + report.transcript_to_completion);
    }
}
