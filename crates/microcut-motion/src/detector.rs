//! Movement completion detection by polling.
//!
//! The controller never announces that a move has finished. While a move is
//! in flight the position is queried once per tick; when the same answer has
//! come back more than `stable_threshold` times in a row, the move is
//! considered complete.

use microcut_communication::{last_line, StageCommand};

/// What is being polled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorMode {
    /// Position of a single axis (1-based index).
    Axis(u8),
    /// Combined position of the two grouped axes.
    Group(u8),
}

impl DetectorMode {
    /// Position query for this mode
    pub fn query(&self) -> StageCommand {
        match self {
            DetectorMode::Axis(axis) => StageCommand::QueryPosition { axis: *axis },
            DetectorMode::Group(group) => StageCommand::GroupPosition { group: *group },
        }
    }
}

/// A decoded position reply
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionSample {
    /// Raw position of one axis.
    Axis {
        /// Axis index (1-based).
        axis: u8,
        /// Raw position.
        value: f64,
    },
    /// Raw positions of the grouped axes.
    Group {
        /// First grouped axis.
        x: f64,
        /// Second grouped axis.
        y: f64,
    },
}

/// Result of feeding one poll into the detector
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorEvent {
    /// Not armed; nothing to do.
    Idle,
    /// Nothing came back this tick; the query must be sent again.
    NoResponse,
    /// Still moving; the sample, if it could be decoded, is current.
    Moving(Option<PositionSample>),
    /// The move has finished; the detector is disarmed.
    Complete,
    /// Too many consecutive empty polls; the detector is disarmed.
    Stalled {
        /// Number of empty polls seen.
        polls: u32,
    },
}

/// Polling debounce deciding when a commanded move has finished
#[derive(Debug, Clone)]
pub struct MotionCompletionDetector {
    mode: Option<DetectorMode>,
    last_sample: String,
    consecutive_unchanged: u32,
    silent_polls: u32,
    waiting_for_group_finish: bool,
    stable_threshold: u32,
    max_silent_polls: Option<u32>,
}

impl MotionCompletionDetector {
    /// Create an idle detector
    pub fn new(stable_threshold: u32, max_silent_polls: Option<u32>) -> Self {
        Self {
            mode: None,
            last_sample: String::new(),
            consecutive_unchanged: 0,
            silent_polls: 0,
            waiting_for_group_finish: false,
            stable_threshold,
            max_silent_polls,
        }
    }

    /// Start watching a move; `current` is the last known position reply
    pub fn arm(&mut self, mode: DetectorMode, current: impl Into<String>) {
        self.mode = Some(mode);
        self.last_sample = current.into();
        self.consecutive_unchanged = 0;
        self.silent_polls = 0;
    }

    /// Stop watching
    pub fn disarm(&mut self) {
        self.mode = None;
        self.consecutive_unchanged = 0;
        self.silent_polls = 0;
        self.waiting_for_group_finish = false;
    }

    /// Current mode, `None` when idle
    pub fn mode(&self) -> Option<DetectorMode> {
        self.mode
    }

    /// Whether a move is being watched
    pub fn is_armed(&self) -> bool {
        self.mode.is_some()
    }

    /// Query to send for the next poll
    pub fn query(&self) -> Option<StageCommand> {
        self.mode.map(|m| m.query())
    }

    /// Unchanged samples seen in a row
    pub fn consecutive_unchanged(&self) -> u32 {
        self.consecutive_unchanged
    }

    /// Mark that the controller is holding its replies until a slack
    /// take-up move has settled
    pub fn set_waiting_for_group_finish(&mut self, waiting: bool) {
        self.waiting_for_group_finish = waiting;
    }

    /// Whether replies are currently being withheld by the controller
    pub fn waiting_for_group_finish(&self) -> bool {
        self.waiting_for_group_finish
    }

    /// Feed the reply of one tick (`None` or empty when nothing arrived)
    pub fn observe(&mut self, response: Option<&str>) -> DetectorEvent {
        let Some(mode) = self.mode else {
            return DetectorEvent::Idle;
        };

        let line = response.map(last_line).unwrap_or("");
        if line.is_empty() {
            self.silent_polls += 1;
            if let Some(max) = self.max_silent_polls {
                if self.silent_polls > max {
                    let polls = self.silent_polls;
                    tracing::warn!("No position reply for {} polls", polls);
                    self.disarm();
                    return DetectorEvent::Stalled { polls };
                }
            }
            return DetectorEvent::NoResponse;
        }
        self.silent_polls = 0;

        if line != self.last_sample {
            self.last_sample = line.to_string();
            self.consecutive_unchanged = 0;
        } else if !self.waiting_for_group_finish {
            self.consecutive_unchanged += 1;
        }

        if self.consecutive_unchanged > self.stable_threshold {
            self.disarm();
            return DetectorEvent::Complete;
        }

        let sample = parse_sample(mode, line);
        if sample.is_none() {
            tracing::warn!("Could not decode position reply {:?}", line);
        }
        if matches!(sample, Some(PositionSample::Group { .. })) {
            self.waiting_for_group_finish = false;
        }
        DetectorEvent::Moving(sample)
    }
}

/// Decode a position reply for `mode`
pub fn parse_sample(mode: DetectorMode, line: &str) -> Option<PositionSample> {
    match mode {
        DetectorMode::Axis(axis) => line
            .trim()
            .parse::<f64>()
            .ok()
            .map(|value| PositionSample::Axis { axis, value }),
        DetectorMode::Group(_) => {
            parse_group_position(line).map(|(x, y)| PositionSample::Group { x, y })
        }
    }
}

/// Parse a `(x, y)` group position reply
pub fn parse_group_position(line: &str) -> Option<(f64, f64)> {
    let inner = line.trim().trim_start_matches('(').trim_end_matches(')');
    let mut parts = inner.split(',').map(|p| p.trim().parse::<f64>());
    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(x)), Some(Ok(y)), None) => Some((x, y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_detector() {
        let mut detector = MotionCompletionDetector::new(2, None);
        assert_eq!(detector.observe(Some("1.0")), DetectorEvent::Idle);
        assert!(detector.query().is_none());
    }

    #[test]
    fn test_empty_reply_does_not_count() {
        let mut detector = MotionCompletionDetector::new(2, None);
        detector.arm(DetectorMode::Axis(1), "5.0");
        detector.observe(Some("5.0"));
        detector.observe(Some("5.0"));
        for _ in 0..20 {
            assert_eq!(detector.observe(None), DetectorEvent::NoResponse);
            assert_eq!(detector.observe(Some("")), DetectorEvent::NoResponse);
        }
        assert_eq!(detector.consecutive_unchanged(), 2);
        assert_eq!(detector.observe(Some("5.0")), DetectorEvent::Complete);
    }

    #[test]
    fn test_waiting_for_group_finish_holds_counter() {
        let mut detector = MotionCompletionDetector::new(2, None);
        detector.arm(DetectorMode::Group(1), "(5, 5)");
        detector.set_waiting_for_group_finish(true);

        // Undecodable replies keep the window open
        for _ in 0..5 {
            detector.observe(Some("?"));
        }
        assert!(detector.waiting_for_group_finish());
        assert_eq!(detector.consecutive_unchanged(), 0);
    }

    #[test]
    fn test_group_reply_closes_waiting_window() {
        let mut detector = MotionCompletionDetector::new(2, None);
        detector.arm(DetectorMode::Group(1), "");
        detector.set_waiting_for_group_finish(true);

        assert_eq!(
            detector.observe(Some("(5.012, 5)")),
            DetectorEvent::Moving(Some(PositionSample::Group { x: 5.012, y: 5.0 }))
        );
        assert!(!detector.waiting_for_group_finish());
        detector.observe(Some("(5.012, 5)"));
        assert_eq!(detector.consecutive_unchanged(), 1);
    }

    #[test]
    fn test_stall_ceiling() {
        let mut detector = MotionCompletionDetector::new(2, Some(3));
        detector.arm(DetectorMode::Axis(2), "1.0");
        for _ in 0..3 {
            assert_eq!(detector.observe(None), DetectorEvent::NoResponse);
        }
        assert_eq!(
            detector.observe(None),
            DetectorEvent::Stalled { polls: 4 }
        );
        assert!(!detector.is_armed());
    }

    #[test]
    fn test_parse_group_position() {
        assert_eq!(parse_group_position("(4.012, 3)"), Some((4.012, 3.0)));
        assert_eq!(parse_group_position("4.012,3"), Some((4.012, 3.0)));
        assert_eq!(parse_group_position("(4.012)"), None);
        assert_eq!(parse_group_position("(a, b)"), None);
    }
}
