//! Sliding-window detection of stuck agent action sequences.
//!
//! Two shapes are recognised:
//! - repeat: the last `repeat_threshold` actions are identical (`A A A`)
//! - alternating: the last `2 * alternating_cycles` actions strictly alternate
//!   between exactly two distinct values (`A B A B`)
//!
//! An ongoing pattern is reported once. Further pushes that keep the same
//! pattern alive are suppressed until the pattern breaks.

use std::collections::VecDeque;

use crate::types::PatternType;

/// Result of a single [`LoopDetector::push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopDetection {
    pub detected: bool,
    pub pattern_type: Option<PatternType>,
    /// Human-readable pattern, e.g. `click x4` or `click <-> scroll x2`.
    pub pattern: Option<String>,
    /// Snapshot of the window after the push.
    pub window: Vec<String>,
}

impl LoopDetection {
    fn none(window: Vec<String>) -> Self {
        Self {
            detected: false,
            pattern_type: None,
            pattern: None,
            window,
        }
    }
}

/// Loop detector thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopDetectorConfig {
    pub window_size: usize,
    pub repeat_threshold: usize,
    pub alternating_cycles: usize,
}

impl Default for LoopDetectorConfig {
    fn default() -> Self {
        Self {
            window_size: 8,
            repeat_threshold: 3,
            alternating_cycles: 2,
        }
    }
}

/// A raw pattern match before suppression is applied.
struct PatternMatch {
    pattern_type: PatternType,
    pattern: String,
    key: String,
}

/// Sliding-window loop detector. One instance per agent-run attempt.
#[derive(Debug, Clone)]
pub struct LoopDetector {
    config: LoopDetectorConfig,
    window: VecDeque<String>,
    detected_count: u32,
    suppressed_key: Option<String>,
}

impl Default for LoopDetector {
    fn default() -> Self {
        Self::new(LoopDetectorConfig::default())
    }
}

impl LoopDetector {
    pub fn new(config: LoopDetectorConfig) -> Self {
        Self {
            window: VecDeque::with_capacity(config.window_size.max(1)),
            config,
            detected_count: 0,
            suppressed_key: None,
        }
    }

    /// Number of distinct stuck episodes reported so far.
    pub fn detected_count(&self) -> u32 {
        self.detected_count
    }

    pub fn window(&self) -> Vec<String> {
        self.window.iter().cloned().collect()
    }

    /// Append an action and check for a new loop.
    pub fn push(&mut self, action_name: impl Into<String>) -> LoopDetection {
        self.window.push_back(action_name.into());
        while self.window.len() > self.config.window_size.max(1) {
            self.window.pop_front();
        }

        let window = self.window();
        let Some(found) = self.check() else {
            self.suppressed_key = None;
            return LoopDetection::none(window);
        };

        if self.suppressed_key.as_deref() == Some(found.key.as_str()) {
            return LoopDetection::none(window);
        }

        self.detected_count += 1;
        self.suppressed_key = Some(found.key);
        LoopDetection {
            detected: true,
            pattern_type: Some(found.pattern_type),
            pattern: Some(found.pattern),
            window,
        }
    }

    fn check(&self) -> Option<PatternMatch> {
        self.check_repeat().or_else(|| self.check_alternating())
    }

    fn check_repeat(&self) -> Option<PatternMatch> {
        let threshold = self.config.repeat_threshold.max(1);
        if self.window.len() < threshold {
            return None;
        }
        let last = self.window.back()?;
        let tail_identical = self.window.iter().rev().take(threshold).all(|a| a == last);
        if !tail_identical {
            return None;
        }
        let count = self.window.iter().rev().take_while(|a| *a == last).count();
        Some(PatternMatch {
            pattern_type: PatternType::Repeat,
            pattern: format!("{last} x{count}"),
            key: format!("repeat:{last}"),
        })
    }

    fn check_alternating(&self) -> Option<PatternMatch> {
        let cycles = self.config.alternating_cycles.max(1);
        let min_len = cycles * 2;
        if self.window.len() < min_len {
            return None;
        }
        let tail: Vec<&String> = self.window.iter().skip(self.window.len() - min_len).collect();
        let (a, b) = (tail[0], tail[1]);
        if a == b {
            return None;
        }
        let alternates = tail
            .iter()
            .enumerate()
            .all(|(i, action)| *action == if i % 2 == 0 { a } else { b });
        if !alternates {
            return None;
        }
        // A <-> B and B <-> A are the same episode.
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Some(PatternMatch {
            pattern_type: PatternType::Alternating,
            pattern: format!("{a} <-> {b} x{cycles}"),
            key: format!("alternating:{lo}<->{hi}"),
        })
    }
}
