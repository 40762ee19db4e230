//! Per-phase timing for a single render.

use std::time::{Duration, Instant};

/// Phases of a render, in pipeline order. No phase is re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RenderPhase {
    /// Tree assembly and placeholder registration.
    Building,
    /// Cacheability merge.
    Aggregating,
    /// Store or bypass based on the committed cacheability.
    CacheDecision,
    /// Placeholder resolution.
    Substituting,
    /// Output fully assembled.
    Done,
}

impl std::fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Building => write!(f, "building"),
            Self::Aggregating => write!(f, "aggregating"),
            Self::CacheDecision => write!(f, "cache-decision"),
            Self::Substituting => write!(f, "substituting"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Timing marks for a render's phase transitions.
#[derive(Debug, Clone)]
pub struct RenderTiming {
    start: Instant,
    marks: Vec<(RenderPhase, Duration)>,
}

impl RenderTiming {
    /// Start timing; the render is in [`RenderPhase::Building`].
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            marks: vec![(RenderPhase::Building, Duration::ZERO)],
        }
    }

    /// Record entry into a phase.
    pub fn mark(&mut self, phase: RenderPhase) {
        debug_assert!(
            self.marks.last().map_or(true, |(last, _)| *last < phase),
            "render phases never go backwards"
        );
        self.marks.push((phase, self.start.elapsed()));
    }

    /// When the render entered a phase, relative to the start.
    pub fn entered(&self, phase: RenderPhase) -> Option<Duration> {
        self.marks
            .iter()
            .find(|(p, _)| *p == phase)
            .map(|(_, at)| *at)
    }

    /// The current phase.
    pub fn current_phase(&self) -> RenderPhase {
        self.marks
            .last()
            .map(|(phase, _)| *phase)
            .unwrap_or(RenderPhase::Building)
    }

    /// Total elapsed time since the render started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for RenderTiming {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_in_building() {
        let timing = RenderTiming::start();
        assert_eq!(timing.current_phase(), RenderPhase::Building);
        assert_eq!(timing.entered(RenderPhase::Building), Some(Duration::ZERO));
    }

    #[test]
    fn test_marks_advance_phases() {
        let mut timing = RenderTiming::start();
        timing.mark(RenderPhase::Aggregating);
        timing.mark(RenderPhase::Substituting);
        assert_eq!(timing.current_phase(), RenderPhase::Substituting);
        assert!(timing.entered(RenderPhase::Aggregating).is_some());
        assert!(timing.entered(RenderPhase::CacheDecision).is_none());
    }

    #[test]
    fn test_phase_order() {
        assert!(RenderPhase::Building < RenderPhase::Aggregating);
        assert!(RenderPhase::Substituting < RenderPhase::Done);
    }
}
