//! Click pulse sequencer.
//!
//! The engine reports a multi-click as one [`Action::Click`] with a count;
//! HID needs discrete button-down/button-up reports with real time between
//! them. The sequencer expands the count into timed pulses, advancing one
//! step per host poll cycle and never blocking.
//!
//! [`Action::Click`]: crate::types::Action::Click

/// How long the button stays logically pressed within one click.
pub const CLICK_PRESS_MS: u64 = 10;
/// Gap between the clicks of a multi-click sequence.
pub const CLICK_GAP_MS: u64 = 30;

/// Consecutive not-ready poll cycles tolerated before the remaining sequence
/// is discarded.
const SINK_STALL_MAX: u8 = 5;

/// Button report the host forwards to its HID stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonReport {
    Press,
    Release,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum ClickPhase {
    #[default]
    Idle,
    Pressed,
    Released,
}

/// Non-blocking scheduler turning a click count into button pulses.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClickSequencer {
    pending_clicks: u8,
    phase: ClickPhase,
    phase_change_ms: u64,
    stalled_cycles: u8,
}

impl ClickSequencer {
    pub const fn new() -> Self {
        Self {
            pending_clicks: 0,
            phase: ClickPhase::Idle,
            phase_change_ms: 0,
            stalled_cycles: 0,
        }
    }

    /// Queues `count` clicks, replacing any unfinished sequence.
    pub fn queue(&mut self, count: u8, now_ms: u64) {
        self.pending_clicks = count;
        self.phase = ClickPhase::Idle;
        self.phase_change_ms = now_ms;
        self.stalled_cycles = 0;
    }

    /// True once every queued pulse has been handed out.
    pub fn is_idle(&self) -> bool {
        self.pending_clicks == 0 && self.phase == ClickPhase::Idle
    }

    /// Advances the sequence by at most one report.
    ///
    /// `sink_ready` is the HID stack's readiness this cycle. While the sink
    /// is not ready the sequencer holds its state and retries; after
    /// [`SINK_STALL_MAX`] consecutive stalled cycles the remaining sequence
    /// is discarded. A lost click is recoverable by the user; a sequencer
    /// wedged on a dead sink is not.
    pub fn step(&mut self, now_ms: u64, sink_ready: bool) -> Option<ButtonReport> {
        if self.is_idle() {
            return None;
        }

        if !sink_ready {
            self.stalled_cycles = self.stalled_cycles.saturating_add(1);
            if self.stalled_cycles > SINK_STALL_MAX {
                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "click sink stalled for {} cycles, discarding {} pending clicks",
                    self.stalled_cycles,
                    self.pending_clicks
                );
                self.cancel();
            }
            return None;
        }
        self.stalled_cycles = 0;

        let elapsed = now_ms.saturating_sub(self.phase_change_ms);
        match self.phase {
            ClickPhase::Idle => {
                self.phase = ClickPhase::Pressed;
                self.phase_change_ms = now_ms;
                Some(ButtonReport::Press)
            }
            ClickPhase::Pressed if elapsed >= CLICK_PRESS_MS => {
                self.phase = ClickPhase::Released;
                self.phase_change_ms = now_ms;
                self.pending_clicks = self.pending_clicks.saturating_sub(1);
                Some(ButtonReport::Release)
            }
            ClickPhase::Released if self.pending_clicks == 0 || elapsed >= CLICK_GAP_MS => {
                self.phase = ClickPhase::Idle;
                None
            }
            _ => None,
        }
    }

    /// Drops whatever is left of the current sequence.
    pub fn cancel(&mut self) {
        self.pending_clicks = 0;
        self.phase = ClickPhase::Idle;
        self.stalled_cycles = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Polls at 5 ms cadence with a ready sink, collecting reports.
    fn run_ready(
        sequencer: &mut ClickSequencer,
        start_ms: u64,
        cycles: u32,
        out: &mut std::vec::Vec<(u64, ButtonReport)>,
    ) -> u64 {
        let mut now = start_ms;
        for _ in 0..cycles {
            if let Some(report) = sequencer.step(now, true) {
                out.push((now, report));
            }
            now += 5;
        }
        now
    }

    #[test]
    fn single_click_is_one_press_release_pulse() {
        let mut sequencer = ClickSequencer::new();
        let mut reports = std::vec::Vec::new();

        sequencer.queue(1, 0);
        run_ready(&mut sequencer, 0, 20, &mut reports);

        let kinds: std::vec::Vec<_> = reports.iter().map(|(_, r)| *r).collect();
        assert_eq!(kinds, std::vec![ButtonReport::Press, ButtonReport::Release]);
        assert!(sequencer.is_idle());

        // Press must stay down for the configured pulse width.
        assert!(reports[1].0 - reports[0].0 >= CLICK_PRESS_MS);
    }

    #[test]
    fn double_click_spaces_pulses_by_the_gap() {
        let mut sequencer = ClickSequencer::new();
        let mut reports = std::vec::Vec::new();

        sequencer.queue(2, 0);
        run_ready(&mut sequencer, 0, 40, &mut reports);

        let kinds: std::vec::Vec<_> = reports.iter().map(|(_, r)| *r).collect();
        assert_eq!(
            kinds,
            std::vec![
                ButtonReport::Press,
                ButtonReport::Release,
                ButtonReport::Press,
                ButtonReport::Release,
            ]
        );
        // Second press waits out the inter-click gap after the first release.
        assert!(reports[2].0 - reports[1].0 >= CLICK_GAP_MS);
        assert!(sequencer.is_idle());
    }

    #[test]
    fn brief_sink_stall_delays_without_losing_reports() {
        let mut sequencer = ClickSequencer::new();
        let mut reports = std::vec::Vec::new();

        sequencer.queue(1, 0);

        // Three not-ready cycles: nothing emitted, nothing lost.
        for cycle in 0..3u64 {
            assert_eq!(sequencer.step(cycle * 5, false), None);
        }
        assert!(!sequencer.is_idle());

        run_ready(&mut sequencer, 15, 20, &mut reports);
        let kinds: std::vec::Vec<_> = reports.iter().map(|(_, r)| *r).collect();
        assert_eq!(kinds, std::vec![ButtonReport::Press, ButtonReport::Release]);
    }

    #[test]
    fn prolonged_sink_stall_discards_the_sequence() {
        let mut sequencer = ClickSequencer::new();

        sequencer.queue(3, 0);
        for cycle in 0..10u64 {
            assert_eq!(sequencer.step(cycle * 5, false), None);
        }

        assert!(sequencer.is_idle());
        // Recovered sink gets nothing: the sequence is gone.
        assert_eq!(sequencer.step(100, true), None);
    }

    #[test]
    fn requeue_replaces_an_unfinished_sequence() {
        let mut sequencer = ClickSequencer::new();
        let mut reports = std::vec::Vec::new();

        sequencer.queue(4, 0);
        assert_eq!(sequencer.step(0, true), Some(ButtonReport::Press));

        sequencer.queue(1, 5);
        run_ready(&mut sequencer, 5, 20, &mut reports);

        // Only the replacement sequence plays out.
        let presses = reports
            .iter()
            .filter(|(_, r)| *r == ButtonReport::Press)
            .count();
        assert_eq!(presses, 1);
        assert!(sequencer.is_idle());
    }
}
