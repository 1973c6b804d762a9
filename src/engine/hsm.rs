use statig::prelude::*;
use statig::Response as Outcome;

use crate::{
    config::{TrackpadConfig, Tuning},
    filter,
    types::{Action, ActionBuffer, Phase, Point, TouchEvent, Zone},
    zone,
};

/// Input dispatched into the state machine.
#[derive(Clone, Copy, Debug)]
pub(crate) enum EngineEvent {
    Touch { event: TouchEvent, now_ms: u64 },
    Tick { now_ms: u64 },
}

/// Collects the actions produced while handling one event.
#[derive(Debug, Default)]
pub(crate) struct DispatchContext {
    pub(crate) actions: ActionBuffer,
}

impl DispatchContext {
    fn emit(&mut self, action: Action) {
        self.actions.push(action);
    }
}

/// Shared storage of the gesture state machine.
///
/// `phase` mirrors the active state for the host-facing status surface; it is
/// updated exclusively through the `enter_*` helpers so it cannot drift from
/// the machine.
pub(crate) struct TrackpadHsm {
    config: TrackpadConfig,
    phase: Phase,
    touch_start: Point,
    last_pos: Point,
    touch_down_ms: u64,
    last_sample_ms: u64,
    last_release_ms: u64,
    tap_count: u8,
    total_movement: i32,
    button_held: bool,
    vx_smooth: f32,
    vy_smooth: f32,
    accum_x: f32,
    accum_y: f32,
    scroll_accum_v: f32,
    scroll_accum_h: f32,
    chain_start_zone: Zone,
    touched: bool,
}

impl TrackpadHsm {
    pub(crate) fn new(config: TrackpadConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            touch_start: Point::default(),
            last_pos: Point::default(),
            touch_down_ms: 0,
            last_sample_ms: 0,
            last_release_ms: 0,
            tap_count: 0,
            total_movement: 0,
            button_held: false,
            vx_smooth: 0.0,
            vy_smooth: 0.0,
            accum_x: 0.0,
            accum_y: 0.0,
            scroll_accum_v: 0.0,
            scroll_accum_h: 0.0,
            chain_start_zone: Zone::Main,
            touched: false,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn last_pos(&self) -> Point {
        self.last_pos
    }

    pub(crate) fn is_touched(&self) -> bool {
        self.touched
    }

    pub(crate) fn current_zone(&self) -> Zone {
        self.zone_at(self.last_pos.x, self.last_pos.y)
    }

    #[cfg(test)]
    pub(crate) fn tap_count(&self) -> u8 {
        self.tap_count
    }

    #[cfg(test)]
    pub(crate) fn button_held(&self) -> bool {
        self.button_held
    }

    #[cfg(test)]
    pub(crate) fn accumulators(&self) -> (f32, f32, f32, f32) {
        (
            self.accum_x,
            self.accum_y,
            self.scroll_accum_v,
            self.scroll_accum_h,
        )
    }

    fn tuning(&self) -> Tuning {
        self.config.tuning
    }

    fn zone_at(&self, x: i32, y: i32) -> Zone {
        zone::classify(
            x,
            y,
            self.config.hres,
            self.config.vres,
            self.config.scroll_zone_w,
            self.config.scroll_zone_h,
        )
    }

    // ---- state-entry helpers; the only writers of `phase` ----

    fn enter_idle(&mut self) -> State {
        self.phase = Phase::Idle;
        State::idle()
    }

    fn enter_down(&mut self) -> State {
        self.phase = Phase::Down;
        State::down()
    }

    fn enter_moving(&mut self) -> State {
        self.phase = Phase::Moving;
        State::moving()
    }

    fn enter_scrolling(&mut self) -> State {
        self.phase = Phase::Scrolling;
        State::scrolling()
    }

    fn enter_chain_wait(&mut self) -> State {
        self.phase = Phase::WaitingForChain;
        State::chain_wait()
    }

    fn enter_chain_touch(&mut self) -> State {
        self.phase = Phase::WaitingForChain;
        State::chain_touch()
    }

    fn enter_dragging(&mut self) -> State {
        self.phase = Phase::Dragging;
        State::dragging()
    }

    /// Starts a fresh contact and routes it by the zone captured at press.
    fn enter_contact(&mut self, now_ms: u64, x: i32, y: i32) -> State {
        self.begin_press(now_ms, x, y);
        if self.chain_start_zone.is_scroll() {
            self.enter_scrolling()
        } else {
            self.enter_down()
        }
    }

    // ---- contact bookkeeping ----

    fn begin_press(&mut self, now_ms: u64, x: i32, y: i32) {
        self.touch_start = Point::new(x, y);
        self.last_pos = self.touch_start;
        self.touch_down_ms = now_ms;
        self.last_sample_ms = now_ms;
        self.total_movement = 0;
        self.vx_smooth = 0.0;
        self.vy_smooth = 0.0;
        self.accum_x = 0.0;
        self.accum_y = 0.0;
        self.scroll_accum_v = 0.0;
        self.scroll_accum_h = 0.0;
        self.chain_start_zone = self.zone_at(x, y);
        self.touched = true;
    }

    /// Records one move sample; returns the raw deltas.
    fn observe_move(&mut self, x: i32, y: i32) -> (i32, i32) {
        let dx = x - self.last_pos.x;
        let dy = y - self.last_pos.y;
        self.last_pos = Point::new(x, y);
        self.total_movement = self.total_movement.saturating_add(dx.abs() + dy.abs());
        (dx, dy)
    }

    fn net_displacement(&self) -> i32 {
        (self.last_pos.x - self.touch_start.x).abs() + (self.last_pos.y - self.touch_start.y).abs()
    }

    fn release_is_tap(&self, now_ms: u64) -> bool {
        let duration = now_ms.saturating_sub(self.touch_down_ms);
        classify_tap(duration, self.net_displacement(), &self.config.tuning) == TapVerdict::Tap
    }

    // ---- conditioning and emission ----

    /// Runs one non-jitter delta through smoothing, acceleration and the
    /// sub-pixel accumulators. Returns the whole-pixel output, if any.
    fn pointer_delta(&mut self, dx_raw: i32, dy_raw: i32, now_ms: u64) -> Option<(i32, i32)> {
        let tuning = self.tuning();
        let fdx = filter::filter_jitter(dx_raw, tuning.jitter_px) as f32;
        let fdy = filter::filter_jitter(dy_raw, tuning.jitter_px) as f32;

        let dt_ms = now_ms.saturating_sub(self.last_sample_ms).max(1);
        self.last_sample_ms = now_ms;
        let per_second = 1000.0 / dt_ms as f32;
        self.vx_smooth = filter::ewma(self.vx_smooth, fdx * per_second, tuning.alpha);
        self.vy_smooth = filter::ewma(self.vy_smooth, fdy * per_second, tuning.alpha);
        let speed = filter::speed(self.vx_smooth, self.vy_smooth);

        let (dx_out, rest_x) =
            filter::carry_subpixel(self.accum_x, filter::apply_acceleration(fdx, speed, &tuning));
        let (dy_out, rest_y) =
            filter::carry_subpixel(self.accum_y, filter::apply_acceleration(fdy, speed, &tuning));
        self.accum_x = rest_x;
        self.accum_y = rest_y;

        if dx_out == 0 && dy_out == 0 {
            None
        } else {
            Some((dx_out, dy_out))
        }
    }

    /// Emits cursor motion, as a drag move while the button is held.
    fn emit_move(&self, context: &mut DispatchContext, dx: i32, dy: i32) {
        let dx = filter::clamp_report(dx);
        let dy = filter::clamp_report(dy);
        context.emit(if self.button_held {
            Action::DragMove { dx, dy }
        } else {
            Action::Move { dx, dy }
        });
    }

    /// Handles a conditioned pointer sample shared by `moving` and
    /// `dragging`: jitter keeps the clock fresh, real motion emits.
    fn pointer_sample(&mut self, context: &mut DispatchContext, dx: i32, dy: i32, now_ms: u64) {
        if filter::is_jitter(dx, dy, self.tuning().jitter_px) {
            self.last_sample_ms = now_ms;
        } else if let Some((dx_out, dy_out)) = self.pointer_delta(dx, dy, now_ms) {
            self.emit_move(context, dx_out, dy_out);
        }
    }

    /// Accumulates scroll travel for the zone locked at press time and emits
    /// whole units. The vertical axis is inverted: finger down scrolls
    /// content down.
    fn scroll_update(&mut self, context: &mut DispatchContext, dx_raw: i32, dy_raw: i32) {
        let sensitivity = self.tuning().scroll_sensitivity_px;

        if matches!(self.chain_start_zone, Zone::ScrollV | Zone::ScrollCorner) {
            let (units, rest) =
                filter::carry_subpixel(self.scroll_accum_v, dy_raw as f32 / sensitivity);
            self.scroll_accum_v = rest;
            if units != 0 {
                context.emit(Action::ScrollV {
                    units: filter::clamp_report(-units),
                });
            }
        }

        if matches!(self.chain_start_zone, Zone::ScrollH | Zone::ScrollCorner) {
            let (units, rest) =
                filter::carry_subpixel(self.scroll_accum_h, dx_raw as f32 / sensitivity);
            self.scroll_accum_h = rest;
            if units != 0 {
                context.emit(Action::ScrollH {
                    units: filter::clamp_report(units),
                });
            }
        }
    }

    /// Reports the banked tap chain as one click action.
    fn flush_chain(&mut self, context: &mut DispatchContext) {
        if self.tap_count > 0 {
            context.emit(Action::Click {
                count: self.tap_count.min(4),
            });
            self.tap_count = 0;
        }
    }

    fn start_drag(&mut self, context: &mut DispatchContext) {
        self.tap_count = 0;
        self.button_held = true;
        context.emit(Action::DragStart);
    }

    fn end_drag(&mut self, context: &mut DispatchContext) {
        self.button_held = false;
        context.emit(Action::DragEnd);
    }

    fn chain_window_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_release_ms) >= self.tuning().multi_tap_window_ms
    }

    fn drag_hold_elapsed(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.touch_down_ms) >= self.tuning().drag_hold_ms
            && self.net_displacement() < self.tuning().tap_move_px
    }
}

#[state_machine(initial = "State::idle()")]
impl TrackpadHsm {
    #[state]
    fn idle(&mut self, context: &mut DispatchContext, event: &EngineEvent) -> Outcome<State> {
        let _ = context;
        match event {
            EngineEvent::Touch {
                event: TouchEvent::Pressed { x, y },
                now_ms,
            } => Transition(self.enter_contact(*now_ms, *x, *y)),
            EngineEvent::Touch { .. } => Handled,
            EngineEvent::Tick { .. } => Handled,
        }
    }

    #[state]
    fn down(&mut self, context: &mut DispatchContext, event: &EngineEvent) -> Outcome<State> {
        match event {
            EngineEvent::Touch {
                event: TouchEvent::Pressing { x, y },
                now_ms,
            } => {
                let (dx, dy) = self.observe_move(*x, *y);
                let tuning = self.tuning();
                // Jitter-sized samples never promote to Moving; that is what
                // keeps a trembling but stationary contact classifiable as a
                // tap on release.
                if !filter::is_jitter(dx, dy, tuning.jitter_px)
                    && self.total_movement > tuning.tap_move_px
                {
                    if let Some((dx_out, dy_out)) = self.pointer_delta(dx, dy, *now_ms) {
                        self.emit_move(context, dx_out, dy_out);
                    }
                    return Transition(self.enter_moving());
                }
                self.last_sample_ms = *now_ms;
                Handled
            }
            EngineEvent::Touch {
                event: TouchEvent::Released { .. },
                now_ms,
            } => {
                self.touched = false;
                if self.release_is_tap(*now_ms) {
                    self.tap_count = 1;
                    self.last_release_ms = *now_ms;
                    Transition(self.enter_chain_wait())
                } else {
                    // Bounce, hold or slow swipe: no click.
                    Transition(self.enter_idle())
                }
            }
            EngineEvent::Touch {
                event: TouchEvent::Pressed { x, y },
                now_ms,
            } => {
                // Missed release: restart the contact from here.
                Transition(self.enter_contact(*now_ms, *x, *y))
            }
            EngineEvent::Tick { .. } => Handled,
        }
    }

    #[state]
    fn moving(&mut self, context: &mut DispatchContext, event: &EngineEvent) -> Outcome<State> {
        match event {
            EngineEvent::Touch {
                event: TouchEvent::Pressing { x, y },
                now_ms,
            } => {
                let (dx, dy) = self.observe_move(*x, *y);
                self.pointer_sample(context, dx, dy, *now_ms);
                Handled
            }
            EngineEvent::Touch {
                event: TouchEvent::Released { .. },
                ..
            } => {
                // Too much travel to be a tap.
                self.touched = false;
                Transition(self.enter_idle())
            }
            EngineEvent::Touch {
                event: TouchEvent::Pressed { x, y },
                now_ms,
            } => Transition(self.enter_contact(*now_ms, *x, *y)),
            EngineEvent::Tick { .. } => Handled,
        }
    }

    #[state]
    fn scrolling(&mut self, context: &mut DispatchContext, event: &EngineEvent) -> Outcome<State> {
        match event {
            EngineEvent::Touch {
                event: TouchEvent::Pressing { x, y },
                now_ms,
            } => {
                let (dx, dy) = self.observe_move(*x, *y);
                self.scroll_update(context, dx, dy);
                self.last_sample_ms = *now_ms;
                Handled
            }
            EngineEvent::Touch {
                event: TouchEvent::Released { .. },
                ..
            } => {
                self.touched = false;
                Transition(self.enter_idle())
            }
            EngineEvent::Touch {
                event: TouchEvent::Pressed { x, y },
                now_ms,
            } => Transition(self.enter_contact(*now_ms, *x, *y)),
            EngineEvent::Tick { .. } => Handled,
        }
    }

    /// A valid tap happened; holding the click back for up to the chain
    /// window in case another tap (or a drag) follows.
    #[state]
    fn chain_wait(&mut self, context: &mut DispatchContext, event: &EngineEvent) -> Outcome<State> {
        match event {
            EngineEvent::Touch {
                event: TouchEvent::Pressed { x, y },
                now_ms,
            } => {
                if self.chain_window_expired(*now_ms) {
                    // The window lapsed before a tick flushed it: report the
                    // chain, then treat this press as a fresh contact.
                    self.flush_chain(context);
                    return Transition(self.enter_contact(*now_ms, *x, *y));
                }
                self.begin_press(*now_ms, *x, *y);
                if self.chain_start_zone.is_scroll() {
                    // Zone lock wins over chaining.
                    self.flush_chain(context);
                    Transition(self.enter_scrolling())
                } else {
                    Transition(self.enter_chain_touch())
                }
            }
            EngineEvent::Tick { now_ms } => {
                if self.chain_window_expired(*now_ms) {
                    self.flush_chain(context);
                    Transition(self.enter_idle())
                } else {
                    Handled
                }
            }
            EngineEvent::Touch { .. } => Handled,
        }
    }

    /// Follow-up contact of a tap chain: may become another tap, a drag, or
    /// plain cursor movement.
    #[state]
    fn chain_touch(
        &mut self,
        context: &mut DispatchContext,
        event: &EngineEvent,
    ) -> Outcome<State> {
        match event {
            EngineEvent::Touch {
                event: TouchEvent::Pressing { x, y },
                now_ms,
            } => {
                let (dx, dy) = self.observe_move(*x, *y);
                let tuning = self.tuning();

                if self.drag_hold_elapsed(*now_ms) {
                    self.start_drag(context);
                    self.pointer_sample(context, dx, dy, *now_ms);
                    return Transition(self.enter_dragging());
                }

                if self.net_displacement() >= tuning.drag_move_px {
                    // A firm pull straight after a tap starts the drag
                    // without waiting out the hold timer.
                    self.start_drag(context);
                    self.pointer_sample(context, dx, dy, *now_ms);
                    return Transition(self.enter_dragging());
                }

                if !filter::is_jitter(dx, dy, tuning.jitter_px)
                    && self.total_movement > tuning.tap_move_px
                {
                    // Not a chained tap after all: report the taps already
                    // banked, then steer the cursor from here.
                    self.flush_chain(context);
                    if let Some((dx_out, dy_out)) = self.pointer_delta(dx, dy, *now_ms) {
                        self.emit_move(context, dx_out, dy_out);
                    }
                    return Transition(self.enter_moving());
                }

                self.last_sample_ms = *now_ms;
                Handled
            }
            EngineEvent::Touch {
                event: TouchEvent::Released { .. },
                now_ms,
            } => {
                self.touched = false;
                if self.release_is_tap(*now_ms) {
                    self.tap_count = self.tap_count.saturating_add(1);
                    self.last_release_ms = *now_ms;
                    Transition(self.enter_chain_wait())
                } else {
                    // The follow-up was not a tap; the banked clicks still
                    // happened.
                    self.flush_chain(context);
                    Transition(self.enter_idle())
                }
            }
            EngineEvent::Tick { now_ms } => {
                if self.drag_hold_elapsed(*now_ms) {
                    self.start_drag(context);
                    Transition(self.enter_dragging())
                } else {
                    Handled
                }
            }
            EngineEvent::Touch {
                event: TouchEvent::Pressed { x, y },
                now_ms,
            } => {
                self.begin_press(*now_ms, *x, *y);
                Handled
            }
        }
    }

    #[state]
    fn dragging(&mut self, context: &mut DispatchContext, event: &EngineEvent) -> Outcome<State> {
        match event {
            EngineEvent::Touch {
                event: TouchEvent::Pressing { x, y },
                now_ms,
            } => {
                let (dx, dy) = self.observe_move(*x, *y);
                self.pointer_sample(context, dx, dy, *now_ms);
                Handled
            }
            EngineEvent::Touch {
                event: TouchEvent::Released { .. },
                ..
            } => {
                self.touched = false;
                self.end_drag(context);
                Transition(self.enter_idle())
            }
            EngineEvent::Touch {
                event: TouchEvent::Pressed { x, y },
                now_ms,
            } => {
                // Missed release mid-drag: close the drag before restarting.
                self.end_drag(context);
                Transition(self.enter_contact(*now_ms, *x, *y))
            }
            EngineEvent::Tick { .. } => Handled,
        }
    }
}

/// Outcome of classifying a finished contact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TapVerdict {
    Tap,
    /// Too short: switch bounce or sensor glitch.
    Bounce,
    /// Too long: deliberate hold, not a tap.
    Hold,
    /// Travelled too far.
    Swipe,
}

/// Classifies a finished contact from its duration and net travel.
///
/// Durations exactly at either bound do not qualify. Net displacement under
/// the movement bound is a tap no matter how much summed travel accumulated:
/// a steady contact with hand tremor can rack up several times the bound
/// without the finger going anywhere.
pub(crate) fn classify_tap(duration_ms: u64, net_px: i32, tuning: &Tuning) -> TapVerdict {
    if duration_ms <= tuning.tap_min_ms {
        return TapVerdict::Bounce;
    }
    if duration_ms >= tuning.tap_max_ms {
        return TapVerdict::Hold;
    }
    if net_px >= tuning.tap_move_px {
        return TapVerdict::Swipe;
    }
    TapVerdict::Tap
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_bounds_are_exclusive() {
        let tuning = Tuning::default();
        assert_eq!(classify_tap(tuning.tap_min_ms, 0, &tuning), TapVerdict::Bounce);
        assert_eq!(classify_tap(tuning.tap_min_ms + 1, 0, &tuning), TapVerdict::Tap);
        assert_eq!(classify_tap(tuning.tap_max_ms - 1, 0, &tuning), TapVerdict::Tap);
        assert_eq!(classify_tap(tuning.tap_max_ms, 0, &tuning), TapVerdict::Hold);
    }

    #[test]
    fn net_travel_at_the_bound_is_a_swipe() {
        let tuning = Tuning::default();
        assert_eq!(
            classify_tap(100, tuning.tap_move_px, &tuning),
            TapVerdict::Swipe
        );
        assert_eq!(
            classify_tap(100, tuning.tap_move_px - 1, &tuning),
            TapVerdict::Tap
        );
    }

    #[test]
    fn tremor_with_small_net_travel_still_taps() {
        let tuning = Tuning::default();
        // Summed travel is irrelevant; only where the finger ended up counts.
        assert_eq!(classify_tap(100, 2, &tuning), TapVerdict::Tap);
    }
}
