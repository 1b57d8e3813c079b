//! Periodic display producers: the home-page clock and the loading animation.
//!
//! Both producers run as link tasks and read shared state that only the
//! sequencer writes: [`ClockGate`] decides whether the clock may draw, and
//! [`Animation`] holds whether the loading waveform is visible and which object
//! it targets.

use super::pages;
use crate::link::Produced;
use chrono::{Local, Timelike};
use parking_lot::Mutex;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Ticks in one full sine period of the loading waveform.
const ANIMATION_TICKS: u32 = 32;

/// Whether the clock producer may enqueue frames.
#[derive(Debug, Clone)]
pub struct ClockGate(Arc<AtomicBool>);

impl ClockGate {
    /// The fixture boots on the home page, so the gate starts open.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn set_open(&self, open: bool) {
        self.0.store(open, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Producer sending the current hour and minute while the gate is open.
    pub fn producer(&self) -> impl FnMut() -> Produced + Send + 'static {
        let gate = self.clone();
        move || {
            if !gate.is_open() {
                return Produced::Nothing;
            }
            let now = Local::now();
            clock_frames(now.hour(), now.minute()).into()
        }
    }
}

impl Default for ClockGate {
    fn default() -> Self {
        Self::new()
    }
}

pub fn clock_frames(hour: u32, minute: u32) -> Vec<String> {
    vec![
        pages::set_text("hourTxt", &format!("{:02}", hour)),
        pages::set_text("minuteTxt", &format!("{:02}", minute)),
    ]
}

/// Loading animation visibility and target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnimationState {
    pub visible: bool,
    pub target: u32,
}

/// Shared handle on the [`AnimationState`].
#[derive(Debug, Clone, Default)]
pub struct Animation {
    state: Arc<Mutex<AnimationState>>,
}

impl Animation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&self, target: u32) {
        *self.state.lock() = AnimationState {
            visible: true,
            target,
        };
    }

    pub fn hide(&self) {
        self.state.lock().visible = false;
    }

    /// Flip visibility; returns the new visibility.
    pub fn toggle(&self, target: u32) -> bool {
        let mut state = self.state.lock();
        state.visible = !state.visible;
        state.target = target;
        state.visible
    }

    pub fn snapshot(&self) -> AnimationState {
        *self.state.lock()
    }

    /// Producer emitting one tick of the waveform per call while visible.
    ///
    /// The tick counter lives in the closure and restarts whenever the
    /// animation is hidden.
    pub fn producer(&self) -> impl FnMut() -> Produced + Send + 'static {
        let animation = self.clone();
        let mut tick = 0u32;
        move || {
            let state = animation.snapshot();
            if !state.visible {
                tick = 0;
                return Produced::Nothing;
            }
            let frames = loading_frames(tick, state.target);
            tick = (tick + 1) % ANIMATION_TICKS;
            frames.into()
        }
    }
}

/// The four `add` frames for one animation tick.
pub fn loading_frames(tick: u32, target: u32) -> Vec<String> {
    let base = (100.0 * (f64::from(tick) * PI / 16.0).sin()) as i32 + 150;
    (0u8..4)
        .map(|channel| pages::waveform_point(target, channel, channel_value(base, channel)))
        .collect()
}

/// Offset `base` for `channel`, folding out-of-range values back into 0..=255.
pub fn channel_value(base: i32, channel: u8) -> u8 {
    let offset = i32::from(channel) * 10;
    let value = base - offset;
    let folded = if value < 0 {
        offset
    } else if value > 255 {
        255 - offset
    } else {
        value
    };
    folded.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_sits_on_the_baseline() {
        assert_eq!(
            loading_frames(0, 7),
            vec!["add 7,0,150", "add 7,1,140", "add 7,2,130", "add 7,3,120"]
        );
    }

    #[test]
    fn peak_and_half_period() {
        assert_eq!(loading_frames(8, 3)[0], "add 3,0,250");
        assert_eq!(loading_frames(16, 3)[0], "add 3,0,150");
    }

    #[test]
    fn channel_values_fold_at_the_edges() {
        assert_eq!(channel_value(-5, 2), 20);
        assert_eq!(channel_value(300, 1), 245);
        assert_eq!(channel_value(300, 0), 255);
    }

    #[test]
    fn hidden_animation_resets_counter() {
        let animation = Animation::new();
        let mut produce = animation.producer();
        assert_eq!(produce(), Produced::Nothing);

        animation.show(7);
        let first = produce();
        let _second = produce();
        animation.hide();
        assert_eq!(produce(), Produced::Nothing);

        animation.show(7);
        assert_eq!(produce(), first);
    }

    #[test]
    fn toggle_flips_visibility() {
        let animation = Animation::new();
        assert!(animation.toggle(2));
        assert_eq!(
            animation.snapshot(),
            AnimationState {
                visible: true,
                target: 2
            }
        );
        assert!(!animation.toggle(2));
    }

    #[test]
    fn clock_is_zero_padded_and_gated() {
        assert_eq!(
            clock_frames(9, 5),
            vec!["hourTxt.txt=\"09\"", "minuteTxt.txt=\"05\""]
        );

        let gate = ClockGate::new();
        let mut produce = gate.producer();
        assert!(matches!(produce(), Produced::Frames(frames) if frames.len() == 2));
        gate.set_open(false);
        assert_eq!(produce(), Produced::Nothing);
    }
}
