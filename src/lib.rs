#![cfg_attr(not(test), no_std)]

//! Touchscreen trackpad gesture engine.
//!
//! Turns a stream of raw capacitive-touch samples from a rectangular panel
//! into high-level pointing actions — move, click, multi-click, scroll, drag —
//! ready to be emitted as USB HID mouse reports. The engine is pure and
//! framework-independent: the host polling loop injects touch transitions and
//! monotonic millisecond timestamps, and gets [`Action`] values back. No
//! threads, no I/O, no clock access, no allocation beyond the fixed-size
//! state.
//!
//! ```
//! use trackpad_engine::{Action, TouchEvent, TrackpadConfig, TrackpadEngine};
//!
//! let config = TrackpadConfig::new(320, 240, 40, 40)?;
//! let mut engine = TrackpadEngine::new(config);
//!
//! // A short stationary contact is a tap; the click is reported once the
//! // multi-tap chain window has passed without a follow-up.
//! assert_eq!(
//!     engine.process_input(TouchEvent::Pressed { x: 100, y: 100 }, 0),
//!     Action::None
//! );
//! assert_eq!(
//!     engine.process_input(TouchEvent::Released { x: 100, y: 100 }, 100),
//!     Action::None
//! );
//! assert_eq!(engine.tick(450), Action::Click { count: 1 });
//! # Ok::<(), trackpad_engine::ConfigError>(())
//! ```
//!
//! A typical firmware wires it up as: touch driver frames →
//! [`SampleTracker`] → [`TrackpadEngine`] → HID sink, with
//! [`ClickSequencer`] expanding click counts into timed button pulses. Every
//! piece is deterministic, so the whole pipeline unit-tests on a host without
//! hardware.

pub mod click;
pub mod config;
pub mod engine;
pub mod filter;
pub mod sampler;
pub mod types;
pub mod zone;

pub use click::{ButtonReport, ClickSequencer};
pub use config::{ConfigError, TrackpadConfig, Tuning};
pub use engine::TrackpadEngine;
pub use sampler::{SampleTracker, TouchSample};
pub use types::{Action, EngineStatus, Phase, Point, TouchEvent, Zone};
