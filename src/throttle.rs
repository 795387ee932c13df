//! Per-session throttling for high-frequency broadcast events.
//!
//! DESIGN
//! ======
//! One last-accepted `Instant` per event class, owned by the session task, so
//! no locking is involved. An event passes when at least the class window has
//! elapsed since the last accepted one; only accepted events move the clock.
//! Dropped events are silent.
//!
//! Windows:
//! - `texture`: 100 ms
//! - `brushEffect`: 100 ms admin, 150 ms atelier, 250 ms canvas

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::env_parse;
use crate::services::session::Interface;

const DEFAULT_TEXTURE_THROTTLE_MS: u64 = 100;
const DEFAULT_BRUSH_THROTTLE_ADMIN_MS: u64 = 100;
const DEFAULT_BRUSH_THROTTLE_ATELIER_MS: u64 = 150;
const DEFAULT_BRUSH_THROTTLE_CANVAS_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    pub texture: Duration,
    pub brush_admin: Duration,
    pub brush_atelier: Duration,
    pub brush_canvas: Duration,
}

impl ThrottleConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            texture: Duration::from_millis(env_parse("TEXTURE_THROTTLE_MS", DEFAULT_TEXTURE_THROTTLE_MS)),
            brush_admin: Duration::from_millis(env_parse("BRUSH_THROTTLE_ADMIN_MS", DEFAULT_BRUSH_THROTTLE_ADMIN_MS)),
            brush_atelier: Duration::from_millis(env_parse(
                "BRUSH_THROTTLE_ATELIER_MS",
                DEFAULT_BRUSH_THROTTLE_ATELIER_MS,
            )),
            brush_canvas: Duration::from_millis(env_parse("BRUSH_THROTTLE_CANVAS_MS", DEFAULT_BRUSH_THROTTLE_CANVAS_MS)),
        }
    }

    /// Window for a brush effect sent from the given interface.
    #[must_use]
    pub fn brush_window(&self, interface: Interface) -> Duration {
        match interface {
            Interface::Admin => self.brush_admin,
            Interface::Atelier => self.brush_atelier,
            Interface::Canvas => self.brush_canvas,
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            texture: Duration::from_millis(DEFAULT_TEXTURE_THROTTLE_MS),
            brush_admin: Duration::from_millis(DEFAULT_BRUSH_THROTTLE_ADMIN_MS),
            brush_atelier: Duration::from_millis(DEFAULT_BRUSH_THROTTLE_ATELIER_MS),
            brush_canvas: Duration::from_millis(DEFAULT_BRUSH_THROTTLE_CANVAS_MS),
        }
    }
}

/// Throttled event classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    Texture,
    BrushEffect,
}

#[derive(Debug, Default)]
pub struct Throttle {
    last_accepted: HashMap<EventClass, Instant>,
}

impl Throttle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept or drop an event of `class` arriving at `now` against `window`.
    /// Only accepted events move the class clock.
    pub(crate) fn allow_at(&mut self, class: EventClass, window: Duration, now: Instant) -> bool {
        if !self.ready_at(class, window, now) {
            return false;
        }
        self.record_at(class, now);
        true
    }

    /// Whether an event of `class` at `now` would be accepted. Does not move
    /// the clock; pair with `record_at` once the event has been applied.
    pub(crate) fn ready_at(&self, class: EventClass, window: Duration, now: Instant) -> bool {
        match self.last_accepted.get(&class) {
            Some(last) => now.saturating_duration_since(*last) >= window,
            None => true,
        }
    }

    pub(crate) fn record_at(&mut self, class: EventClass, now: Instant) {
        self.last_accepted.insert(class, now);
    }
}

#[cfg(test)]
#[path = "throttle_test.rs"]
mod tests;
