//! Session: per-connection identity, role, and throttle state.
//!
//! DESIGN
//! ======
//! A session is owned by its websocket task and never shared, so the throttle
//! clocks need no locking. The role is fixed at connect time from the
//! `token` query parameter.
//!
//! ROLES
//! =====
//! With `ADMIN_TOKEN` configured only a session that presented the matching
//! token is `Admin`; without one every session is `Admin`. Privileged events
//! (`clearCanvas`, `adminResetBrushEffects`) from a `Participant` are refused.

use std::time::Instant;

use uuid::Uuid;

use crate::frame::{ClientEvent, EventError};
use crate::throttle::{EventClass, Throttle, ThrottleConfig};

/// The client application a session connected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interface {
    Admin,
    Atelier,
    #[default]
    Canvas,
}

impl Interface {
    /// Parse an interface label. Unknown or empty labels are the plain canvas.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "admin" => Self::Admin,
            "atelier" => Self::Atelier,
            _ => Self::Canvas,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Atelier => "atelier",
            Self::Canvas => "canvas",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Participant,
}

impl Role {
    /// Resolve the role for a connection presenting `token`.
    #[must_use]
    pub fn resolve(admin_token: Option<&str>, token: Option<&str>) -> Self {
        match admin_token {
            None => Self::Admin,
            Some(expected) if token == Some(expected) => Self::Admin,
            Some(_) => Self::Participant,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Participant => "participant",
        }
    }
}

#[derive(Debug)]
pub struct Session {
    pub client_id: Uuid,
    pub interface: Interface,
    pub role: Role,
    throttle: Throttle,
}

impl Session {
    #[must_use]
    pub fn new(client_id: Uuid, interface: Interface, role: Role) -> Self {
        Self { client_id, interface, role, throttle: Throttle::new() }
    }

    /// Build a session from the websocket query parameters.
    #[must_use]
    pub fn connect(admin_token: Option<&str>, interface: Option<&str>, token: Option<&str>) -> Self {
        Self::new(
            Uuid::new_v4(),
            interface.map(Interface::from_label).unwrap_or_default(),
            Role::resolve(admin_token, token),
        )
    }

    #[must_use]
    pub fn can_administer(&self) -> bool {
        self.role == Role::Admin
    }

    /// Refuse privileged events from non-admin sessions.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` naming the refused event.
    pub fn authorize(&self, event: &ClientEvent) -> Result<(), EventError> {
        let privileged = matches!(event, ClientEvent::ClearCanvas | ClientEvent::AdminResetBrushEffects);
        if privileged && !self.can_administer() {
            return Err(EventError::Forbidden(event.name()));
        }
        Ok(())
    }

    /// Throttle gate for `texture`.
    pub fn allow_texture(&mut self, config: &ThrottleConfig) -> bool {
        self.allow_texture_at(config, Instant::now())
    }

    pub(crate) fn allow_texture_at(&mut self, config: &ThrottleConfig, now: Instant) -> bool {
        self.throttle.allow_at(EventClass::Texture, config.texture, now)
    }

    /// Whether a `brushEffect` at `now` fits the throttle window. An
    /// `interface` named in the payload selects the window in place of the
    /// session's own. The clock only moves on `record_brush`, so an effect
    /// rejected after this check does not use up the window.
    pub fn brush_ready(&self, config: &ThrottleConfig, payload_interface: Option<&str>, now: Instant) -> bool {
        let interface = payload_interface.map_or(self.interface, Interface::from_label);
        self.throttle.ready_at(EventClass::BrushEffect, config.brush_window(interface), now)
    }

    /// Mark a `brushEffect` accepted at `now`.
    pub fn record_brush(&mut self, now: Instant) {
        self.throttle.record_at(EventClass::BrushEffect, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ErrorCode;
    use std::time::Duration;

    #[test]
    fn interface_labels() {
        assert_eq!(Interface::from_label("admin"), Interface::Admin);
        assert_eq!(Interface::from_label(" Atelier "), Interface::Atelier);
        assert_eq!(Interface::from_label("canvas"), Interface::Canvas);
        assert_eq!(Interface::from_label("kiosk"), Interface::Canvas);
        assert_eq!(Interface::from_label(""), Interface::Canvas);
    }

    #[test]
    fn without_admin_token_everyone_is_admin() {
        assert_eq!(Role::resolve(None, None), Role::Admin);
        assert_eq!(Role::resolve(None, Some("anything")), Role::Admin);
    }

    #[test]
    fn admin_token_must_match() {
        assert_eq!(Role::resolve(Some("s3cret"), Some("s3cret")), Role::Admin);
        assert_eq!(Role::resolve(Some("s3cret"), Some("guess")), Role::Participant);
        assert_eq!(Role::resolve(Some("s3cret"), None), Role::Participant);
    }

    #[test]
    fn connect_defaults_to_canvas_interface() {
        let session = Session::connect(None, None, None);
        assert_eq!(session.interface, Interface::Canvas);
        assert!(session.can_administer());
    }

    #[test]
    fn participant_cannot_clear_or_reset() {
        let session = Session::connect(Some("s3cret"), Some("canvas"), None);
        for event in [ClientEvent::ClearCanvas, ClientEvent::AdminResetBrushEffects] {
            let err = session.authorize(&event).unwrap_err();
            assert_eq!(err.error_code(), "E_FORBIDDEN");
        }
    }

    #[test]
    fn participant_may_undo_and_delete() {
        let session = Session::connect(Some("s3cret"), None, None);
        assert!(session.authorize(&ClientEvent::Undo).is_ok());
        assert!(session.authorize(&ClientEvent::DeleteShape { id: "s1".into() }).is_ok());
    }

    #[test]
    fn admin_may_clear() {
        let session = Session::connect(Some("s3cret"), Some("admin"), Some("s3cret"));
        assert!(session.authorize(&ClientEvent::ClearCanvas).is_ok());
    }

    #[test]
    fn brush_window_uses_payload_interface_when_present() {
        let config = ThrottleConfig::default();
        let mut session = Session::new(Uuid::new_v4(), Interface::Canvas, Role::Admin);
        let start = Instant::now();

        assert!(session.brush_ready(&config, Some("admin"), start));
        session.record_brush(start);
        // Admin window is 100 ms; the canvas window would still hold at 120 ms.
        let at = start + Duration::from_millis(120);
        assert!(session.brush_ready(&config, Some("admin"), at));
        assert!(!session.brush_ready(&config, None, at));
        session.record_brush(at);
        assert!(!session.brush_ready(&config, None, start + Duration::from_millis(240)));
        assert!(session.brush_ready(&config, None, start + Duration::from_millis(370)));
    }

    #[test]
    fn unrecorded_brush_leaves_window_open() {
        let config = ThrottleConfig::default();
        let mut session = Session::connect(None, None, None);
        let start = Instant::now();
        assert!(session.brush_ready(&config, None, start));
        // Rejected after the check: nothing recorded.
        assert!(session.brush_ready(&config, None, start + Duration::from_millis(1)));
        session.record_brush(start + Duration::from_millis(1));
        assert!(!session.brush_ready(&config, None, start + Duration::from_millis(2)));
    }

    #[test]
    fn texture_throttle_is_per_session() {
        let config = ThrottleConfig::default();
        let mut a = Session::connect(None, None, None);
        let mut b = Session::connect(None, None, None);
        let now = Instant::now();
        assert!(a.allow_texture_at(&config, now));
        assert!(!a.allow_texture_at(&config, now + Duration::from_millis(10)));
        assert!(b.allow_texture_at(&config, now + Duration::from_millis(10)));
    }
}
