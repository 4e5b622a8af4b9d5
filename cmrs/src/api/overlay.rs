//! Dual-valued properties.
//!
//! ConnMan reports most addressing properties twice: the value in effect
//! (`IPv4`) and the value the user asked for (`IPv4.Configuration`).
//! [`PropertyOverlay`] keeps both and resolves them with one rule: the
//! configured value wins when present, otherwise the effective one is used.
//! This keeps a freshly submitted configuration visible until the daemon
//! reports it as effective.

use serde::{Deserialize, Serialize};

/// An effective/configured value pair with configured-first precedence.
///
/// # Example
///
/// ```rust
/// use cmrs::PropertyOverlay;
///
/// let mut method = PropertyOverlay::new(Some("dhcp"), Some("manual"));
/// assert_eq!(method.resolved(), Some(&"manual"));
///
/// method.clear_configured();
/// assert_eq!(method.resolved(), Some(&"dhcp"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyOverlay<T> {
    effective: Option<T>,
    configured: Option<T>,
}

impl<T> Default for PropertyOverlay<T> {
    fn default() -> Self {
        Self {
            effective: None,
            configured: None,
        }
    }
}

impl<T> PropertyOverlay<T> {
    /// Creates an overlay from both sides.
    pub fn new(effective: Option<T>, configured: Option<T>) -> Self {
        Self {
            effective,
            configured,
        }
    }

    /// The value reported as in effect by the daemon.
    pub fn effective(&self) -> Option<&T> {
        self.effective.as_ref()
    }

    /// The value requested by the user.
    pub fn configured(&self) -> Option<&T> {
        self.configured.as_ref()
    }

    /// The value consumers should display: configured if present, else effective.
    pub fn resolved(&self) -> Option<&T> {
        self.configured.as_ref().or(self.effective.as_ref())
    }

    /// Returns `true` if a configured value is present.
    pub fn is_configured(&self) -> bool {
        self.configured.is_some()
    }

    /// Returns `true` if neither side holds a value.
    pub fn is_empty(&self) -> bool {
        self.effective.is_none() && self.configured.is_none()
    }

    /// Replaces the effective side only.
    pub fn set_effective(&mut self, value: Option<T>) {
        self.effective = value;
    }

    /// Replaces the configured side only.
    pub fn set_configured(&mut self, value: Option<T>) {
        self.configured = value;
    }

    /// Drops the configured side so the effective value shows through again.
    pub fn clear_configured(&mut self) {
        self.configured = None;
    }

    /// Replaces both sides at once.
    pub fn replace(&mut self, effective: Option<T>, configured: Option<T>) {
        self.effective = effective;
        self.configured = configured;
    }
}

impl<T: Clone + Default> PropertyOverlay<T> {
    /// The resolved value, or `T::default()` when both sides are empty.
    pub fn resolved_or_default(&self) -> T {
        self.resolved().cloned().unwrap_or_default()
    }
}
