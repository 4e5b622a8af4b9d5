//! Per-modem SIM credential entry state.
//!
//! The daemon decides which credential the SIM wants (`PinRequired`) and how
//! many attempts are left (`Retries`). This machine mirrors that and adds the
//! one state the daemon does not have: after the user typed a PUK we still
//! need a new PIN before `ResetPin` can be called, so the PUK is held in
//! [`PinState::NewPinRequired`] until then.

use std::collections::HashMap;
use std::fmt;

use crate::api::models::{ConnectivityError, PinErrorKind, PinType};
use crate::dbus::CallArgs;
use crate::types::constants::members;
use crate::Result;

/// Credential entry state of one modem.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PinState {
    /// Nothing required.
    #[default]
    None,
    /// The SIM waits for a PIN-class credential.
    PinRequired(PinType),
    /// The SIM waits for a PUK-class credential.
    PukRequired(PinType),
    /// A PUK of this kind was collected; a new PIN is needed to reset.
    NewPinRequired(PinType),
    /// PUK attempts for this kind are exhausted.
    Locked(PinType),
}

/// A SIM manager call prepared by the state machine.
#[derive(Clone, PartialEq, Eq)]
pub enum PinRequest {
    /// `EnterPin(kind, pin)`.
    Enter {
        /// Credential kind.
        kind: PinType,
        /// The PIN.
        pin: String,
    },
    /// `ResetPin(puk_kind, puk, new_pin)`.
    Reset {
        /// PUK kind.
        puk_kind: PinType,
        /// The PUK.
        puk: String,
        /// New PIN for the kind the PUK resets.
        new_pin: String,
    },
    /// `ChangePin(kind, old_pin, new_pin)`.
    Change {
        /// Credential kind.
        kind: PinType,
        /// Current PIN.
        old_pin: String,
        /// Replacement PIN.
        new_pin: String,
    },
}

impl PinRequest {
    /// SIM manager method name.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Enter { .. } => members::ENTER_PIN,
            Self::Reset { .. } => members::RESET_PIN,
            Self::Change { .. } => members::CHANGE_PIN,
        }
    }

    /// Call arguments, in bus order.
    pub fn args(&self) -> CallArgs {
        match self {
            Self::Enter { kind, pin } => CallArgs::strings([kind.as_str(), pin.as_str()]),
            Self::Reset {
                puk_kind,
                puk,
                new_pin,
            } => CallArgs::strings([puk_kind.as_str(), puk.as_str(), new_pin.as_str()]),
            Self::Change {
                kind,
                old_pin,
                new_pin,
            } => CallArgs::strings([kind.as_str(), old_pin.as_str(), new_pin.as_str()]),
        }
    }
}

impl fmt::Debug for PinRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enter { kind, .. } => write!(f, "EnterPin({kind}, ***)"),
            Self::Reset { puk_kind, .. } => write!(f, "ResetPin({puk_kind}, ***, ***)"),
            Self::Change { kind, .. } => write!(f, "ChangePin({kind}, ***, ***)"),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Default)]
struct PinAttempt {
    last_pin_type: Option<PinType>,
    pending_puk: Option<String>,
    last_error: Option<PinErrorKind>,
}

impl fmt::Debug for PinAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinAttempt")
            .field("last_pin_type", &self.last_pin_type)
            .field("pending_puk", &self.pending_puk.as_ref().map(|_| "***"))
            .field("last_error", &self.last_error)
            .finish()
    }
}

/// Credential entry state machine for one modem.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PinStateMachine {
    state: PinState,
    attempt: PinAttempt,
}

impl PinStateMachine {
    /// Current state.
    pub fn state(&self) -> &PinState {
        &self.state
    }

    /// Classification of the last failed operation, cleared on success.
    pub fn last_error(&self) -> Option<PinErrorKind> {
        self.attempt.last_error
    }

    /// Kind of the last credential submitted.
    pub fn last_pin_type(&self) -> Option<&PinType> {
        self.attempt.last_pin_type.as_ref()
    }

    /// Returns `true` while a PUK is held waiting for the new PIN.
    pub fn has_pending_puk(&self) -> bool {
        self.attempt.pending_puk.is_some()
    }

    /// Re-derives the state from daemon data.
    ///
    /// A collected PUK survives as long as the daemon keeps asking for the
    /// same PUK kind; anything else discards it.
    pub(crate) fn sync(&mut self, required: Option<&PinType>, retries: &HashMap<PinType, u8>) {
        let next = match required {
            None => PinState::None,
            Some(kind) if kind.is_puk() => {
                if retries.get(kind) == Some(&0) {
                    PinState::Locked(kind.clone())
                } else if self.state == PinState::NewPinRequired(kind.clone()) {
                    PinState::NewPinRequired(kind.clone())
                } else {
                    PinState::PukRequired(kind.clone())
                }
            }
            Some(kind) => PinState::PinRequired(kind.clone()),
        };

        if !matches!(next, PinState::NewPinRequired(_)) {
            self.attempt.pending_puk = None;
        }
        self.state = next;
    }

    /// Prepares `EnterPin` for the credential the SIM is waiting for.
    pub(crate) fn begin_enter_pin(&mut self, pin: &str) -> Result<PinRequest> {
        let PinState::PinRequired(kind) = &self.state else {
            return Err(self.unexpected("no PIN is required"));
        };
        let kind = kind.clone();

        kind.validate(pin)?;
        self.attempt.last_pin_type = Some(kind.clone());

        Ok(PinRequest::Enter {
            kind,
            pin: pin.to_string(),
        })
    }

    /// Stores a PUK and moves to [`PinState::NewPinRequired`].
    pub(crate) fn submit_puk(&mut self, puk: &str) -> Result<()> {
        let PinState::PukRequired(kind) = &self.state else {
            return Err(self.unexpected("no PUK is required"));
        };
        let kind = kind.clone();

        kind.validate(puk)?;
        self.attempt.last_pin_type = Some(kind.clone());
        self.attempt.pending_puk = Some(puk.to_string());
        self.state = PinState::NewPinRequired(kind);
        Ok(())
    }

    /// Prepares `ResetPin` from the held PUK and a new PIN.
    pub(crate) fn begin_reset_pin(&mut self, new_pin: &str) -> Result<PinRequest> {
        let PinState::NewPinRequired(puk_kind) = &self.state else {
            return Err(self.unexpected("no PUK has been collected"));
        };
        let puk_kind = puk_kind.clone();

        let target = puk_kind
            .reset_target()
            .ok_or_else(|| self.unexpected("PUK kind resets no PIN"))?;
        target.validate(new_pin)?;

        let puk = self
            .attempt
            .pending_puk
            .clone()
            .ok_or_else(|| self.unexpected("PUK is missing"))?;

        Ok(PinRequest::Reset {
            puk_kind,
            puk,
            new_pin: new_pin.to_string(),
        })
    }

    /// Prepares `ChangePin`, validating both PINs against `kind`.
    pub(crate) fn begin_change_pin(
        &mut self,
        kind: &PinType,
        old_pin: &str,
        new_pin: &str,
    ) -> Result<PinRequest> {
        if !kind.is_pin() {
            return Err(ConnectivityError::UnexpectedPinState(format!(
                "{kind} cannot be changed"
            )));
        }
        kind.validate(old_pin)?;
        kind.validate(new_pin)?;
        self.attempt.last_pin_type = Some(kind.clone());

        Ok(PinRequest::Change {
            kind: kind.clone(),
            old_pin: old_pin.to_string(),
            new_pin: new_pin.to_string(),
        })
    }

    /// Applies the outcome of a finished request.
    ///
    /// Returns the classification of the failure, if any. Retry counters are
    /// not touched here; the daemon reports them through `Retries`.
    pub(crate) fn complete(
        &mut self,
        request: &PinRequest,
        result: &Result<()>,
    ) -> Option<PinErrorKind> {
        match result {
            Ok(()) => {
                self.attempt.last_error = None;
                match request {
                    PinRequest::Enter { kind, .. } if self.state == PinState::PinRequired(kind.clone()) => {
                        self.state = PinState::None;
                    }
                    PinRequest::Reset { .. } => {
                        self.attempt.pending_puk = None;
                        self.state = PinState::None;
                    }
                    _ => {}
                }
                None
            }
            Err(err) => {
                let kind = PinErrorKind::classify(err);
                self.attempt.last_error = Some(kind);
                if let PinRequest::Reset { puk_kind, .. } = request {
                    self.attempt.pending_puk = None;
                    if self.state == PinState::NewPinRequired(puk_kind.clone()) {
                        self.state = PinState::PukRequired(puk_kind.clone());
                    }
                }
                Some(kind)
            }
        }
    }

    fn unexpected(&self, what: &str) -> ConnectivityError {
        ConnectivityError::UnexpectedPinState(format!("{what} (state {:?})", self.state))
    }
}
