//! minihsm Applet implementation
//!
//! Dispatcher for the three credential commands (ISO 7816-4 clause 11.5):
//! VERIFY, CHANGE REFERENCE DATA and RESET RETRY COUNTER, gated by the
//! applet lifecycle.

use log::{debug, info, warn};
use thiserror::Error;

use crate::apdu::{ins, Response, APDU, SW};
use crate::config::AppletConfig;
use crate::tlv::{self, tags};
use super::credential::{length_in_bounds, Credential};
use super::lifecycle::LifecycleState;

/// minihsm Application Identifier
pub const MINIHSM_AID: &[u8] = &[0xF0, 0x4D, 0x49, 0x4E, 0x49, 0x48, 0x53, 0x4D];

/// P1/P2 values accepted by the handlers
pub mod params {
    /// CHANGE REFERENCE DATA P1 when creating a credential
    pub const SET: u8 = 0x01;
    /// CHANGE REFERENCE DATA P2 selecting the PIN
    pub const TARGET_PIN: u8 = 0x01;
    /// CHANGE REFERENCE DATA P2 selecting the PUK
    pub const TARGET_PUK: u8 = 0x02;

    pub const VERIFY_P1: u8 = 0x00;
    pub const VERIFY_P2: u8 = 0x01;

    /// RESET RETRY COUNTER: PUK followed by a new PIN
    pub const RESET_NEW_PIN: u8 = 0x00;
    /// RESET RETRY COUNTER: PUK only, PIN value kept
    pub const RESET_UNBLOCK: u8 = 0x01;
    /// RESET RETRY COUNTER: report PUK tries
    pub const RESET_PUK_TRIES: u8 = 0x03;
    pub const RESET_P2: u8 = 0x01;
}

/// Every way a command can end without 9000
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("applet is terminated")]
    Terminated,

    #[error("instruction 0x{0:02X} not supported")]
    InsNotSupported(u8),

    #[error("command not allowed in the current lifecycle state")]
    NotAllowed,

    #[error("incorrect P1/P2")]
    IncorrectP1P2,

    #[error("wrong length")]
    WrongLength,

    #[error("missing or malformed reference data")]
    WrongData,

    #[error("verification failed, {0} tries remaining")]
    VerificationFailed(u8),
}

impl CommandError {
    /// The status word this outcome is reported with
    pub fn sw(self) -> u16 {
        match self {
            Self::Terminated => SW::unknown_with_state(LifecycleState::Terminated.code()),
            Self::InsNotSupported(_) => SW::INS_NOT_SUPPORTED,
            Self::NotAllowed => SW::COMMAND_NOT_ALLOWED,
            Self::IncorrectP1P2 => SW::INCORRECT_P1_P2,
            Self::WrongLength => SW::WRONG_LENGTH,
            Self::WrongData => SW::WRONG_DATA,
            Self::VerificationFailed(tries) => SW::counter_warning(tries),
        }
    }
}

type CommandResult = Result<Response, CommandError>;

/// Extract a reference value by tag, enforcing the length policy
fn reference_data(data: &[u8], tag: u32) -> Result<&[u8], CommandError> {
    match tlv::find_value(data, tag) {
        Some(value) if length_in_bounds(value.len()) => Ok(value),
        _ => Err(CommandError::WrongData),
    }
}

/// minihsm Applet
#[derive(Debug)]
pub struct MiniHsmApplet {
    config: AppletConfig,
    lifecycle: LifecycleState,
    pin: Credential,
    /// Absent until created in the creation state, never removed afterwards
    puk: Option<Credential>,
    /// PIN verified in this session
    pin_validated: bool,
}

impl MiniHsmApplet {
    /// Create a new applet in the creation state
    ///
    /// Retry maximums outside 1..=15 are clamped into range.
    pub fn new(config: AppletConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!("Clamping applet config: {}", e);
        }
        let config = config.clamped();
        Self {
            pin: Credential::new(config.pin_max_tries),
            puk: None,
            lifecycle: LifecycleState::Creation,
            pin_validated: false,
            config,
        }
    }

    /// Handle SELECT of the applet AID
    ///
    /// Selection always succeeds, even once terminated.
    pub fn select(&mut self) -> Response {
        self.pin_validated = false;
        Response::ok()
    }

    /// Process an APDU command and return the response
    pub fn process_apdu(&mut self, cmd: &APDU) -> Response {
        match self.dispatch(cmd) {
            Ok(response) => response,
            Err(e) => {
                debug!("INS {:02X} P1 {:02X} P2 {:02X} rejected: {}", cmd.ins, cmd.p1, cmd.p2, e);
                Response::error(e.sw())
            }
        }
    }

    fn dispatch(&mut self, cmd: &APDU) -> CommandResult {
        if self.lifecycle.is_terminated() {
            return Err(CommandError::Terminated);
        }

        match cmd.ins {
            ins::CHANGE_REFERENCE_DATA => self.handle_change_reference_data(cmd),
            ins::VERIFY => self.handle_verify(cmd),
            ins::RESET_RETRY_COUNTER => self.handle_reset_retry_counter(cmd),
            other => Err(CommandError::InsNotSupported(other)),
        }
    }

    // =========================================================================
    // Command Handlers
    // =========================================================================

    /// Handle CHANGE REFERENCE DATA (INS 25)
    ///
    /// Creation: `P1=01`, `P2=01` sets the PIN, `P2=02` sets the PUK.
    /// Initialization: `P1=01 P2=01` sets the PIN.
    /// Activated: `P1=00 P2=00` with `[81 L current] [82 L new]` changes the PIN.
    fn handle_change_reference_data(&mut self, cmd: &APDU) -> CommandResult {
        if cmd.data.is_empty() {
            return Err(CommandError::WrongLength);
        }

        let value = reference_data(&cmd.data, tags::REFERENCE_DATA)?;

        match self.lifecycle {
            LifecycleState::Creation => {
                if cmd.p1 != params::SET
                    || (cmd.p2 != params::TARGET_PIN && cmd.p2 != params::TARGET_PUK)
                {
                    return Err(CommandError::IncorrectP1P2);
                }

                if cmd.p2 == params::TARGET_PIN {
                    if self.config.puk_required {
                        return Err(CommandError::NotAllowed);
                    }
                    self.install_pin(value);
                    self.transition(LifecycleState::Activated);
                } else {
                    self.puk = Some(Credential::with_value(self.config.puk_max_tries, value));
                    info!("PUK created");
                    self.transition(LifecycleState::Initialization);
                }
            }
            LifecycleState::Initialization => {
                if cmd.p1 != params::SET || cmd.p2 != params::TARGET_PIN {
                    return Err(CommandError::IncorrectP1P2);
                }
                self.install_pin(value);
                self.transition(LifecycleState::Activated);
            }
            LifecycleState::Activated => {
                if cmd.p1 != 0x00 || cmd.p2 != 0x00 {
                    return Err(CommandError::IncorrectP1P2);
                }

                // The current PIN is checked before the new value is looked at
                if !self.pin.check(value) {
                    self.pin_validated = false;
                    let tries = self.pin.tries_remaining();
                    warn!("PIN change refused, {} tries remaining", tries);
                    return Err(CommandError::VerificationFailed(tries));
                }

                let new_value = reference_data(&cmd.data, tags::NEW_REFERENCE_DATA)?;
                self.install_pin(new_value);
                info!("PIN changed");
            }
            LifecycleState::Deactivated | LifecycleState::Terminated => {
                return Err(CommandError::NotAllowed);
            }
        }

        Ok(Response::ok())
    }

    /// Handle VERIFY (INS 20)
    ///
    /// Without data this reports the PIN tries instead of verifying.
    fn handle_verify(&mut self, cmd: &APDU) -> CommandResult {
        if self.lifecycle == LifecycleState::Deactivated {
            return Err(CommandError::NotAllowed);
        }

        if cmd.p1 != params::VERIFY_P1 || cmd.p2 != params::VERIFY_P2 {
            return Err(CommandError::IncorrectP1P2);
        }

        if cmd.data.is_empty() {
            return match self.lifecycle {
                // No PIN yet, nothing to authenticate against
                LifecycleState::Creation | LifecycleState::Initialization => Ok(Response::ok()),
                LifecycleState::Activated => {
                    Ok(Response::counter_warning(self.pin.tries_remaining()))
                }
                LifecycleState::Deactivated | LifecycleState::Terminated => {
                    Err(CommandError::NotAllowed)
                }
            };
        }

        if !length_in_bounds(cmd.data.len()) {
            return Err(CommandError::WrongLength);
        }

        self.pin_validated = self.pin.check(&cmd.data);
        if self.pin_validated {
            debug!("PIN verified");
            return Ok(Response::ok());
        }

        let tries = self.pin.tries_remaining();
        warn!("PIN verification failed, {} tries remaining", tries);
        if tries == 0 && self.lifecycle == LifecycleState::Activated {
            self.transition(LifecycleState::Deactivated);
        }
        Err(CommandError::VerificationFailed(tries))
    }

    /// Handle RESET RETRY COUNTER (INS 2D)
    ///
    /// Supported P1 values:
    /// - 00: `[81 L PUK] [82 L new PIN]`, PUK checked then PIN replaced
    /// - 01: `[81 L PUK]`, PIN value kept, counter restored
    /// - 03: no data, reports PUK tries
    fn handle_reset_retry_counter(&mut self, cmd: &APDU) -> CommandResult {
        if self.lifecycle != LifecycleState::Deactivated {
            return Err(CommandError::NotAllowed);
        }
        let Some(puk) = self.puk.as_mut() else {
            return Err(CommandError::NotAllowed);
        };

        let p1_supported = matches!(
            cmd.p1,
            params::RESET_NEW_PIN | params::RESET_UNBLOCK | params::RESET_PUK_TRIES
        );
        if !p1_supported || cmd.p2 != params::RESET_P2 {
            return Err(CommandError::IncorrectP1P2);
        }

        if cmd.p1 == params::RESET_PUK_TRIES {
            return Ok(Response::counter_warning(puk.tries_remaining()));
        }

        let value = reference_data(&cmd.data, tags::REFERENCE_DATA)?;

        if !puk.check(value) {
            let tries = puk.tries_remaining();
            warn!("PUK verification failed, {} tries remaining", tries);
            if tries == 0 {
                self.transition(LifecycleState::Terminated);
            }
            return Err(CommandError::VerificationFailed(tries));
        }

        if cmd.p1 == params::RESET_NEW_PIN {
            let new_value = reference_data(&cmd.data, tags::NEW_REFERENCE_DATA)?;
            self.pin.update(new_value);
            info!("PIN replaced using PUK");
        }

        self.pin.reset_and_unblock();
        self.pin_validated = false;
        self.transition(LifecycleState::Activated);
        Ok(Response::ok())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn install_pin(&mut self, value: &[u8]) {
        self.pin.update(value);
        self.pin.reset_and_unblock();
        self.pin_validated = false;
    }

    fn transition(&mut self, next: LifecycleState) {
        info!("Lifecycle {} -> {}", self.lifecycle, next);
        if next == LifecycleState::Deactivated {
            self.pin_validated = false;
        }
        self.lifecycle = next;
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    pub fn pin_tries_remaining(&self) -> u8 {
        self.pin.tries_remaining()
    }

    /// PUK tries, None while no PUK exists
    pub fn puk_tries_remaining(&self) -> Option<u8> {
        self.puk.as_ref().map(Credential::tries_remaining)
    }

    /// Whether the protected asset is unlocked for this session
    pub fn is_unlocked(&self) -> bool {
        self.lifecycle == LifecycleState::Activated && self.pin_validated
    }

    /// Reset session state (power cycle); lifecycle and credentials persist
    pub fn reset(&mut self) {
        self.pin_validated = false;
    }
}

impl Default for MiniHsmApplet {
    fn default() -> Self {
        Self::new(AppletConfig::default())
    }
}
