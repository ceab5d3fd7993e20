//! IFD Handler for the minihsm virtual card
//!
//! A PC/SC IFD (Interface Device) handler that exposes a virtual reader
//! with one embedded card. The card hosts the minihsm applet: a PIN/PUK
//! credential gate with a small lifecycle (ISO/IEC 7816-4 VERIFY, CHANGE
//! REFERENCE DATA and RESET RETRY COUNTER).

// Allow raw pointer dereference in extern "C" functions - required for PC/SC IFD API
#![allow(clippy::not_unsafe_ptr_arg_deref)]
// Allow uppercase acronyms for Windows API type names (DWORD, LPSTR, etc.)
#![allow(clippy::upper_case_acronyms)]

pub mod apdu;
pub mod card;
pub mod config;
pub mod minihsm;
pub mod tlv;

use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::ffi::{c_char, c_uchar, c_ulong, CStr};
use std::ptr;
use std::sync::Arc;

use apdu::{ins, parse_apdu, Response, SW};
use config::AppletConfig;
use minihsm::applet::MINIHSM_AID;
use minihsm::MiniHsmApplet;

// PC/SC lite types
type DWORD = c_ulong;
type PDWORD = *mut DWORD;
type PUCHAR = *mut c_uchar;
type LPSTR = *const c_char;
type RESPONSECODE = c_ulong;
type UCHAR = c_uchar;

// Response codes
const IFD_SUCCESS: RESPONSECODE = 0;
const IFD_ERROR_TAG: RESPONSECODE = 600;
const IFD_ERROR_NOT_SUPPORTED: RESPONSECODE = 606;
const IFD_COMMUNICATION_ERROR: RESPONSECODE = 612;
const IFD_ICC_NOT_PRESENT: RESPONSECODE = 614;
const IFD_ICC_PRESENT: RESPONSECODE = 615;

// Tags for GetCapabilities
const TAG_IFD_ATR: DWORD = 0x0303;
const TAG_IFD_SLOTS_NUMBER: DWORD = 0x0FAE;
const TAG_IFD_THREAD_SAFE: DWORD = 0x0FAD;
const TAG_IFD_SLOT_THREAD_SAFE: DWORD = 0x0FBE;

// Power actions
const IFD_POWER_UP: DWORD = 500;
const IFD_POWER_DOWN: DWORD = 501;
const IFD_RESET: DWORD = 502;

const MAX_ATR_SIZE: usize = 33;
const SELECT_BY_NAME: u8 = 0x04;
const SLOT_COUNT: usize = 1;

// SCARD_IO_HEADER structure (simplified)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SCARD_IO_HEADER {
    pub protocol: DWORD,
    pub length: DWORD,
}

/// Virtual card hosting the minihsm applet
///
/// The applet lives as long as the card; powering down only clears the
/// applet's session state.
pub struct VirtualCard {
    applet: MiniHsmApplet,
    selected: bool,
    atr: Vec<u8>,
    powered: bool,
}

impl VirtualCard {
    pub fn new(config: AppletConfig) -> Self {
        Self {
            applet: MiniHsmApplet::new(config),
            selected: false,
            atr: card::create_minihsm_atr(),
            powered: false,
        }
    }

    /// Power on (or warm reset) the card and return its ATR
    pub fn power_on(&mut self) -> Vec<u8> {
        self.applet.reset();
        self.selected = false;
        self.powered = true;
        info!("Virtual card powered on");
        self.atr.clone()
    }

    pub fn power_off(&mut self) {
        self.applet.reset();
        self.selected = false;
        self.powered = false;
        info!("Virtual card powered off");
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn atr(&self) -> &[u8] {
        &self.atr
    }

    pub fn applet(&self) -> &MiniHsmApplet {
        &self.applet
    }

    /// Process raw APDU bytes and return response bytes (data + SW1 + SW2)
    pub fn transmit(&mut self, raw: &[u8]) -> Vec<u8> {
        self.process(raw).to_bytes()
    }

    fn process(&mut self, raw: &[u8]) -> Response {
        if !self.powered {
            return Response::error(SW::CONDITIONS_NOT_SATISFIED);
        }

        let cmd = match parse_apdu(raw) {
            Ok(cmd) => cmd,
            Err(e) => {
                error!("Failed to parse APDU: {}", e);
                return Response::error(SW::WRONG_LENGTH);
            }
        };

        debug!(
            "Processing APDU: CLA={:02X} INS={:02X} P1={:02X} P2={:02X} Lc={}",
            cmd.cla, cmd.ins, cmd.p1, cmd.p2, cmd.data.len()
        );

        // Only SELECT by AID is handled here, any other SELECT reaches the applet
        if cmd.ins == ins::SELECT && cmd.p1 == SELECT_BY_NAME {
            if cmd.data.as_slice() == MINIHSM_AID {
                self.selected = true;
                info!("Selected minihsm applet");
                return self.applet.select();
            }
            debug!("Unknown AID: {:02X?}", cmd.data);
            self.selected = false;
            return Response::error(SW::FILE_NOT_FOUND);
        }

        if !self.selected {
            return Response::error(SW::CONDITIONS_NOT_SATISFIED);
        }

        self.applet.process_apdu(&cmd)
    }
}

/// Global state for the IFD handler
struct IfdState {
    /// Card per slot (only slot 0 exists)
    slots: [Option<Arc<Mutex<VirtualCard>>>; SLOT_COUNT],
}

static IFD_STATE: OnceCell<Mutex<IfdState>> = OnceCell::new();

fn get_state() -> &'static Mutex<IfdState> {
    IFD_STATE.get_or_init(|| Mutex::new(IfdState { slots: [None] }))
}

fn slot_index(lun: DWORD) -> usize {
    (lun & 0xFFFF) as usize
}

/// Look up the card in a slot, releasing the global lock before returning
fn slot_card(lun: DWORD) -> Option<Arc<Mutex<VirtualCard>>> {
    let state = get_state().lock();
    state.slots.get(slot_index(lun)).and_then(|slot| slot.clone())
}

fn create_channel(lun: DWORD) -> RESPONSECODE {
    let mut state = get_state().lock();
    let Some(slot) = state.slots.get_mut(slot_index(lun)) else {
        error!("Invalid slot for LUN {}", lun);
        return IFD_COMMUNICATION_ERROR;
    };

    *slot = Some(Arc::new(Mutex::new(VirtualCard::new(AppletConfig::from_env()))));
    info!("Channel created for LUN {}", lun);
    IFD_SUCCESS
}

/// Copy `src` into a caller buffer of at most `max` bytes and report the length
///
/// # Safety
/// `dst` must be valid for `max` bytes and `len` must be writable.
unsafe fn copy_out(src: &[u8], dst: PUCHAR, len: PDWORD, max: usize) {
    let n = src.len().min(max);
    if !dst.is_null() {
        ptr::copy_nonoverlapping(src.as_ptr(), dst, n);
    }
    *len = n as DWORD;
}

// ============================================================================
// IFD Handler API Implementation
// ============================================================================

/// Create a communication channel to the reader
#[no_mangle]
pub extern "C" fn IFDHCreateChannelByName(lun: DWORD, device_name: LPSTR) -> RESPONSECODE {
    let name = if device_name.is_null() {
        "null".to_string()
    } else {
        unsafe { CStr::from_ptr(device_name) }
            .to_string_lossy()
            .to_string()
    };
    info!("IFDHCreateChannelByName: LUN={}, device={}", lun, name);
    create_channel(lun)
}

/// Create a communication channel (legacy)
#[no_mangle]
pub extern "C" fn IFDHCreateChannel(lun: DWORD, channel: DWORD) -> RESPONSECODE {
    info!("IFDHCreateChannel: LUN={}, channel={}", lun, channel);
    create_channel(lun)
}

/// Close the communication channel
#[no_mangle]
pub extern "C" fn IFDHCloseChannel(lun: DWORD) -> RESPONSECODE {
    info!("IFDHCloseChannel: LUN={}", lun);

    let mut state = get_state().lock();
    let Some(slot) = state.slots.get_mut(slot_index(lun)) else {
        return IFD_COMMUNICATION_ERROR;
    };

    if let Some(card) = slot.take() {
        card.lock().power_off();
    }
    IFD_SUCCESS
}

/// Get reader capabilities
#[no_mangle]
pub extern "C" fn IFDHGetCapabilities(
    lun: DWORD,
    tag: DWORD,
    length: PDWORD,
    value: PUCHAR,
) -> RESPONSECODE {
    debug!("IFDHGetCapabilities: LUN={}, tag=0x{:04X}", lun, tag);

    if length.is_null() {
        return IFD_COMMUNICATION_ERROR;
    }

    let single_byte = |byte: u8| {
        unsafe { copy_out(&[byte], value, length, 1) };
        IFD_SUCCESS
    };

    match tag {
        TAG_IFD_ATR => {
            if slot_index(lun) >= SLOT_COUNT {
                return IFD_COMMUNICATION_ERROR;
            }
            match slot_card(lun) {
                Some(card) => {
                    let card = card.lock();
                    if !card.is_powered() {
                        return IFD_ICC_NOT_PRESENT;
                    }
                    unsafe { copy_out(card.atr(), value, length, MAX_ATR_SIZE) };
                    IFD_SUCCESS
                }
                None => IFD_ICC_NOT_PRESENT,
            }
        }
        TAG_IFD_SLOTS_NUMBER => single_byte(1),
        // Not thread safe at IFD level, slot level is
        TAG_IFD_THREAD_SAFE => single_byte(0),
        TAG_IFD_SLOT_THREAD_SAFE => single_byte(1),
        _ => {
            debug!("Unknown tag: 0x{:04X}", tag);
            IFD_ERROR_TAG
        }
    }
}

/// Set reader capabilities (not supported)
#[no_mangle]
pub extern "C" fn IFDHSetCapabilities(
    _lun: DWORD,
    _tag: DWORD,
    _length: DWORD,
    _value: PUCHAR,
) -> RESPONSECODE {
    IFD_ERROR_NOT_SUPPORTED
}

/// Set protocol parameters (accepted as-is)
#[no_mangle]
pub extern "C" fn IFDHSetProtocolParameters(
    lun: DWORD,
    protocol: DWORD,
    _flags: UCHAR,
    _pts1: UCHAR,
    _pts2: UCHAR,
    _pts3: UCHAR,
) -> RESPONSECODE {
    debug!("IFDHSetProtocolParameters: LUN={}, protocol={}", lun, protocol);
    IFD_SUCCESS
}

/// Power the ICC (Integrated Circuit Card)
#[no_mangle]
pub extern "C" fn IFDHPowerICC(
    lun: DWORD,
    action: DWORD,
    atr: PUCHAR,
    atr_length: PDWORD,
) -> RESPONSECODE {
    info!("IFDHPowerICC: LUN={}, action={}", lun, action);

    let Some(card) = slot_card(lun) else {
        return IFD_COMMUNICATION_ERROR;
    };
    let mut card = card.lock();

    match action {
        IFD_POWER_UP | IFD_RESET => {
            let card_atr = card.power_on();
            if !atr.is_null() && !atr_length.is_null() {
                unsafe { copy_out(&card_atr, atr, atr_length, MAX_ATR_SIZE) };
            }
            IFD_SUCCESS
        }
        IFD_POWER_DOWN => {
            card.power_off();
            IFD_SUCCESS
        }
        _ => {
            warn!("Unknown power action: {}", action);
            IFD_ERROR_NOT_SUPPORTED
        }
    }
}

/// Transmit data to the ICC
#[no_mangle]
pub extern "C" fn IFDHTransmitToICC(
    lun: DWORD,
    send_pci: SCARD_IO_HEADER,
    tx_buffer: PUCHAR,
    tx_length: DWORD,
    rx_buffer: PUCHAR,
    rx_length: PDWORD,
    _recv_pci: *mut SCARD_IO_HEADER,
) -> RESPONSECODE {
    debug!(
        "IFDHTransmitToICC: LUN={}, protocol={}, tx_len={}",
        lun, send_pci.protocol, tx_length
    );

    if tx_buffer.is_null() || rx_buffer.is_null() || rx_length.is_null() {
        return IFD_COMMUNICATION_ERROR;
    }

    let Some(card) = slot_card(lun) else {
        return IFD_COMMUNICATION_ERROR;
    };

    // Command bytes are not logged, they carry credentials
    let command = unsafe { std::slice::from_raw_parts(tx_buffer, tx_length as usize) };
    let response = card.lock().transmit(command);

    debug!("Response: {} bytes", response.len());
    unsafe {
        let max_len = *rx_length as usize;
        copy_out(&response, rx_buffer, rx_length, max_len);
    }
    IFD_SUCCESS
}

/// Check if ICC is present
#[no_mangle]
pub extern "C" fn IFDHICCPresence(lun: DWORD) -> RESPONSECODE {
    // Virtual card is present whenever the channel exists
    if slot_card(lun).is_some() {
        IFD_ICC_PRESENT
    } else {
        IFD_ICC_NOT_PRESENT
    }
}

/// Control the reader (not supported)
#[no_mangle]
pub extern "C" fn IFDHControl(
    _lun: DWORD,
    _control_code: DWORD,
    _tx_buffer: PUCHAR,
    _tx_length: DWORD,
    _rx_buffer: PUCHAR,
    _rx_length: DWORD,
    _bytes_returned: PDWORD,
) -> RESPONSECODE {
    IFD_ERROR_NOT_SUPPORTED
}
