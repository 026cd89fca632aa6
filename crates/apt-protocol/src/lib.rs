// SPDX-License-Identifier: GPL-3.0-or-later

//! Wire format for the Thorlabs APT binary command protocol.
//!
//! The protocol multiplexes a single serial link between an ordered
//! command/reply stream and a flood of unsolicited status updates. This
//! crate only knows how to turn bytes into [`Message`] values and back; it
//! has no notion of a connection, a thread, or a device.

mod header;
mod message;
mod status;

pub use header::{decode_header, HeaderPeek, HEADER_LEN};
pub use message::{DcStatusUpdate, FirmwareVersion, HardwareInfo, Message, MoveCompleted, PolParams};
pub use status::StatusBits;

use thiserror::Error;

/// Errors raised while turning bytes into a [`Message`], or a [`Message`]
/// into bytes.
///
/// This is a pure codec error: it never reaches a caller of the connection
/// core directly. The RX dispatcher logs it and keeps reading; a bad frame
/// must never poison the stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("expected message id {expected:#06x}, found {found:#06x}")]
    UnexpectedMessageId { expected: u16, found: u16 },

    #[error("message id {0:#06x} is not in the known set")]
    UnknownMessageId(u16),

    #[error("expected data length {expected}, found {found}")]
    UnexpectedDataLength { expected: u16, found: u16 },

    #[error("with-data frame is missing the high bit on its destination byte: {destination:#04x}")]
    MissingDataBit { destination: u8 },

    #[error("header-only frame unexpectedly has the high bit set on its destination byte: {destination:#04x}")]
    UnexpectedDataBit { destination: u8 },

    #[error("frame too short: expected at least {expected} bytes, found {found}")]
    TooShort { expected: usize, found: usize },

    #[error("unknown address byte {0:#04x}")]
    UnknownAddress(u8),

    #[error("unknown channel bitmask {0:#06x}")]
    UnknownChanIdent(u16),

    #[error("unknown enable state {0:#04x}")]
    UnknownEnableState(u8),

    #[error("unknown jog direction {0:#04x}")]
    UnknownJogDirection(u8),

    #[error("unknown stop mode {0:#04x}")]
    UnknownStopMode(u8),

    #[error("unknown hardware type {0:#06x}")]
    UnknownHardwareType(u16),
}

/// The address of a host, rack controller, USB bay, or generic USB device on
/// the APT bus.
///
/// Every message carries a `source` and `destination` of this type. Host to
/// device messages carry `source = HostController, destination = GenericUsb`
/// (or `BayN` for rack-mounted units); replies invert them.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Address {
    HostController,
    RackController,
    Bay(u8),
    GenericUsb,
}

impl Address {
    const HOST_CONTROLLER: u8 = 0x01;
    const RACK_CONTROLLER: u8 = 0x11;
    const BAY_0: u8 = 0x21;
    const BAY_9: u8 = 0x2A;
    const GENERIC_USB: u8 = 0x50;
}

impl TryFrom<u8> for Address {
    type Error = CodecError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            Self::HOST_CONTROLLER => Ok(Address::HostController),
            Self::RACK_CONTROLLER => Ok(Address::RackController),
            Self::GENERIC_USB => Ok(Address::GenericUsb),
            Self::BAY_0..=Self::BAY_9 => Ok(Address::Bay(val - Self::BAY_0)),
            _ => Err(CodecError::UnknownAddress(val)),
        }
    }
}

impl From<Address> for u8 {
    fn from(addr: Address) -> Self {
        match addr {
            Address::HostController => Address::HOST_CONTROLLER,
            Address::RackController => Address::RACK_CONTROLLER,
            Address::GenericUsb => Address::GENERIC_USB,
            Address::Bay(n) => Address::BAY_0 + n,
        }
    }
}

bitflags::bitflags! {
    /// A channel, or a combination of channels, on a multi-axis device.
    ///
    /// An empty bitmask means "all channels disabled"; it is the value
    /// written to disable motion after a move completes.
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct ChanIdent: u16 {
        const CHANNEL_1 = 0x01;
        const CHANNEL_2 = 0x02;
        const CHANNEL_3 = 0x04;
        const CHANNEL_4 = 0x08;
    }
}

impl ChanIdent {
    /// Decode from the wire, rejecting any bit outside the known set.
    pub fn strict_from_bits(bits: u16) -> Result<Self, CodecError> {
        Self::from_bits(bits).ok_or(CodecError::UnknownChanIdent(bits))
    }
}

/// The state commanded or reported by `MOD_{GET,SET}_CHANENABLESTATE`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EnableState {
    Enabled,
    Disabled,
}

impl EnableState {
    const ENABLED: u8 = 0x01;
    const DISABLED: u8 = 0x02;
}

impl TryFrom<u8> for EnableState {
    type Error = CodecError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            Self::ENABLED => Ok(EnableState::Enabled),
            Self::DISABLED => Ok(EnableState::Disabled),
            _ => Err(CodecError::UnknownEnableState(val)),
        }
    }
}

impl From<EnableState> for u8 {
    fn from(state: EnableState) -> Self {
        match state {
            EnableState::Enabled => EnableState::ENABLED,
            EnableState::Disabled => EnableState::DISABLED,
        }
    }
}

/// The direction commanded by `MOT_MOVE_JOG`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum JogDirection {
    Forward,
    Reverse,
}

impl JogDirection {
    const FORWARD: u8 = 0x01;
    const REVERSE: u8 = 0x02;
}

impl TryFrom<u8> for JogDirection {
    type Error = CodecError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            Self::FORWARD => Ok(JogDirection::Forward),
            Self::REVERSE => Ok(JogDirection::Reverse),
            _ => Err(CodecError::UnknownJogDirection(val)),
        }
    }
}

impl From<JogDirection> for u8 {
    fn from(dir: JogDirection) -> Self {
        match dir {
            JogDirection::Forward => JogDirection::FORWARD,
            JogDirection::Reverse => JogDirection::REVERSE,
        }
    }
}

/// The stop style commanded by `MOT_MOVE_STOP`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StopMode {
    Immediate,
    Profiled,
}

impl StopMode {
    const IMMEDIATE: u8 = 0x01;
    const PROFILED: u8 = 0x02;
}

impl TryFrom<u8> for StopMode {
    type Error = CodecError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            Self::IMMEDIATE => Ok(StopMode::Immediate),
            Self::PROFILED => Ok(StopMode::Profiled),
            _ => Err(CodecError::UnknownStopMode(val)),
        }
    }
}

impl From<StopMode> for u8 {
    fn from(mode: StopMode) -> Self {
        match mode {
            StopMode::Immediate => StopMode::IMMEDIATE,
            StopMode::Profiled => StopMode::PROFILED,
        }
    }
}

/// The hardware family reported in `HW_GET_INFO`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum HardwareType {
    BrushlessDcController,
    MultiChannelControllerMotherboard,
}

impl HardwareType {
    const BRUSHLESS_DC_CONTROLLER: u16 = 44;
    const MULTI_CHANNEL_CONTROLLER_MOTHERBOARD: u16 = 45;
}

impl TryFrom<u16> for HardwareType {
    type Error = CodecError;

    fn try_from(val: u16) -> Result<Self, Self::Error> {
        match val {
            Self::BRUSHLESS_DC_CONTROLLER => Ok(HardwareType::BrushlessDcController),
            Self::MULTI_CHANNEL_CONTROLLER_MOTHERBOARD => {
                Ok(HardwareType::MultiChannelControllerMotherboard)
            }
            _ => Err(CodecError::UnknownHardwareType(val)),
        }
    }
}

impl From<HardwareType> for u16 {
    fn from(ty: HardwareType) -> Self {
        match ty {
            HardwareType::BrushlessDcController => HardwareType::BRUSHLESS_DC_CONTROLLER,
            HardwareType::MultiChannelControllerMotherboard => {
                HardwareType::MULTI_CHANNEL_CONTROLLER_MOTHERBOARD
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn address_round_trips() {
        for addr in [
            Address::HostController,
            Address::RackController,
            Address::GenericUsb,
            Address::Bay(0),
            Address::Bay(9),
        ] {
            assert_eq!(Ok(addr), Address::try_from(u8::from(addr)));
        }
    }

    #[test]
    fn address_rejects_unknown_byte() {
        assert_eq!(Err(CodecError::UnknownAddress(0xFF)), Address::try_from(0xFF));
    }

    #[test]
    fn chan_ident_rejects_unknown_bits() {
        assert_eq!(
            Err(CodecError::UnknownChanIdent(0x10)),
            ChanIdent::strict_from_bits(0x10)
        );
        assert_eq!(Ok(ChanIdent::empty()), ChanIdent::strict_from_bits(0));
        assert_eq!(
            Ok(ChanIdent::CHANNEL_1 | ChanIdent::CHANNEL_2),
            ChanIdent::strict_from_bits(0x03)
        );
    }

    #[test]
    fn enable_state_round_trips() {
        assert_eq!(Ok(EnableState::Enabled), EnableState::try_from(0x01));
        assert_eq!(Ok(EnableState::Disabled), EnableState::try_from(0x02));
        assert!(EnableState::try_from(0x03).is_err());
    }
}
