// SPDX-License-Identifier: GPL-3.0-or-later

use crate::header::{
    decode_header, encode_header_only, encode_header_with_data, require_data_bit,
    require_no_data_bit, HEADER_LEN,
};
use crate::status::StatusBits;
use crate::{Address, ChanIdent, CodecError, EnableState, HardwareType, JogDirection, StopMode};

macro_rules! msg_id {
    ($name:ident = $val:expr) => {
        const $name: u16 = $val;
    };
}

msg_id!(ID_HW_DISCONNECT = 0x0002);
msg_id!(ID_HW_REQ_INFO = 0x0005);
msg_id!(ID_HW_GET_INFO = 0x0006);
msg_id!(ID_HW_START_UPDATEMSGS = 0x0011);
msg_id!(ID_HW_STOP_UPDATEMSGS = 0x0012);
msg_id!(ID_MOD_SET_CHANENABLESTATE = 0x0210);
msg_id!(ID_MOD_REQ_CHANENABLESTATE = 0x0211);
msg_id!(ID_MOD_GET_CHANENABLESTATE = 0x0212);
msg_id!(ID_MOD_IDENTIFY = 0x0223);
msg_id!(ID_MOT_SET_POSCOUNTER = 0x0410);
msg_id!(ID_MOT_REQ_POSCOUNTER = 0x0411);
msg_id!(ID_MOT_GET_POSCOUNTER = 0x0412);
msg_id!(ID_MOT_MOVE_HOME = 0x0443);
msg_id!(ID_MOT_MOVE_HOMED = 0x0444);
msg_id!(ID_MOT_MOVE_ABSOLUTE = 0x0453);
msg_id!(ID_MOT_MOVE_COMPLETED = 0x0464);
msg_id!(ID_MOT_MOVE_STOP = 0x0465);
msg_id!(ID_MOT_MOVE_STOPPED = 0x0466);
msg_id!(ID_MOT_MOVE_JOG = 0x046A);
msg_id!(ID_MOT_REQ_USTATUSUPDATE = 0x0490);
msg_id!(ID_MOT_GET_USTATUSUPDATE = 0x0491);
msg_id!(ID_MOT_ACK_USTATUSUPDATE = 0x0492);
msg_id!(ID_MOT_RESUME_ENDOFMOVEMSGS = 0x0493);
msg_id!(ID_POL_SET_PARAMS = 0x0530);
msg_id!(ID_POL_REQ_PARAMS = 0x0531);
msg_id!(ID_POL_GET_PARAMS = 0x0532);
msg_id!(ID_RESTOREFACTORYSETTINGS = 0x0686);

fn encode_fixed_str(s: &str, width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width];
    for (slot, ch) in out.iter_mut().zip(s.chars()) {
        *slot = ch as u8;
    }
    out
}

fn decode_fixed_str(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    buf[..end].iter().map(|&b| b as char).collect()
}

/// The 4-byte firmware version word. The vendor documentation does not
/// commit to a byte order; we follow the convention that the bytes are
/// `(unused, minor, interim, major)` little-endian and surface all four.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FirmwareVersion {
    pub unused: u8,
    pub minor: u8,
    pub interim: u8,
    pub major: u8,
}

impl FirmwareVersion {
    fn decode(buf: [u8; 4]) -> Self {
        FirmwareVersion {
            unused: buf[0],
            minor: buf[1],
            interim: buf[2],
            major: buf[3],
        }
    }

    fn encode(self) -> [u8; 4] {
        [self.unused, self.minor, self.interim, self.major]
    }
}

/// Payload of `HW_GET_INFO` (84 bytes).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HardwareInfo {
    pub serial_number: i32,
    pub model: String,
    pub hardware_type: HardwareType,
    pub firmware_version: FirmwareVersion,
    pub notes: String,
    pub hardware_version: u16,
    pub mod_state: u16,
    pub number_of_channels: u16,
}

const HARDWARE_INFO_LEN: usize = 84;

impl HardwareInfo {
    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != HARDWARE_INFO_LEN {
            return Err(CodecError::UnexpectedDataLength {
                expected: HARDWARE_INFO_LEN as u16,
                found: buf.len() as u16,
            });
        }
        Ok(HardwareInfo {
            serial_number: i32::from_le_bytes(buf[0..4].try_into().unwrap()),
            model: decode_fixed_str(&buf[4..12]),
            hardware_type: HardwareType::try_from(u16::from_le_bytes(buf[12..14].try_into().unwrap()))?,
            firmware_version: FirmwareVersion::decode(buf[14..18].try_into().unwrap()),
            notes: decode_fixed_str(&buf[18..66]),
            hardware_version: u16::from_le_bytes(buf[78..80].try_into().unwrap()),
            mod_state: u16::from_le_bytes(buf[80..82].try_into().unwrap()),
            number_of_channels: u16::from_le_bytes(buf[82..84].try_into().unwrap()),
        })
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HARDWARE_INFO_LEN);
        out.extend_from_slice(&self.serial_number.to_le_bytes());
        out.extend_from_slice(&encode_fixed_str(&self.model, 8));
        out.extend_from_slice(&u16::from(self.hardware_type).to_le_bytes());
        out.extend_from_slice(&self.firmware_version.encode());
        out.extend_from_slice(&encode_fixed_str(&self.notes, 48));
        out.extend_from_slice(&[0u8; 12]);
        out.extend_from_slice(&self.hardware_version.to_le_bytes());
        out.extend_from_slice(&self.mod_state.to_le_bytes());
        out.extend_from_slice(&self.number_of_channels.to_le_bytes());
        out
    }
}

/// Payload of `MOT_GET_USTATUSUPDATE` and `MOT_MOVE_STOPPED` (14 bytes).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DcStatusUpdate {
    pub chan_ident: ChanIdent,
    pub position: i32,
    pub velocity: i16,
    pub motor_current_ma: i16,
    pub status: StatusBits,
}

const USTATUS_LEN: usize = 14;

impl DcStatusUpdate {
    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != USTATUS_LEN {
            return Err(CodecError::UnexpectedDataLength {
                expected: USTATUS_LEN as u16,
                found: buf.len() as u16,
            });
        }
        Ok(DcStatusUpdate {
            chan_ident: ChanIdent::strict_from_bits(u16::from_le_bytes(buf[0..2].try_into().unwrap()))?,
            position: i32::from_le_bytes(buf[2..6].try_into().unwrap()),
            velocity: i16::from_le_bytes(buf[6..8].try_into().unwrap()),
            motor_current_ma: i16::from_le_bytes(buf[8..10].try_into().unwrap()),
            status: StatusBits::from_bits_truncate(u32::from_le_bytes(buf[10..14].try_into().unwrap())),
        })
    }

    fn encode(&self) -> [u8; USTATUS_LEN] {
        let mut out = [0u8; USTATUS_LEN];
        out[0..2].copy_from_slice(&self.chan_ident.bits().to_le_bytes());
        out[2..6].copy_from_slice(&self.position.to_le_bytes());
        out[6..8].copy_from_slice(&self.velocity.to_le_bytes());
        out[8..10].copy_from_slice(&self.motor_current_ma.to_le_bytes());
        out[10..14].copy_from_slice(&self.status.bits().to_le_bytes());
        out
    }
}

/// Payload of the 20-byte `MOT_MOVE_COMPLETED` shape (K10CR1). Same layout
/// as [`DcStatusUpdate`], kept as a distinct type so the two `MOVE_COMPLETED`
/// shapes remain separate tags in [`Message`].
pub type MoveCompleted = DcStatusUpdate;

/// Payload of `POL_{GET,SET}_PARAMS` (12 bytes). The first word is reserved
/// on the wire and carries no addressing meaning; `set_params` always
/// applies to the whole device, not a single channel.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PolParams {
    pub velocity: u16,
    pub home_position: u16,
    pub jog_step_1: u16,
    pub jog_step_2: u16,
    pub jog_step_3: u16,
}

const POL_PARAMS_LEN: usize = 12;

impl PolParams {
    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != POL_PARAMS_LEN {
            return Err(CodecError::UnexpectedDataLength {
                expected: POL_PARAMS_LEN as u16,
                found: buf.len() as u16,
            });
        }
        Ok(PolParams {
            velocity: u16::from_le_bytes(buf[2..4].try_into().unwrap()),
            home_position: u16::from_le_bytes(buf[4..6].try_into().unwrap()),
            jog_step_1: u16::from_le_bytes(buf[6..8].try_into().unwrap()),
            jog_step_2: u16::from_le_bytes(buf[8..10].try_into().unwrap()),
            jog_step_3: u16::from_le_bytes(buf[10..12].try_into().unwrap()),
        })
    }

    fn encode(&self) -> [u8; POL_PARAMS_LEN] {
        let mut out = [0u8; POL_PARAMS_LEN];
        out[2..4].copy_from_slice(&self.velocity.to_le_bytes());
        out[4..6].copy_from_slice(&self.home_position.to_le_bytes());
        out[6..8].copy_from_slice(&self.jog_step_1.to_le_bytes());
        out[8..10].copy_from_slice(&self.jog_step_2.to_le_bytes());
        out[10..12].copy_from_slice(&self.jog_step_3.to_le_bytes());
        out
    }
}

/// The closed set of known APT messages.
///
/// Every variant carries its own `destination`/`source`; callers that only
/// care about routing can match those two fields without destructuring the
/// rest. `MOT_MOVE_COMPLETED` appears as two variants — [`Message::MotMoveCompletedNoData`]
/// (MPC320) and [`Message::MotMoveCompleted`] (K10CR1) — because the same
/// message id is documented with one payload shape but observed on the wire
/// with another, device-dependent.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    HwDisconnect {
        destination: Address,
        source: Address,
    },
    HwReqInfo {
        destination: Address,
        source: Address,
    },
    HwGetInfo {
        destination: Address,
        source: Address,
        info: HardwareInfo,
    },
    HwStartUpdateMsgs {
        destination: Address,
        source: Address,
    },
    HwStopUpdateMsgs {
        destination: Address,
        source: Address,
    },
    ModSetChanEnableState {
        destination: Address,
        source: Address,
        chan_ident: ChanIdent,
        enable_state: EnableState,
    },
    ModReqChanEnableState {
        destination: Address,
        source: Address,
        chan_ident: ChanIdent,
    },
    ModGetChanEnableState {
        destination: Address,
        source: Address,
        chan_ident: ChanIdent,
        enable_state: EnableState,
    },
    ModIdentify {
        destination: Address,
        source: Address,
        chan_ident: ChanIdent,
    },
    MotSetPosCounter {
        destination: Address,
        source: Address,
        chan_ident: ChanIdent,
        position: i32,
    },
    MotReqPosCounter {
        destination: Address,
        source: Address,
        chan_ident: ChanIdent,
    },
    MotGetPosCounter {
        destination: Address,
        source: Address,
        chan_ident: ChanIdent,
        position: i32,
    },
    MotMoveHome {
        destination: Address,
        source: Address,
        chan_ident: ChanIdent,
    },
    MotMoveHomed {
        destination: Address,
        source: Address,
        chan_ident: ChanIdent,
    },
    MotMoveAbsolute {
        destination: Address,
        source: Address,
        chan_ident: ChanIdent,
        absolute_distance: i32,
    },
    /// The MPC320 shape: header-only, chan id in the parameter bytes.
    MotMoveCompletedNoData {
        destination: Address,
        source: Address,
        chan_ident: ChanIdent,
    },
    /// The K10CR1 shape: 14-byte USTATUS-layout payload.
    MotMoveCompleted {
        destination: Address,
        source: Address,
        status: MoveCompleted,
    },
    MotMoveStop {
        destination: Address,
        source: Address,
        chan_ident: ChanIdent,
        stop_mode: StopMode,
    },
    MotMoveStopped {
        destination: Address,
        source: Address,
        status: DcStatusUpdate,
    },
    MotMoveJog {
        destination: Address,
        source: Address,
        chan_ident: ChanIdent,
        direction: JogDirection,
    },
    MotReqUStatusUpdate {
        destination: Address,
        source: Address,
        chan_ident: ChanIdent,
    },
    MotGetUStatusUpdate {
        destination: Address,
        source: Address,
        status: DcStatusUpdate,
    },
    MotAckUStatusUpdate {
        destination: Address,
        source: Address,
    },
    MotResumeEndOfMoveMsgs {
        destination: Address,
        source: Address,
    },
    PolSetParams {
        destination: Address,
        source: Address,
        params: PolParams,
    },
    PolReqParams {
        destination: Address,
        source: Address,
    },
    PolGetParams {
        destination: Address,
        source: Address,
        params: PolParams,
    },
    RestoreFactorySettings {
        destination: Address,
        source: Address,
    },
}

impl Message {
    /// The on-wire message id for this variant. Two variants share
    /// `MOT_MOVE_COMPLETED`'s id; they are disambiguated by payload shape.
    pub fn message_id(&self) -> u16 {
        match self {
            Message::HwDisconnect { .. } => ID_HW_DISCONNECT,
            Message::HwReqInfo { .. } => ID_HW_REQ_INFO,
            Message::HwGetInfo { .. } => ID_HW_GET_INFO,
            Message::HwStartUpdateMsgs { .. } => ID_HW_START_UPDATEMSGS,
            Message::HwStopUpdateMsgs { .. } => ID_HW_STOP_UPDATEMSGS,
            Message::ModSetChanEnableState { .. } => ID_MOD_SET_CHANENABLESTATE,
            Message::ModReqChanEnableState { .. } => ID_MOD_REQ_CHANENABLESTATE,
            Message::ModGetChanEnableState { .. } => ID_MOD_GET_CHANENABLESTATE,
            Message::ModIdentify { .. } => ID_MOD_IDENTIFY,
            Message::MotSetPosCounter { .. } => ID_MOT_SET_POSCOUNTER,
            Message::MotReqPosCounter { .. } => ID_MOT_REQ_POSCOUNTER,
            Message::MotGetPosCounter { .. } => ID_MOT_GET_POSCOUNTER,
            Message::MotMoveHome { .. } => ID_MOT_MOVE_HOME,
            Message::MotMoveHomed { .. } => ID_MOT_MOVE_HOMED,
            Message::MotMoveAbsolute { .. } => ID_MOT_MOVE_ABSOLUTE,
            Message::MotMoveCompletedNoData { .. } => ID_MOT_MOVE_COMPLETED,
            Message::MotMoveCompleted { .. } => ID_MOT_MOVE_COMPLETED,
            Message::MotMoveStop { .. } => ID_MOT_MOVE_STOP,
            Message::MotMoveStopped { .. } => ID_MOT_MOVE_STOPPED,
            Message::MotMoveJog { .. } => ID_MOT_MOVE_JOG,
            Message::MotReqUStatusUpdate { .. } => ID_MOT_REQ_USTATUSUPDATE,
            Message::MotGetUStatusUpdate { .. } => ID_MOT_GET_USTATUSUPDATE,
            Message::MotAckUStatusUpdate { .. } => ID_MOT_ACK_USTATUSUPDATE,
            Message::MotResumeEndOfMoveMsgs { .. } => ID_MOT_RESUME_ENDOFMOVEMSGS,
            Message::PolSetParams { .. } => ID_POL_SET_PARAMS,
            Message::PolReqParams { .. } => ID_POL_REQ_PARAMS,
            Message::PolGetParams { .. } => ID_POL_GET_PARAMS,
            Message::RestoreFactorySettings { .. } => ID_RESTOREFACTORYSETTINGS,
        }
    }

    pub fn destination(&self) -> Address {
        match *self {
            Message::HwDisconnect { destination, .. }
            | Message::HwReqInfo { destination, .. }
            | Message::HwGetInfo { destination, .. }
            | Message::HwStartUpdateMsgs { destination, .. }
            | Message::HwStopUpdateMsgs { destination, .. }
            | Message::ModSetChanEnableState { destination, .. }
            | Message::ModReqChanEnableState { destination, .. }
            | Message::ModGetChanEnableState { destination, .. }
            | Message::ModIdentify { destination, .. }
            | Message::MotSetPosCounter { destination, .. }
            | Message::MotReqPosCounter { destination, .. }
            | Message::MotGetPosCounter { destination, .. }
            | Message::MotMoveHome { destination, .. }
            | Message::MotMoveHomed { destination, .. }
            | Message::MotMoveAbsolute { destination, .. }
            | Message::MotMoveCompletedNoData { destination, .. }
            | Message::MotMoveCompleted { destination, .. }
            | Message::MotMoveStop { destination, .. }
            | Message::MotMoveStopped { destination, .. }
            | Message::MotMoveJog { destination, .. }
            | Message::MotReqUStatusUpdate { destination, .. }
            | Message::MotGetUStatusUpdate { destination, .. }
            | Message::MotAckUStatusUpdate { destination, .. }
            | Message::MotResumeEndOfMoveMsgs { destination, .. }
            | Message::PolSetParams { destination, .. }
            | Message::PolReqParams { destination, .. }
            | Message::PolGetParams { destination, .. }
            | Message::RestoreFactorySettings { destination, .. } => destination,
        }
    }

    pub fn source(&self) -> Address {
        match *self {
            Message::HwDisconnect { source, .. }
            | Message::HwReqInfo { source, .. }
            | Message::HwGetInfo { source, .. }
            | Message::HwStartUpdateMsgs { source, .. }
            | Message::HwStopUpdateMsgs { source, .. }
            | Message::ModSetChanEnableState { source, .. }
            | Message::ModReqChanEnableState { source, .. }
            | Message::ModGetChanEnableState { source, .. }
            | Message::ModIdentify { source, .. }
            | Message::MotSetPosCounter { source, .. }
            | Message::MotReqPosCounter { source, .. }
            | Message::MotGetPosCounter { source, .. }
            | Message::MotMoveHome { source, .. }
            | Message::MotMoveHomed { source, .. }
            | Message::MotMoveAbsolute { source, .. }
            | Message::MotMoveCompletedNoData { source, .. }
            | Message::MotMoveCompleted { source, .. }
            | Message::MotMoveStop { source, .. }
            | Message::MotMoveStopped { source, .. }
            | Message::MotMoveJog { source, .. }
            | Message::MotReqUStatusUpdate { source, .. }
            | Message::MotGetUStatusUpdate { source, .. }
            | Message::MotAckUStatusUpdate { source, .. }
            | Message::MotResumeEndOfMoveMsgs { source, .. }
            | Message::PolSetParams { source, .. }
            | Message::PolReqParams { source, .. }
            | Message::PolGetParams { source, .. }
            | Message::RestoreFactorySettings { source, .. } => source,
        }
    }

    /// Encode this message to its exact wire representation.
    pub fn encode(&self) -> Vec<u8> {
        let id = self.message_id();
        match self {
            Message::HwDisconnect { destination, source }
            | Message::HwReqInfo { destination, source }
            | Message::HwStartUpdateMsgs { destination, source }
            | Message::HwStopUpdateMsgs { destination, source }
            | Message::MotAckUStatusUpdate { destination, source }
            | Message::MotResumeEndOfMoveMsgs { destination, source }
            | Message::PolReqParams { destination, source }
            | Message::RestoreFactorySettings { destination, source } => {
                encode_header_only(id, 0, 0, *destination, *source).to_vec()
            }
            Message::ModSetChanEnableState {
                destination,
                source,
                chan_ident,
                enable_state,
            }
            | Message::ModGetChanEnableState {
                destination,
                source,
                chan_ident,
                enable_state,
            } => {
                let [c0, c1] = chan_ident.bits().to_le_bytes();
                let _ = c1;
                encode_header_only(id, c0, u8::from(*enable_state), *destination, *source).to_vec()
            }
            Message::ModReqChanEnableState {
                destination,
                source,
                chan_ident,
            }
            | Message::ModIdentify {
                destination,
                source,
                chan_ident,
            }
            | Message::MotMoveHome {
                destination,
                source,
                chan_ident,
            }
            | Message::MotMoveHomed {
                destination,
                source,
                chan_ident,
            }
            | Message::MotMoveCompletedNoData {
                destination,
                source,
                chan_ident,
            }
            | Message::MotReqUStatusUpdate {
                destination,
                source,
                chan_ident,
            }
            | Message::MotReqPosCounter {
                destination,
                source,
                chan_ident,
            } => {
                let [c0, c1] = chan_ident.bits().to_le_bytes();
                encode_header_only(id, c0, c1, *destination, *source).to_vec()
            }
            Message::MotMoveJog {
                destination,
                source,
                chan_ident,
                direction,
            } => encode_header_only(
                id,
                chan_ident.bits() as u8,
                u8::from(*direction),
                *destination,
                *source,
            )
            .to_vec(),
            Message::MotMoveStop {
                destination,
                source,
                chan_ident,
                stop_mode,
            } => encode_header_only(
                id,
                chan_ident.bits() as u8,
                u8::from(*stop_mode),
                *destination,
                *source,
            )
            .to_vec(),
            Message::HwGetInfo {
                destination,
                source,
                info,
            } => {
                let payload = info.encode();
                with_data(id, payload, *destination, *source)
            }
            Message::MotSetPosCounter {
                destination,
                source,
                chan_ident,
                position,
            }
            | Message::MotGetPosCounter {
                destination,
                source,
                chan_ident,
                position,
            } => {
                let mut payload = Vec::with_capacity(6);
                payload.extend_from_slice(&chan_ident.bits().to_le_bytes());
                payload.extend_from_slice(&position.to_le_bytes());
                with_data(id, payload, *destination, *source)
            }
            Message::MotMoveAbsolute {
                destination,
                source,
                chan_ident,
                absolute_distance,
            } => {
                let mut payload = Vec::with_capacity(6);
                payload.extend_from_slice(&chan_ident.bits().to_le_bytes());
                payload.extend_from_slice(&absolute_distance.to_le_bytes());
                with_data(id, payload, *destination, *source)
            }
            Message::MotMoveCompleted {
                destination,
                source,
                status,
            }
            | Message::MotMoveStopped {
                destination,
                source,
                status,
            }
            | Message::MotGetUStatusUpdate {
                destination,
                source,
                status,
            } => with_data(id, status.encode().to_vec(), *destination, *source),
            Message::PolSetParams {
                destination,
                source,
                params,
            }
            | Message::PolGetParams {
                destination,
                source,
                params,
            } => with_data(id, params.encode().to_vec(), *destination, *source),
        }
    }

    /// Decode a full frame (header plus any payload) into a [`Message`].
    ///
    /// Callers normally obtain `buf` by first peeking the header with
    /// [`crate::decode_header`] to learn how many trailing bytes to read.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let peek = decode_header(buf)?;
        let dest = peek.destination;
        let src = peek.source;
        let p1 = buf[2];
        let p2 = buf[3];
        let chan_word = |lo: u8, hi: u8| ChanIdent::strict_from_bits(u16::from_le_bytes([lo, hi]));

        macro_rules! header_only {
            () => {{
                require_no_data_bit(&peek)?;
                Ok(())
            }};
        }

        match peek.message_id {
            ID_HW_DISCONNECT => {
                header_only!()?;
                Ok(Message::HwDisconnect {
                    destination: dest,
                    source: src,
                })
            }
            ID_HW_REQ_INFO => {
                header_only!()?;
                Ok(Message::HwReqInfo {
                    destination: dest,
                    source: src,
                })
            }
            ID_HW_GET_INFO => {
                require_data_bit(&peek)?;
                let payload = data_payload(buf, &peek, HARDWARE_INFO_LEN)?;
                Ok(Message::HwGetInfo {
                    destination: dest,
                    source: src,
                    info: HardwareInfo::decode(payload)?,
                })
            }
            ID_HW_START_UPDATEMSGS => {
                header_only!()?;
                Ok(Message::HwStartUpdateMsgs {
                    destination: dest,
                    source: src,
                })
            }
            ID_HW_STOP_UPDATEMSGS => {
                header_only!()?;
                Ok(Message::HwStopUpdateMsgs {
                    destination: dest,
                    source: src,
                })
            }
            ID_MOD_SET_CHANENABLESTATE => {
                header_only!()?;
                Ok(Message::ModSetChanEnableState {
                    destination: dest,
                    source: src,
                    chan_ident: chan_word(p1, 0)?,
                    enable_state: EnableState::try_from(p2)?,
                })
            }
            ID_MOD_REQ_CHANENABLESTATE => {
                header_only!()?;
                Ok(Message::ModReqChanEnableState {
                    destination: dest,
                    source: src,
                    chan_ident: chan_word(p1, p2)?,
                })
            }
            ID_MOD_GET_CHANENABLESTATE => {
                header_only!()?;
                Ok(Message::ModGetChanEnableState {
                    destination: dest,
                    source: src,
                    chan_ident: chan_word(p1, 0)?,
                    enable_state: EnableState::try_from(p2)?,
                })
            }
            ID_MOD_IDENTIFY => {
                header_only!()?;
                Ok(Message::ModIdentify {
                    destination: dest,
                    source: src,
                    chan_ident: chan_word(p1, p2)?,
                })
            }
            ID_MOT_SET_POSCOUNTER | ID_MOT_GET_POSCOUNTER => {
                require_data_bit(&peek)?;
                let payload = data_payload(buf, &peek, 6)?;
                let chan_ident = ChanIdent::strict_from_bits(u16::from_le_bytes(
                    payload[0..2].try_into().unwrap(),
                ))?;
                let position = i32::from_le_bytes(payload[2..6].try_into().unwrap());
                if peek.message_id == ID_MOT_SET_POSCOUNTER {
                    Ok(Message::MotSetPosCounter {
                        destination: dest,
                        source: src,
                        chan_ident,
                        position,
                    })
                } else {
                    Ok(Message::MotGetPosCounter {
                        destination: dest,
                        source: src,
                        chan_ident,
                        position,
                    })
                }
            }
            ID_MOT_REQ_POSCOUNTER => {
                header_only!()?;
                Ok(Message::MotReqPosCounter {
                    destination: dest,
                    source: src,
                    chan_ident: chan_word(p1, p2)?,
                })
            }
            ID_MOT_MOVE_HOME => {
                header_only!()?;
                Ok(Message::MotMoveHome {
                    destination: dest,
                    source: src,
                    chan_ident: chan_word(p1, p2)?,
                })
            }
            ID_MOT_MOVE_HOMED => {
                header_only!()?;
                Ok(Message::MotMoveHomed {
                    destination: dest,
                    source: src,
                    chan_ident: chan_word(p1, p2)?,
                })
            }
            ID_MOT_MOVE_ABSOLUTE => {
                require_data_bit(&peek)?;
                let payload = data_payload(buf, &peek, 6)?;
                Ok(Message::MotMoveAbsolute {
                    destination: dest,
                    source: src,
                    chan_ident: ChanIdent::strict_from_bits(u16::from_le_bytes(
                        payload[0..2].try_into().unwrap(),
                    ))?,
                    absolute_distance: i32::from_le_bytes(payload[2..6].try_into().unwrap()),
                })
            }
            ID_MOT_MOVE_COMPLETED => {
                if peek.has_data {
                    let payload = data_payload(buf, &peek, USTATUS_LEN)?;
                    Ok(Message::MotMoveCompleted {
                        destination: dest,
                        source: src,
                        status: DcStatusUpdate::decode(payload)?,
                    })
                } else {
                    Ok(Message::MotMoveCompletedNoData {
                        destination: dest,
                        source: src,
                        chan_ident: chan_word(p1, p2)?,
                    })
                }
            }
            ID_MOT_MOVE_STOP => {
                header_only!()?;
                Ok(Message::MotMoveStop {
                    destination: dest,
                    source: src,
                    chan_ident: chan_word(p1, 0)?,
                    stop_mode: StopMode::try_from(p2)?,
                })
            }
            ID_MOT_MOVE_STOPPED => {
                require_data_bit(&peek)?;
                let payload = data_payload(buf, &peek, USTATUS_LEN)?;
                Ok(Message::MotMoveStopped {
                    destination: dest,
                    source: src,
                    status: DcStatusUpdate::decode(payload)?,
                })
            }
            ID_MOT_MOVE_JOG => {
                header_only!()?;
                Ok(Message::MotMoveJog {
                    destination: dest,
                    source: src,
                    chan_ident: chan_word(p1, 0)?,
                    direction: JogDirection::try_from(p2)?,
                })
            }
            ID_MOT_REQ_USTATUSUPDATE => {
                header_only!()?;
                Ok(Message::MotReqUStatusUpdate {
                    destination: dest,
                    source: src,
                    chan_ident: chan_word(p1, p2)?,
                })
            }
            ID_MOT_GET_USTATUSUPDATE => {
                require_data_bit(&peek)?;
                let payload = data_payload(buf, &peek, USTATUS_LEN)?;
                Ok(Message::MotGetUStatusUpdate {
                    destination: dest,
                    source: src,
                    status: DcStatusUpdate::decode(payload)?,
                })
            }
            ID_MOT_ACK_USTATUSUPDATE => {
                header_only!()?;
                Ok(Message::MotAckUStatusUpdate {
                    destination: dest,
                    source: src,
                })
            }
            ID_MOT_RESUME_ENDOFMOVEMSGS => {
                header_only!()?;
                Ok(Message::MotResumeEndOfMoveMsgs {
                    destination: dest,
                    source: src,
                })
            }
            ID_POL_SET_PARAMS | ID_POL_GET_PARAMS => {
                require_data_bit(&peek)?;
                let payload = data_payload(buf, &peek, POL_PARAMS_LEN)?;
                let params = PolParams::decode(payload)?;
                if peek.message_id == ID_POL_SET_PARAMS {
                    Ok(Message::PolSetParams {
                        destination: dest,
                        source: src,
                        params,
                    })
                } else {
                    Ok(Message::PolGetParams {
                        destination: dest,
                        source: src,
                        params,
                    })
                }
            }
            ID_POL_REQ_PARAMS => {
                header_only!()?;
                Ok(Message::PolReqParams {
                    destination: dest,
                    source: src,
                })
            }
            ID_RESTOREFACTORYSETTINGS => {
                header_only!()?;
                Ok(Message::RestoreFactorySettings {
                    destination: dest,
                    source: src,
                })
            }
            other => Err(CodecError::UnknownMessageId(other)),
        }
    }
}

fn with_data(id: u16, payload: Vec<u8>, destination: Address, source: Address) -> Vec<u8> {
    let mut out = encode_header_with_data(id, payload.len() as u16, destination, source).to_vec();
    out.extend_from_slice(&payload);
    out
}

fn data_payload<'a>(
    buf: &'a [u8],
    peek: &crate::header::HeaderPeek,
    expected: usize,
) -> Result<&'a [u8], CodecError> {
    if peek.data_length as usize != expected {
        return Err(CodecError::UnexpectedDataLength {
            expected: expected as u16,
            found: peek.data_length,
        });
    }
    let end = HEADER_LEN + expected;
    if buf.len() < end {
        return Err(CodecError::TooShort {
            expected: end,
            found: buf.len(),
        });
    }
    Ok(&buf[HEADER_LEN..end])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encodes_move_absolute_scenario_1() {
        let msg = Message::MotMoveAbsolute {
            destination: Address::Bay(1),
            source: Address::HostController,
            chan_ident: ChanIdent::CHANNEL_1,
            absolute_distance: 200_000,
        };
        let bytes = msg.encode();
        let expected: Vec<u8> = vec![
            0x53, 0x04, 0x06, 0x00, 0xA2, 0x01, 0x01, 0x00, 0x40, 0x0D, 0x03, 0x00,
        ];
        assert_eq!(bytes, expected);
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn encodes_hw_req_info_scenario_2() {
        let msg = Message::HwReqInfo {
            destination: Address::GenericUsb,
            source: Address::HostController,
        };
        let bytes = msg.encode();
        assert_eq!(bytes, vec![0x05, 0x00, 0x00, 0x00, 0x50, 0x01]);
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn decodes_ustatus_scenario_3() {
        let bytes: Vec<u8> = vec![
            0x91, 0x04, 0x0E, 0x00, 0x81, 0x22, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01,
            0xFF, 0xFF, 0x07, 0x00, 0x00, 0x00,
        ];
        let msg = Message::decode(&bytes).unwrap();
        match msg {
            Message::MotGetUStatusUpdate {
                destination,
                source,
                status,
            } => {
                assert_eq!(destination, Address::HostController);
                assert_eq!(source, Address::Bay(1));
                assert_eq!(status.chan_ident, ChanIdent::CHANNEL_1);
                assert_eq!(status.position, 16_777_216);
                assert_eq!(status.velocity, 256);
                assert_eq!(status.motor_current_ma, -1);
                assert_eq!(
                    status.status,
                    StatusBits::CWHARDLIMIT | StatusBits::CCWHARDLIMIT | StatusBits::CWSOFTLIMIT
                );
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn move_completed_shapes_are_distinct_tags() {
        let header_only = Message::MotMoveCompletedNoData {
            destination: Address::HostController,
            source: Address::GenericUsb,
            chan_ident: ChanIdent::CHANNEL_1,
        };
        let round_tripped = Message::decode(&header_only.encode()).unwrap();
        assert_eq!(round_tripped, header_only);

        let with_payload = Message::MotMoveCompleted {
            destination: Address::HostController,
            source: Address::GenericUsb,
            status: DcStatusUpdate {
                chan_ident: ChanIdent::CHANNEL_1,
                position: 10,
                velocity: 0,
                motor_current_ma: 0,
                status: StatusBits::empty(),
            },
        };
        let round_tripped = Message::decode(&with_payload.encode()).unwrap();
        assert_eq!(round_tripped, with_payload);
        assert_ne!(header_only.encode().len(), with_payload.encode().len());
    }

    #[test]
    fn rejects_wrong_data_length() {
        let mut bytes = Message::HwReqInfo {
            destination: Address::GenericUsb,
            source: Address::HostController,
        }
        .encode();
        // Flip on the data bit with a bogus length to provoke the with-data path.
        bytes[2] = 0x01;
        bytes[4] |= 0x80;
        bytes.push(0x00);
        let err = Message::decode(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedDataBit { .. }));
    }

    #[test]
    fn pol_params_round_trip() {
        let msg = Message::PolSetParams {
            destination: Address::GenericUsb,
            source: Address::HostController,
            params: PolParams {
                velocity: 75,
                home_position: 0,
                jog_step_1: 50,
                jog_step_2: 50,
                jog_step_3: 50,
            },
        };
        let bytes = msg.encode();
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn firmware_version_field_order() {
        let fw = FirmwareVersion::decode([0x00, 0x02, 0x01, 0x03]);
        assert_eq!(fw.unused, 0);
        assert_eq!(fw.minor, 2);
        assert_eq!(fw.interim, 1);
        assert_eq!(fw.major, 3);
        assert_eq!(fw.encode(), [0x00, 0x02, 0x01, 0x03]);
    }
}
