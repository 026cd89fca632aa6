// SPDX-License-Identifier: GPL-3.0-or-later

use crate::{Address, CodecError};

/// Every APT frame starts with this many bytes: message id (2), then either
/// two parameter bytes or a data-length word, then source and destination.
pub const HEADER_LEN: usize = 6;

const DEST_DATA_BIT: u8 = 0x80;

/// The decoded first six bytes of a frame, before we know which concrete
/// message it is.
///
/// The RX dispatcher peeks the header to learn the message id and, for
/// with-data messages, how many trailing bytes to read before handing the
/// whole frame to [`crate::Message::decode`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct HeaderPeek {
    pub message_id: u16,
    pub has_data: bool,
    /// Valid only when `has_data` is true: the length of the payload that
    /// follows the six header bytes.
    pub data_length: u16,
    pub destination: Address,
    pub source: Address,
}

/// Decode the fixed six-byte header shared by every APT message.
///
/// This does not interpret the two parameter bytes for header-only
/// messages; callers that need them slice `buf[2..4]` themselves once they
/// know the concrete message type.
pub fn decode_header(buf: &[u8]) -> Result<HeaderPeek, CodecError> {
    if buf.len() < HEADER_LEN {
        return Err(CodecError::TooShort {
            expected: HEADER_LEN,
            found: buf.len(),
        });
    }
    let message_id = u16::from_le_bytes([buf[0], buf[1]]);
    let dest_raw = buf[4];
    let has_data = dest_raw & DEST_DATA_BIT != 0;
    let destination = Address::try_from(dest_raw & !DEST_DATA_BIT)?;
    let source = Address::try_from(buf[5])?;
    let data_length = if has_data {
        u16::from_le_bytes([buf[2], buf[3]])
    } else {
        0
    };
    Ok(HeaderPeek {
        message_id,
        has_data,
        data_length,
        destination,
        source,
    })
}

/// Write the shared six-byte header-only frame prefix: message id, two
/// parameter bytes, destination, source.
pub(crate) fn encode_header_only(
    message_id: u16,
    param1: u8,
    param2: u8,
    destination: Address,
    source: Address,
) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[0..2].copy_from_slice(&message_id.to_le_bytes());
    out[2] = param1;
    out[3] = param2;
    out[4] = u8::from(destination);
    out[5] = u8::from(source);
    out
}

/// Write the shared six-byte with-data frame prefix: message id, data
/// length, destination (high bit set), source. The payload follows.
pub(crate) fn encode_header_with_data(
    message_id: u16,
    data_length: u16,
    destination: Address,
    source: Address,
) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[0..2].copy_from_slice(&message_id.to_le_bytes());
    out[2..4].copy_from_slice(&data_length.to_le_bytes());
    out[4] = u8::from(destination) | DEST_DATA_BIT;
    out[5] = u8::from(source);
    out
}

/// Require that a with-data frame's destination byte had the data bit set,
/// as decoded by [`decode_header`].
pub(crate) fn require_data_bit(peek: &HeaderPeek) -> Result<(), CodecError> {
    if peek.has_data {
        Ok(())
    } else {
        Err(CodecError::MissingDataBit {
            destination: u8::from(peek.destination),
        })
    }
}

/// Require that a header-only frame's destination byte did not have the
/// data bit set, as decoded by [`decode_header`].
pub(crate) fn require_no_data_bit(peek: &HeaderPeek) -> Result<(), CodecError> {
    if peek.has_data {
        Err(CodecError::UnexpectedDataBit {
            destination: u8::from(peek.destination) | DEST_DATA_BIT,
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_header_only_frame() {
        let buf = encode_header_only(
            0x0491,
            0x01,
            0x00,
            Address::GenericUsb,
            Address::HostController,
        );
        let peek = decode_header(&buf).unwrap();
        assert_eq!(peek.message_id, 0x0491);
        assert!(!peek.has_data);
        assert_eq!(peek.destination, Address::GenericUsb);
        assert_eq!(peek.source, Address::HostController);
    }

    #[test]
    fn decodes_with_data_frame_and_sets_data_bit() {
        let buf = encode_header_with_data(0x0446, 14, Address::GenericUsb, Address::HostController);
        let peek = decode_header(&buf).unwrap();
        assert!(peek.has_data);
        assert_eq!(peek.data_length, 14);
        assert_eq!(peek.destination, Address::GenericUsb);
        require_data_bit(&peek).unwrap();
    }

    #[test]
    fn rejects_short_buffer() {
        assert_eq!(
            Err(CodecError::TooShort {
                expected: 6,
                found: 3
            }),
            decode_header(&[0, 1, 2])
        );
    }
}
