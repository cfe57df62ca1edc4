//! Phase framing. All multi-byte values travel big-endian.

/// Length of the address phase in bytes.
pub const ADDRESS_LENGTH: usize = 2;

/// Length of a data phase in bytes.
pub const DATA_LENGTH: usize = 4;

/// Length of a combined address + data write.
pub const WRITE_FRAME_LENGTH: usize = ADDRESS_LENGTH + DATA_LENGTH;

#[inline]
pub fn encode_address(address: u16) -> [u8; ADDRESS_LENGTH] {
    address.to_be_bytes()
}

/// Parses an address phase. Returns `None` unless `bytes` is exactly [`ADDRESS_LENGTH`] long.
#[inline]
pub fn decode_address(bytes: &[u8]) -> Option<u16> {
    let bytes: [u8; ADDRESS_LENGTH] = bytes.try_into().ok()?;
    Some(u16::from_be_bytes(bytes))
}

#[inline]
pub fn encode_data(value: u32) -> [u8; DATA_LENGTH] {
    value.to_be_bytes()
}

/// Parses a data phase. Returns `None` unless `bytes` is exactly [`DATA_LENGTH`] long.
#[inline]
pub fn decode_data(bytes: &[u8]) -> Option<u32> {
    let bytes: [u8; DATA_LENGTH] = bytes.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Builds the single write frame used for a register write.
pub fn encode_write(address: u16, value: u32) -> [u8; WRITE_FRAME_LENGTH] {
    let mut frame = [0u8; WRITE_FRAME_LENGTH];
    frame[..ADDRESS_LENGTH].copy_from_slice(&encode_address(address));
    frame[ADDRESS_LENGTH..].copy_from_slice(&encode_data(value));
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_big_endian() {
        assert_eq!(encode_address(0x0100), [0x01, 0x00]);
        assert_eq!(encode_data(0x1234_5678), [0x12, 0x34, 0x56, 0x78]);
        assert_eq!(decode_data(&[0x00, 0x00, 0x01, 0x2C]), Some(300));
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert_eq!(decode_address(&[0x01]), None);
        assert_eq!(decode_address(&[0x01, 0x02, 0x03]), None);
        assert_eq!(decode_data(&[0; 3]), None);
        assert_eq!(decode_data(&[0; 5]), None);
    }

    #[test]
    fn write_frame_is_address_then_data() {
        assert_eq!(
            encode_write(0x0040, 250),
            [0x00, 0x40, 0x00, 0x00, 0x00, 0xFA]
        );
    }
}
