//! BLE location-characteristic frame decoding.
//!
//! The tag firmware packs X/Y/Z as unsigned 16-bit millimetre values at
//! fixed offsets, with the *later* byte of each pair being the high byte:
//!
//! ```text
//! X = frame[2] << 8 | frame[1]
//! Y = frame[6] << 8 | frame[5]
//! Z = frame[10] << 8 | frame[9]
//! ```
//!
//! This offset/order contract is load-bearing for hardware compatibility and
//! must never change.

use rovos_types::RadioError;

use crate::transport::RawPosition;

/// GATT characteristic UUID carrying the location frame.
pub const LOC_DATA_UUID: &str = "003bbdf2-c634-4b3d-ab56-7ec889b89a37";

/// Minimum payload length: the Z high byte sits at offset 10.
pub const MIN_FRAME_LEN: usize = 11;

/// Decode one location frame into millimetre coordinates.
///
/// # Errors
///
/// Returns [`RadioError::ReadMalformed`] when the payload is shorter than
/// [`MIN_FRAME_LEN`].
pub fn decode_location_frame(payload: &[u8]) -> Result<RawPosition, RadioError> {
    if payload.len() < MIN_FRAME_LEN {
        return Err(RadioError::ReadMalformed(format!(
            "location frame too short: {} bytes, need {}",
            payload.len(),
            MIN_FRAME_LEN
        )));
    }
    let word = |high: usize, low: usize| u16::from(payload[high]) << 8 | u16::from(payload[low]);
    Ok(RawPosition {
        x_mm: f64::from(word(2, 1)),
        y_mm: f64::from(word(6, 5)),
        z_mm: f64::from(word(10, 9)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_reference_vector() {
        // Offsets 1..2 = 0x01,0x02 → X = 0x0201 = 513 mm;
        // offsets 5..6 = 0x03,0x04 → Y = 0x0403 = 1027 mm.
        let mut payload = [0u8; 14];
        payload[1] = 0x01;
        payload[2] = 0x02;
        payload[5] = 0x03;
        payload[6] = 0x04;
        let pos = decode_location_frame(&payload).unwrap();
        assert_eq!(pos.x_mm, 513.0);
        assert_eq!(pos.y_mm, 1027.0);
        assert_eq!(pos.z_mm, 0.0);
    }

    #[test]
    fn decodes_z_axis() {
        let mut payload = [0u8; 11];
        payload[9] = 0xff;
        payload[10] = 0x01;
        let pos = decode_location_frame(&payload).unwrap();
        assert_eq!(pos.z_mm, f64::from(0x01ffu16));
    }

    #[test]
    fn max_coordinate_does_not_overflow() {
        let mut payload = [0u8; 11];
        payload[1] = 0xff;
        payload[2] = 0xff;
        let pos = decode_location_frame(&payload).unwrap();
        assert_eq!(pos.x_mm, 65535.0);
    }

    #[test]
    fn short_frame_is_malformed() {
        let payload = [0u8; 10];
        let err = decode_location_frame(&payload).unwrap_err();
        assert!(matches!(err, RadioError::ReadMalformed(_)));
    }

    #[test]
    fn empty_frame_is_malformed() {
        assert!(decode_location_frame(&[]).is_err());
    }

    #[test]
    fn exact_minimum_length_is_accepted() {
        let payload = [0u8; MIN_FRAME_LEN];
        assert!(decode_location_frame(&payload).is_ok());
    }
}
