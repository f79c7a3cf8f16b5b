//! ISO/IEC 14443-A CRC16 used by the encrypted APDU envelope

/// CRC_A initial register value
const CRC_A_INIT: u16 = 0x6363;

/// Compute the ISO/IEC 14443-A CRC16 of `data`.
///
/// # Returns
/// The checksum in transmission order (least significant byte first).
pub fn crc16(data: &[u8]) -> [u8; 2] {
    let crc = data.iter().fold(CRC_A_INIT, |crc, &byte| update(byte, crc));
    crc.to_le_bytes()
}

const fn update(byte: u8, crc: u16) -> u16 {
    let mut ch = byte ^ (crc & 0x00FF) as u8;
    ch ^= ch << 4;
    let ch = ch as u16;
    (crc >> 8) ^ (ch << 8) ^ (ch << 3) ^ (ch >> 4)
}
