//! CRC24 armor checksum (RFC 4880 section 6.1)

const CRC24_INIT: u32 = 0x00B7_04CE;
const CRC24_POLY: u32 = 0x0186_4CFB;
const CRC24_MASK: u32 = 0x00FF_FFFF;

/// Compute the OpenPGP CRC24 of `data`. Total over any input, including empty.
pub fn crc24(data: &[u8]) -> u32 {
    let mut crc = CRC24_INIT;
    for &byte in data {
        crc ^= u32::from(byte) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }
    crc & CRC24_MASK
}

/// Pack a checksum as the 3 big-endian bytes written to the armor tail.
pub(crate) fn to_be_bytes(crc: u32) -> [u8; 3] {
    [(crc >> 16) as u8, (crc >> 8) as u8, crc as u8]
}

pub(crate) fn from_be_bytes(bytes: [u8; 3]) -> u32 {
    (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2])
}
