/// StructureNode manufacturer payload decoding (protocols V2, V3A, V4)
use crate::models::{DecodedReading, DecodedV2, DecodedV3A, DecodedV4, Location};

// StructureNode protocol constants
pub const COMPANY_ID: u16 = 0xFFFF; // test-range company identifier used on-air
pub const PROTOCOL_V2: u16 = 0x0002;
pub const PROTOCOL_V3A: u16 = 0x0003;
pub const PROTOCOL_V4: u16 = 0x0004;

// Fixed layout lengths in bytes. V2 and V3A carry the company id prefix;
// V4 is usually advertised without it.
const LEN_V2: usize = 24;
const LEN_V3A: usize = 26;
const LEN_V4_NOPREFIX: usize = 25;
const LEN_V4_PREFIXED: usize = LEN_V4_NOPREFIX + 2;

fn u16_at(b: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([b[off], b[off + 1]])
}

fn i16_at(b: &[u8], off: usize) -> i16 {
    i16::from_le_bytes([b[off], b[off + 1]])
}

fn u32_at(b: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]])
}

/// Decode the V4 layout starting at `off` (0 for unprefixed, 2 when the
/// company id prefix is present).
fn decode_v4_at(b: &[u8], off: usize) -> DecodedV4 {
    DecodedV4 {
        location: Location::from_raw(b[off + 2]),
        temp_c: i16_at(b, off + 3) as f64 / 100.0,
        hum_pct: u16_at(b, off + 5) as f64 / 100.0,
        press_hpa: u16_at(b, off + 7) as f64 / 10.0,
        batt_mv: u16_at(b, off + 9),
        flags: u16_at(b, off + 11),
        seq: u16_at(b, off + 13),
        motion0: u16_at(b, off + 15),
        motion1: u16_at(b, off + 17),
        batt_pct: b[off + 19],
        // b[off + 20] is reserved
        uptime_min: u16_at(b, off + 21),
        dew_point_c: i16_at(b, off + 23) as f64 / 100.0,
    }
}

/// Decode manufacturer bytes for protocols V2, V3A or V4.
///
/// Input may be:
/// - V2/V3A: bytes include the company id first (company, protocol, ...)
/// - V4: bytes are usually unprefixed and begin with the protocol tag
///
/// Returns `None` for any length mismatch, unknown protocol tag or
/// unrecognized company id. Multi-byte fields are little-endian; fixed-point
/// fields are descaled by 100 (temperature, humidity, dew point) or 10
/// (pressure).
pub fn decode_payload(mfg: &[u8]) -> Option<DecodedReading> {
    if mfg.len() < 2 {
        return None;
    }

    // Try V4 unprefixed first (the common case with the BLE stack stripping
    // the company id).
    if mfg.len() == LEN_V4_NOPREFIX && u16_at(mfg, 0) == PROTOCOL_V4 {
        return Some(DecodedReading::V4(decode_v4_at(mfg, 0)));
    }

    // Prefixed formats need at least company id + protocol.
    if mfg.len() < 4 {
        return None;
    }

    let company = u16_at(mfg, 0);
    let proto = u16_at(mfg, 2);
    if company != COMPANY_ID {
        return None;
    }

    // V4 prefixed (rare)
    if proto == PROTOCOL_V4 && mfg.len() == LEN_V4_PREFIXED {
        return Some(DecodedReading::V4(decode_v4_at(mfg, 2)));
    }

    if proto == PROTOCOL_V2 {
        if mfg.len() != LEN_V2 {
            return None;
        }
        return Some(DecodedReading::V2(DecodedV2 {
            temp_c: i16_at(mfg, 4) as f64 / 100.0,
            hum_pct: u16_at(mfg, 6) as f64 / 100.0,
            press_hpa: u16_at(mfg, 8) as f64 / 10.0,
            batt_mv: u16_at(mfg, 10),
            flags: u16_at(mfg, 12),
            seq: u16_at(mfg, 14),
            motion0: u32_at(mfg, 16),
            motion1: u32_at(mfg, 20),
        }));
    }

    if proto == PROTOCOL_V3A {
        if mfg.len() != LEN_V3A {
            return None;
        }
        return Some(DecodedReading::V3A(DecodedV3A {
            temp_c: i16_at(mfg, 4) as f64 / 100.0,
            hum_pct: u16_at(mfg, 6) as f64 / 100.0,
            press_hpa: u16_at(mfg, 8) as f64 / 10.0,
            batt_mv: u16_at(mfg, 10),
            flags: u16_at(mfg, 12),
            seq: u16_at(mfg, 14),
            motion0: u16_at(mfg, 16),
            motion1: u16_at(mfg, 18),
            batt_pct: mfg[20],
            // mfg[21] is reserved
            uptime_min: u16_at(mfg, 22),
            dew_point_c: i16_at(mfg, 24) as f64 / 100.0,
        }));
    }

    None
}


#[cfg(test)]
mod tests {
    use super::testdata::{encode_v2, encode_v3a, encode_v4, Fields};
    use super::*;

    #[test]
    fn rejects_short_and_empty_buffers() {
        assert_eq!(decode_payload(&[]), None);
        assert_eq!(decode_payload(&[0x02]), None);
        assert_eq!(decode_payload(&[0xFF, 0xFF, 0x02]), None);
    }

    #[test]
    fn v2_round_trip() {
        let buf = encode_v2(&Fields::default(), 3, 9);
        assert_eq!(buf.len(), 24);
        match decode_payload(&buf) {
            Some(DecodedReading::V2(d)) => {
                assert!((d.temp_c - 22.34).abs() < 1e-9);
                assert!((d.hum_pct - 55.22).abs() < 1e-9);
                assert!((d.press_hpa - 1013.2).abs() < 1e-9);
                assert_eq!(d.batt_mv, 3700);
                assert_eq!(d.seq, 7);
                assert_eq!(d.motion0, 3);
                assert_eq!(d.motion1, 9);
            }
            other => panic!("expected V2, got {:?}", other),
        }
    }

    #[test]
    fn v3a_round_trip() {
        let buf = encode_v3a(&Fields::default(), 11, 12, 87, 360, -150);
        assert_eq!(buf.len(), 26);
        match decode_payload(&buf) {
            Some(DecodedReading::V3A(d)) => {
                assert_eq!(d.batt_pct, 87);
                assert_eq!(d.uptime_min, 360);
                assert!((d.dew_point_c - (-1.5)).abs() < 1e-9);
                assert_eq!(d.motion0, 11);
                assert_eq!(d.motion1, 12);
            }
            other => panic!("expected V3A, got {:?}", other),
        }
    }

    #[test]
    fn v4_unprefixed_round_trip() {
        let buf = encode_v4(&Fields::default(), 1, 5, 6, 90, 1440, 812);
        assert_eq!(buf.len(), 25);
        match decode_payload(&buf) {
            Some(DecodedReading::V4(d)) => {
                assert_eq!(d.location, Location::Crawlspace);
                assert_eq!(d.batt_pct, 90);
                assert_eq!(d.uptime_min, 1440);
                assert!((d.dew_point_c - 8.12).abs() < 1e-9);
            }
            other => panic!("expected V4, got {:?}", other),
        }
    }

    #[test]
    fn v4_prefixed_round_trip() {
        let mut buf = COMPANY_ID.to_le_bytes().to_vec();
        buf.extend_from_slice(&encode_v4(&Fields::default(), 2, 0, 0, 77, 10, 0));
        assert_eq!(buf.len(), 27);
        match decode_payload(&buf) {
            Some(DecodedReading::V4(d)) => {
                assert_eq!(d.location, Location::Basement);
                assert_eq!(d.batt_pct, 77);
            }
            other => panic!("expected prefixed V4, got {:?}", other),
        }
    }

    #[test]
    fn v4_location_above_range_clamps_to_other() {
        let buf = encode_v4(&Fields::default(), 5, 0, 0, 50, 0, 0);
        match decode_payload(&buf) {
            Some(DecodedReading::V4(d)) => assert_eq!(d.location, Location::Other),
            other => panic!("expected V4 with clamped location, got {:?}", other),
        }
    }

    #[test]
    fn negative_temperature_decodes() {
        let fields = Fields {
            temp_x100: -512,
            ..Fields::default()
        };
        let buf = encode_v2(&fields, 0, 0);
        match decode_payload(&buf) {
            Some(DecodedReading::V2(d)) => assert!((d.temp_c - (-5.12)).abs() < 1e-9),
            other => panic!("expected V2, got {:?}", other),
        }
    }

    #[test]
    fn length_must_match_exactly() {
        for buf in [
            encode_v2(&Fields::default(), 0, 0),
            encode_v3a(&Fields::default(), 0, 0, 50, 0, 0),
            encode_v4(&Fields::default(), 0, 0, 0, 50, 0, 0),
        ] {
            let mut truncated = buf.clone();
            truncated.pop();
            assert_eq!(decode_payload(&truncated), None, "truncated must fail");

            let mut extended = buf.clone();
            extended.push(0);
            assert_eq!(decode_payload(&extended), None, "extended must fail");
        }
    }

    #[test]
    fn unknown_company_id_fails() {
        let mut buf = encode_v2(&Fields::default(), 0, 0);
        buf[0] = 0x99;
        buf[1] = 0x04;
        assert_eq!(decode_payload(&buf), None);
    }

    #[test]
    fn unknown_protocol_tag_fails() {
        let mut buf = encode_v2(&Fields::default(), 0, 0);
        buf[2] = 0x07;
        assert_eq!(decode_payload(&buf), None);
    }

    #[test]
    fn v2_length_with_v3a_tag_fails() {
        let mut buf = encode_v2(&Fields::default(), 0, 0);
        buf[2] = 0x03; // tag says V3A but length is V2's
        assert_eq!(decode_payload(&buf), None);
    }
}
