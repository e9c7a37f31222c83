use time::OffsetDateTime;

/// Sensor placement reported by V4 nodes (two DIP switches on the board).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Attic = 0,
    Crawlspace = 1,
    Basement = 2,
    Other = 3,
}

impl Location {
    /// Raw values above 3 are clamped to `Other`, never rejected.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Location::Attic,
            1 => Location::Crawlspace,
            2 => Location::Basement,
            _ => Location::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Location::Attic => "Attic",
            Location::Crawlspace => "Crawlspace",
            Location::Basement => "Basement",
            Location::Other => "Other",
        }
    }
}

/// V2 payload: core sensor fields plus 32-bit lifetime motion counters.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedV2 {
    pub temp_c: f64,
    pub hum_pct: f64,
    pub press_hpa: f64,
    pub batt_mv: u16,
    pub flags: u16,
    pub seq: u16,
    pub motion0: u32,
    pub motion1: u32,
}

/// V3A payload: V2's sensor fields with 16-bit motion counters, plus
/// battery percent, uptime and dew point.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedV3A {
    pub temp_c: f64,
    pub hum_pct: f64,
    pub press_hpa: f64,
    pub batt_mv: u16,
    pub flags: u16,
    pub seq: u16,
    pub motion0: u16,
    pub motion1: u16,
    pub batt_pct: u8,
    pub uptime_min: u16,
    pub dew_point_c: f64,
}

/// V4 payload: V3A's fields plus the DIP-derived location.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedV4 {
    pub location: Location,
    pub temp_c: f64,
    pub hum_pct: f64,
    pub press_hpa: f64,
    pub batt_mv: u16,
    pub flags: u16,
    pub seq: u16,
    pub motion0: u16,
    pub motion1: u16,
    pub batt_pct: u8,
    pub uptime_min: u16,
    pub dew_point_c: f64,
}

/// One successfully decoded advertisement payload. Exactly one variant is
/// produced per decode; the variant is determined by the protocol tag and
/// the exact byte length consumed.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedReading {
    V2(DecodedV2),
    V3A(DecodedV3A),
    V4(DecodedV4),
}

impl DecodedReading {
    pub fn protocol(&self) -> u16 {
        match self {
            DecodedReading::V2(_) => 0x0002,
            DecodedReading::V3A(_) => 0x0003,
            DecodedReading::V4(_) => 0x0004,
        }
    }

}

/// Flattened storage row: decoded fields widened to database types, with
/// source identity and radio metadata attached. Variant-specific fields are
/// nullable so V2 rows remain valid.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingRecord {
    pub recorded_at: OffsetDateTime,
    pub source: String,
    pub rssi: i32,
    pub temp_c: f64,
    pub hum_pct: f64,
    pub press_hpa: f64,
    pub batt_mv: i32,
    pub flags: i32,
    pub seq: i32,
    pub motion0: i64,
    pub motion1: i64,
    pub batt_pct: Option<i32>,
    pub uptime_min: Option<i32>,
    pub dew_point_c: Option<f64>,
    pub location: Option<i32>,
}

impl ReadingRecord {
    /// Flatten a decoded payload into a storage row, timestamped now.
    pub fn from_decoded(source: &str, rssi: i16, decoded: &DecodedReading) -> Self {
        let recorded_at = OffsetDateTime::now_utc();
        match decoded {
            DecodedReading::V2(d) => ReadingRecord {
                recorded_at,
                source: source.to_string(),
                rssi: rssi as i32,
                temp_c: d.temp_c,
                hum_pct: d.hum_pct,
                press_hpa: d.press_hpa,
                batt_mv: d.batt_mv as i32,
                flags: d.flags as i32,
                seq: d.seq as i32,
                motion0: d.motion0 as i64,
                motion1: d.motion1 as i64,
                batt_pct: None,
                uptime_min: None,
                dew_point_c: None,
                location: None,
            },
            DecodedReading::V3A(d) => ReadingRecord {
                recorded_at,
                source: source.to_string(),
                rssi: rssi as i32,
                temp_c: d.temp_c,
                hum_pct: d.hum_pct,
                press_hpa: d.press_hpa,
                batt_mv: d.batt_mv as i32,
                flags: d.flags as i32,
                seq: d.seq as i32,
                motion0: d.motion0 as i64,
                motion1: d.motion1 as i64,
                batt_pct: Some(d.batt_pct as i32),
                uptime_min: Some(d.uptime_min as i32),
                dew_point_c: Some(d.dew_point_c),
                location: None,
            },
            DecodedReading::V4(d) => ReadingRecord {
                recorded_at,
                source: source.to_string(),
                rssi: rssi as i32,
                temp_c: d.temp_c,
                hum_pct: d.hum_pct,
                press_hpa: d.press_hpa,
                batt_mv: d.batt_mv as i32,
                flags: d.flags as i32,
                seq: d.seq as i32,
                motion0: d.motion0 as i64,
                motion1: d.motion1 as i64,
                batt_pct: Some(d.batt_pct as i32),
                uptime_min: Some(d.uptime_min as i32),
                dew_point_c: Some(d.dew_point_c),
                location: Some(d.location as i32),
            },
        }
    }
}
