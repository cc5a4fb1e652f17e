use anyhow::{Result, bail};

/// Decoded accessory location report: the 10-byte big-endian payload of
/// lat/lon scaled by 1e7 plus confidence and status bytes.
///
/// Decoder for downstream consumers of the raw fetch payload; the proxy
/// itself relays reports undecoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportTag {
    pub latitude: f64,
    pub longitude: f64,
    pub confidence: u8,
    pub status: u8,
}

pub fn decode_tag(data: &[u8]) -> Result<ReportTag> {
    if data.len() < 10 {
        bail!("tag payload too short: {} bytes", data.len());
    }
    let latitude = i32::from_be_bytes([data[0], data[1], data[2], data[3]]) as f64 / 10_000_000.0;
    let longitude = i32::from_be_bytes([data[4], data[5], data[6], data[7]]) as f64 / 10_000_000.0;
    Ok(ReportTag {
        latitude,
        longitude,
        confidence: data[8],
        status: data[9],
    })
}
