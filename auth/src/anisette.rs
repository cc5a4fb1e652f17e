use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use crate::error::AuthError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const MD_RINFO: &str = "17106176";

/// Process-stable device identity. Generated once at startup and shared
/// read-only across attempts: it names the device, not the session.
#[derive(Clone, Debug)]
pub struct DeviceIdentity {
    pub user_id: Uuid,
    pub device_id: Uuid,
}

impl DeviceIdentity {
    pub fn generate() -> Self {
        Self {
            user_id: Uuid::new_v4(),
            device_id: Uuid::new_v4(),
        }
    }
}

/// Attestation header set folded into every signed request. Rebuilt per
/// request — the server rejects stale client-time values.
#[derive(Clone, Debug)]
pub struct AnisetteHeaders {
    pub machine_id: String,
    pub machine_id_meta: String,
    pub client_time: String,
    pub time_zone: String,
    pub locale: String,
    pub routing_info: String,
    pub user_id_b64: String,
    pub device_id_upper: String,
    pub serial_number: String,
}

impl AnisetteHeaders {
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("X-Apple-I-MD", self.machine_id.clone()),
            ("X-Apple-I-MD-M", self.machine_id_meta.clone()),
            ("X-Apple-I-Client-Time", self.client_time.clone()),
            ("X-Apple-I-TimeZone", self.time_zone.clone()),
            ("loc", self.locale.clone()),
            ("X-Apple-Locale", self.locale.clone()),
            ("X-Apple-I-MD-RINFO", self.routing_info.clone()),
            ("X-Apple-I-MD-LU", self.user_id_b64.clone()),
            ("X-Mme-Device-Id", self.device_id_upper.clone()),
            ("X-Apple-I-SRL-NO", self.serial_number.clone()),
        ]
    }
}

/// The two attestation fields only the external provider can produce.
#[derive(Debug, Deserialize)]
struct BaseFields {
    #[serde(rename = "X-Apple-I-MD")]
    machine_id: String,
    #[serde(rename = "X-Apple-I-MD-M")]
    machine_id_meta: String,
}

/// Adapter for the external anisette provider. Its failures are reported
/// apart from authentication failures: an unreachable provider almost
/// always means local infrastructure trouble, not bad credentials.
#[derive(Clone)]
pub struct AnisetteClient {
    http: reqwest::Client,
    url: String,
}

impl AnisetteClient {
    pub fn new(url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("http client construction");
        Self { http, url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_base(&self) -> Result<BaseFields, AuthError> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AuthError::AnisetteUnavailable(format!("{}: {e}", self.url)))?;
        if !resp.status().is_success() {
            return Err(AuthError::AnisetteUnavailable(format!(
                "{} returned HTTP {}",
                self.url,
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| AuthError::AnisetteUnavailable(format!("{}: {e}", self.url)))
    }

    /// The full header set for one signed request: provider fields plus
    /// freshly computed time/locale metadata and the device identifiers.
    pub async fn build_headers(
        &self,
        device: &DeviceIdentity,
    ) -> Result<AnisetteHeaders, AuthError> {
        let base = self.fetch_base().await?;
        Ok(AnisetteHeaders {
            machine_id: base.machine_id,
            machine_id_meta: base.machine_id_meta,
            client_time: client_time_now(),
            time_zone: "UTC".to_string(),
            locale: locale_from(std::env::var("LANG").ok()),
            routing_info: MD_RINFO.to_string(),
            user_id_b64: B64.encode(device.user_id.to_string().to_uppercase()),
            device_id_upper: device.device_id.to_string().to_uppercase(),
            serial_number: "0".to_string(),
        })
    }
}

fn client_time_now() -> String {
    // Second precision with a trailing Z, e.g. 2026-08-07T12:00:00Z
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn locale_from(lang: Option<String>) -> String {
    lang.and_then(|v| v.split('.').next().map(str::to_string))
        .filter(|v| !v.is_empty() && v != "C" && v != "POSIX")
        .unwrap_or_else(|| "en_US".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_falls_back_to_en_us() {
        assert_eq!(locale_from(None), "en_US");
        assert_eq!(locale_from(Some("C".into())), "en_US");
        assert_eq!(locale_from(Some("POSIX".into())), "en_US");
        assert_eq!(locale_from(Some("de_DE.UTF-8".into())), "de_DE");
        assert_eq!(locale_from(Some("en_GB".into())), "en_GB");
    }

    #[test]
    fn client_time_is_second_precision_utc() {
        let t = client_time_now();
        assert_eq!(t.len(), 20);
        assert!(t.ends_with('Z'));
        assert_eq!(&t[4..5], "-");
        assert_eq!(&t[10..11], "T");
    }

    #[test]
    fn header_pairs_carry_both_locale_keys() {
        let device = DeviceIdentity::generate();
        let headers = AnisetteHeaders {
            machine_id: "md".into(),
            machine_id_meta: "mdm".into(),
            client_time: client_time_now(),
            time_zone: "UTC".into(),
            locale: "en_US".into(),
            routing_info: MD_RINFO.into(),
            user_id_b64: B64.encode(device.user_id.to_string().to_uppercase()),
            device_id_upper: device.device_id.to_string().to_uppercase(),
            serial_number: "0".into(),
        };
        let pairs = headers.pairs();
        let names: Vec<&str> = pairs.iter().map(|(n, _)| *n).collect();
        assert!(names.contains(&"loc"));
        assert!(names.contains(&"X-Apple-Locale"));
        assert!(names.contains(&"X-Apple-I-MD"));
        assert!(names.contains(&"X-Apple-I-MD-M"));
        assert_eq!(pairs.len(), 10);
    }
}
