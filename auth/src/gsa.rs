use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use owo_colors::OwoColorize;
use plist::{Dictionary, Value};
use std::time::Duration;

use crate::anisette::{AnisetteClient, DeviceIdentity};
use crate::crypto::{self, ProtocolVariant};
use crate::error::AuthError;
use crate::srp::ClientSession;
use crate::two_factor::{self, CodePrompt, net_err};

const GSA_ENDPOINT: &str = "https://gsa.apple.com/grandslam/GsService2";
const GSA_USER_AGENT: &str = "akd/1.0 CFNetwork/978.0.7 Darwin/18.7.0";
pub(crate) const CLIENT_INFO: &str =
    "<MacBookPro18,3> <Mac OS X;13.4.1;22F8> <com.apple.AOSKit/282 (com.apple.dt.Xcode/3594.4.19)>";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// One automatic restart after a verified second factor; a second demand in
// the same call is a protocol anomaly, not something to loop on.
const MAX_SECOND_FACTOR_RESTARTS: usize = 1;

// The decrypted spd arrives as an XML plist with the document header
// stripped; strict parsers want it back.
const PLIST_HEADER: &[u8] = b"<?xml version='1.0' encoding='UTF-8'?>\n<!DOCTYPE plist PUBLIC '-//Apple//DTD PLIST 1.0//EN' 'http://www.apple.com/DTDs/PropertyList-1.0.dtd'>\n";

const SECONDARY_AUTH_MODES: [&str; 2] = ["trustedDeviceSecondaryAuth", "secondaryAuth"];

/// Consumed once per attempt; never persisted here.
pub struct Credentials {
    pub username: String,
    pub password: String,
}

enum Attempt {
    Authenticated(Dictionary),
    SecondFactorVerified,
}

/// Drives the GrandSlam handshake: SRP init and completion, session-key
/// payload decryption, and the second-factor branch.
pub struct GsaClient {
    http: reqwest::Client,
    anisette: AnisetteClient,
    device: DeviceIdentity,
}

impl GsaClient {
    pub fn new(anisette: AnisetteClient, device: DeviceIdentity) -> Self {
        // The GSA endpoints present certificates the local store may not
        // trust; the exchange's integrity rests on the SRP proofs.
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()
            .expect("http client construction");
        Self {
            http,
            anisette,
            device,
        }
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Runs the full login sequence and returns the decrypted account
    /// payload. A verified second factor restarts the sequence from the
    /// top — the server expects a fresh handshake, not a resumption.
    pub async fn authenticate(
        &self,
        creds: &Credentials,
        prompt: &dyn CodePrompt,
    ) -> Result<Dictionary, AuthError> {
        for _ in 0..=MAX_SECOND_FACTOR_RESTARTS {
            match self.attempt(creds, prompt).await? {
                Attempt::Authenticated(spd) => return Ok(spd),
                Attempt::SecondFactorVerified => continue,
            }
        }
        Err(AuthError::SecondFactorLoop)
    }

    async fn attempt(
        &self,
        creds: &Credentials,
        prompt: &dyn CodePrompt,
    ) -> Result<Attempt, AuthError> {
        let mut session = ClientSession::new(&creds.username);
        let a_pub = session.start()?;

        let mut init = Dictionary::new();
        init.insert("A2k".into(), Value::Data(a_pub));
        init.insert(
            "ps".into(),
            Value::Array(
                ProtocolVariant::SUPPORTED
                    .iter()
                    .map(|s| Value::String((*s).to_string()))
                    .collect(),
            ),
        );
        init.insert("u".into(), Value::String(creds.username.clone()));
        init.insert("o".into(), Value::String("init".into()));

        println!("{}", "🔑 SRP init request".green());
        let challenge = self.request(init).await?;

        let variant = ProtocolVariant::from_wire(dict_str(&challenge, "sp")?)?;
        let salt = dict_data(&challenge, "s")?.to_vec();
        let iterations = dict_iterations(&challenge)?;
        let b_pub = dict_data(&challenge, "B")?.to_vec();
        let cookie = dict_str(&challenge, "c")?.to_string();

        let derived = crypto::derive_password(&creds.password, &salt, iterations, variant);
        let m1 = session.process_challenge(&derived, &salt, &b_pub)?;

        let mut complete = Dictionary::new();
        complete.insert("c".into(), Value::String(cookie));
        complete.insert("M1".into(), Value::Data(m1.to_vec()));
        complete.insert("u".into(), Value::String(creds.username.clone()));
        complete.insert("o".into(), Value::String("complete".into()));

        println!("{}", "🔑 SRP completion request".green());
        let completion = self.request(complete).await?;

        // No server proof means the server never negotiated a key with us,
        // which in practice is a wrong password.
        let Some(m2) = completion.get("M2").and_then(Value::as_data) else {
            return Err(AuthError::AuthenticationRejected(status_message(
                &completion,
            )));
        };
        session.verify_server(m2)?;

        let spd_blob = dict_data(&completion, "spd")?;
        let key = session.session_key()?;
        let plain = crypto::decrypt_extra_data(key, spd_blob)?;
        let spd = parse_headerless_plist(&plain)?;

        match secondary_auth(&completion)? {
            None => Ok(Attempt::Authenticated(spd)),
            Some(mode) => {
                println!(
                    "{} {}",
                    "🔐 Second factor required:".yellow(),
                    mode.yellow().dimmed()
                );
                let adsid = spd_string(&spd, "adsid")?;
                let idms_token = spd_string(&spd, "GsIdmsToken")?;
                two_factor::run(
                    &self.http,
                    &self.anisette,
                    &self.device,
                    &adsid,
                    &idms_token,
                    prompt,
                )
                .await?;
                Ok(Attempt::SecondFactorVerified)
            }
        }
    }

    /// One signed GSA request: plist envelope out, `Response` dictionary
    /// back. Anisette headers are rebuilt per call; the service rejects
    /// stale client-time values.
    async fn request(&self, parameters: Dictionary) -> Result<Dictionary, AuthError> {
        let headers = self.anisette.build_headers(&self.device).await?;

        let mut cpd = Dictionary::new();
        // Client-provision flags the service expects from a desktop client.
        cpd.insert("bootstrap".into(), Value::Boolean(true));
        cpd.insert("icscrec".into(), Value::Boolean(true));
        cpd.insert("pbe".into(), Value::Boolean(false));
        cpd.insert("prkgen".into(), Value::Boolean(true));
        cpd.insert("svct".into(), Value::String("iCloud".into()));
        for (name, value) in headers.pairs() {
            cpd.insert(name.to_string(), Value::String(value));
        }

        let mut request = Dictionary::new();
        request.insert("cpd".into(), Value::Dictionary(cpd));
        for (key, value) in parameters {
            request.insert(key, value);
        }

        let mut header = Dictionary::new();
        header.insert("Version".into(), Value::String("1.0.1".into()));

        let mut envelope = Dictionary::new();
        envelope.insert("Header".into(), Value::Dictionary(header));
        envelope.insert("Request".into(), Value::Dictionary(request));

        let mut body = Vec::new();
        Value::Dictionary(envelope)
            .to_writer_xml(&mut body)
            .expect("plist serialization to memory");

        let resp = self
            .http
            .post(GSA_ENDPOINT)
            .header("Content-Type", "text/x-xml-plist")
            .header("Accept", "*/*")
            .header("User-Agent", GSA_USER_AGENT)
            .header("X-MMe-Client-Info", CLIENT_INFO)
            .body(body)
            .send()
            .await
            .map_err(|e| net_err(GSA_ENDPOINT, e))?;
        if !resp.status().is_success() {
            return Err(AuthError::MalformedResponse(format!(
                "GSA endpoint returned HTTP {}",
                resp.status()
            )));
        }

        let bytes = resp.bytes().await.map_err(|e| net_err(GSA_ENDPOINT, e))?;
        let doc: Dictionary = plist::from_bytes(&bytes)
            .map_err(|e| AuthError::MalformedResponse(format!("GSA plist: {e}")))?;
        match doc.get("Response") {
            Some(Value::Dictionary(d)) => Ok(d.clone()),
            _ => Err(AuthError::MalformedResponse(
                "envelope missing Response dictionary".to_string(),
            )),
        }
    }
}

/// Reads `Status.au`: `None` when no second factor is demanded. Any
/// unrecognized demand fails closed — guessing a second-factor flow would
/// strand the handshake halfway.
fn secondary_auth(response: &Dictionary) -> Result<Option<&str>, AuthError> {
    let Some(status) = response.get("Status").and_then(Value::as_dictionary) else {
        return Ok(None);
    };
    let Some(au) = status.get("au").and_then(Value::as_string) else {
        return Ok(None);
    };
    if SECONDARY_AUTH_MODES.contains(&au) {
        Ok(Some(au))
    } else {
        Err(AuthError::UnknownSecondFactor(au.to_string()))
    }
}

fn status_message(response: &Dictionary) -> String {
    let status = response.get("Status").and_then(Value::as_dictionary);
    let ec = status
        .and_then(|s| s.get("ec"))
        .and_then(Value::as_signed_integer);
    let em = status
        .and_then(|s| s.get("em"))
        .and_then(Value::as_string);
    match (ec, em) {
        (Some(ec), Some(em)) => format!("{em} (ec {ec})"),
        (_, Some(em)) => em.to_string(),
        _ => "no server proof in completion response".to_string(),
    }
}

pub(crate) fn parse_headerless_plist(plain: &[u8]) -> Result<Dictionary, AuthError> {
    let mut doc = Vec::with_capacity(PLIST_HEADER.len() + plain.len());
    doc.extend_from_slice(PLIST_HEADER);
    doc.extend_from_slice(plain);
    plist::from_bytes(&doc)
        .map_err(|e| AuthError::MalformedResponse(format!("decrypted payload: {e}")))
}

/// Payload fields of interest arrive as strings or raw data depending on
/// server generation; data is carried onward base64-encoded.
pub(crate) fn spd_string(spd: &Dictionary, key: &str) -> Result<String, AuthError> {
    match spd.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Data(d)) => Ok(B64.encode(d)),
        _ => Err(AuthError::MalformedResponse(format!(
            "missing payload field {key:?}"
        ))),
    }
}

/// The one-time password token minted for the delegate login.
pub(crate) fn pet_token(spd: &Dictionary) -> Result<String, AuthError> {
    spd.get("t")
        .and_then(Value::as_dictionary)
        .and_then(|t| t.get("com.apple.gs.idms.pet"))
        .and_then(Value::as_dictionary)
        .and_then(|p| p.get("token"))
        .and_then(Value::as_string)
        .map(str::to_string)
        .ok_or_else(|| AuthError::MalformedResponse("missing pet token in payload".to_string()))
}

fn dict_str<'a>(dict: &'a Dictionary, key: &str) -> Result<&'a str, AuthError> {
    dict.get(key)
        .and_then(Value::as_string)
        .ok_or_else(|| AuthError::MalformedResponse(format!("missing string field {key:?}")))
}

fn dict_data<'a>(dict: &'a Dictionary, key: &str) -> Result<&'a [u8], AuthError> {
    dict.get(key)
        .and_then(Value::as_data)
        .ok_or_else(|| AuthError::MalformedResponse(format!("missing data field {key:?}")))
}

fn dict_iterations(dict: &Dictionary) -> Result<u32, AuthError> {
    let raw = dict
        .get("i")
        .and_then(Value::as_signed_integer)
        .ok_or_else(|| AuthError::MalformedResponse("missing iteration count".to_string()))?;
    u32::try_from(raw)
        .map_err(|_| AuthError::MalformedResponse(format!("absurd iteration count {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{encrypt_extra_data, sha256};

    fn status_with_au(au: &str) -> Dictionary {
        let mut status = Dictionary::new();
        status.insert("au".into(), Value::String(au.to_string()));
        let mut response = Dictionary::new();
        response.insert("Status".into(), Value::Dictionary(status));
        response
    }

    #[test]
    fn recognized_secondary_auth_modes_trigger_the_sub_protocol() {
        for mode in ["trustedDeviceSecondaryAuth", "secondaryAuth"] {
            let response = status_with_au(mode);
            assert_eq!(secondary_auth(&response).unwrap(), Some(mode));
        }
    }

    #[test]
    fn unknown_secondary_auth_fails_closed() {
        let response = status_with_au("faceIdSecondaryAuth");
        assert!(matches!(
            secondary_auth(&response),
            Err(AuthError::UnknownSecondFactor(mode)) if mode == "faceIdSecondaryAuth"
        ));
    }

    #[test]
    fn absent_status_or_au_means_no_second_factor() {
        assert_eq!(secondary_auth(&Dictionary::new()).unwrap(), None);

        let mut status = Dictionary::new();
        status.insert("ec".into(), Value::Integer(0i64.into()));
        let mut response = Dictionary::new();
        response.insert("Status".into(), Value::Dictionary(status));
        assert_eq!(secondary_auth(&response).unwrap(), None);
    }

    #[test]
    fn status_message_folds_in_server_error_fields() {
        let mut status = Dictionary::new();
        status.insert("ec".into(), Value::Integer((-22406i64).into()));
        status.insert(
            "em".into(),
            Value::String("Your Apple ID or password was incorrect.".into()),
        );
        let mut response = Dictionary::new();
        response.insert("Status".into(), Value::Dictionary(status));
        assert_eq!(
            status_message(&response),
            "Your Apple ID or password was incorrect. (ec -22406)"
        );
        assert_eq!(
            status_message(&Dictionary::new()),
            "no server proof in completion response"
        );
    }

    #[test]
    fn spd_string_accepts_string_and_data_shapes() {
        let mut spd = Dictionary::new();
        spd.insert("adsid".into(), Value::String("000123-45".into()));
        spd.insert("GsIdmsToken".into(), Value::Data(vec![1, 2, 3, 4]));

        assert_eq!(spd_string(&spd, "adsid").unwrap(), "000123-45");
        assert_eq!(spd_string(&spd, "GsIdmsToken").unwrap(), B64.encode([1, 2, 3, 4]));
        assert!(matches!(
            spd_string(&spd, "missing"),
            Err(AuthError::MalformedResponse(_))
        ));
    }

    // The post-verification half of the handshake, end to end: a payload
    // encrypted under the negotiated key decrypts, parses and yields the
    // embedded identifiers.
    #[test]
    fn encrypted_payload_round_trips_to_identifiers() {
        let session_key = sha256(b"negotiated session key");

        let mut pet = Dictionary::new();
        pet.insert("token".into(), Value::String("pet-token-123".into()));
        let mut tokens = Dictionary::new();
        tokens.insert("com.apple.gs.idms.pet".into(), Value::Dictionary(pet));
        let mut spd = Dictionary::new();
        spd.insert("adsid".into(), Value::String("000123-45-ADSID".into()));
        spd.insert("t".into(), Value::Dictionary(tokens));

        let mut xml = Vec::new();
        Value::Dictionary(spd).to_writer_xml(&mut xml).unwrap();
        // Strip the declaration and doctype the writer emits; the service
        // sends the bare <plist> element.
        let plist_start = xml.windows(6).position(|w| w == b"<plist").unwrap();
        let headerless = &xml[plist_start..];

        let ciphertext = encrypt_extra_data(&session_key, headerless);
        let plain = crate::crypto::decrypt_extra_data(&session_key, &ciphertext).unwrap();
        let parsed = parse_headerless_plist(&plain).unwrap();

        assert_eq!(spd_string(&parsed, "adsid").unwrap(), "000123-45-ADSID");
        assert_eq!(pet_token(&parsed).unwrap(), "pet-token-123");
    }

    #[test]
    fn iteration_count_must_fit_u32() {
        let mut dict = Dictionary::new();
        dict.insert("i".into(), Value::Integer(20309i64.into()));
        assert_eq!(dict_iterations(&dict).unwrap(), 20309);

        let mut dict = Dictionary::new();
        dict.insert("i".into(), Value::Integer((-1i64).into()));
        assert!(dict_iterations(&dict).is_err());
    }
}
