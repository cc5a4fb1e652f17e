use owo_colors::OwoColorize;
use plist::{Dictionary, Value};

use crate::anisette::{AnisetteClient, DeviceIdentity};
use crate::error::AuthError;

const SETUP_ENDPOINT: &str = "https://setup.icloud.com/setup/iosbuddy/loginDelegates";
const SETUP_USER_AGENT: &str = "com.apple.iCloudHelper/282 CFNetwork/1408.0.4 Darwin/22.5.0";
const SETUP_CLIENT_INFO: &str =
    "<MacBookPro18,3> <Mac OS X;13.4.1;22F8> <com.apple.AOSKit/282 (com.apple.accountsd/113)>";

const MOBILEME_DELEGATE: &str = "com.apple.mobileme";

/// The credential record handed back to the caller: everything the report
/// fetcher needs to authenticate downstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthToken {
    pub account_id: String,
    pub search_party_token: String,
}

/// Registers the mobileme delegate with the one-time `pet` token from the
/// GSA payload and extracts the account DSID plus search-party token.
pub(crate) async fn register_mobileme(
    http: &reqwest::Client,
    anisette: &AnisetteClient,
    device: &DeviceIdentity,
    username: &str,
    pet: &str,
    adsid: &str,
) -> Result<AuthToken, AuthError> {
    let mut delegates = Dictionary::new();
    delegates.insert(MOBILEME_DELEGATE.into(), Value::Dictionary(Dictionary::new()));

    let mut body = Dictionary::new();
    body.insert("apple-id".into(), Value::String(username.to_string()));
    body.insert("delegates".into(), Value::Dictionary(delegates));
    body.insert("password".into(), Value::String(pet.to_string()));
    body.insert(
        "client-id".into(),
        Value::String(device.user_id.to_string()),
    );

    let mut payload = Vec::new();
    Value::Dictionary(body)
        .to_writer_xml(&mut payload)
        .expect("plist serialization to memory");

    let headers = anisette.build_headers(device).await?;
    let mut req = http
        .post(SETUP_ENDPOINT)
        .basic_auth(username, Some(pet))
        .header("X-Apple-ADSID", adsid)
        .header("User-Agent", SETUP_USER_AGENT)
        .header("X-Mme-Client-Info", SETUP_CLIENT_INFO)
        .body(payload);
    for (name, value) in headers.pairs() {
        req = req.header(name, value);
    }

    let resp = req.send().await.map_err(|e| net_err(SETUP_ENDPOINT, e))?;
    if !resp.status().is_success() {
        return Err(AuthError::MalformedResponse(format!(
            "login delegates returned HTTP {}",
            resp.status()
        )));
    }
    let bytes = resp.bytes().await.map_err(|e| net_err(SETUP_ENDPOINT, e))?;
    let doc: Dictionary = plist::from_bytes(&bytes)
        .map_err(|e| AuthError::MalformedResponse(format!("login delegates plist: {e}")))?;

    extract_token(&doc)
}

/// Pulls the DSID and search-party token out of the delegate response.
pub(crate) fn extract_token(doc: &Dictionary) -> Result<AuthToken, AuthError> {
    let mobileme = doc
        .get("delegates")
        .and_then(Value::as_dictionary)
        .and_then(|d| d.get(MOBILEME_DELEGATE))
        .and_then(Value::as_dictionary)
        .ok_or_else(|| {
            AuthError::MalformedResponse("no mobileme delegate in response".to_string())
        })?;

    let status = mobileme
        .get("status")
        .and_then(Value::as_signed_integer)
        .ok_or_else(|| AuthError::MalformedResponse("delegate without status".to_string()))?;
    if status != 0 {
        let message = mobileme
            .get("status-message")
            .and_then(Value::as_string)
            .unwrap_or("no status message");
        if message.contains("blocking") {
            // The service gates accounts it scores too low; adding payment
            // or profile data on appleid.apple.com raises the score.
            eprintln!(
                "{}",
                "account score too low; add a credit card or more account data at appleid.apple.com"
                    .yellow()
            );
        }
        return Err(AuthError::AuthenticationRejected(format!(
            "delegate status {status}: {message}"
        )));
    }

    let dsid = doc
        .get("dsid")
        .and_then(Value::as_string)
        .ok_or_else(|| AuthError::MalformedResponse("missing dsid".to_string()))?;

    let tokens = mobileme
        .get("service-data")
        .and_then(Value::as_dictionary)
        .and_then(|d| d.get("tokens"))
        .and_then(Value::as_dictionary)
        .ok_or_else(|| AuthError::MalformedResponse("delegate without tokens".to_string()))?;

    Ok(AuthToken {
        account_id: dsid.to_string(),
        search_party_token: search_party_token(tokens)?,
    })
}

/// The token key has shipped under two casings across server generations;
/// accept either before giving up.
fn search_party_token(tokens: &Dictionary) -> Result<String, AuthError> {
    for key in ["searchPartyToken", "searchpartytoken"] {
        if let Some(token) = tokens.get(key).and_then(Value::as_string) {
            return Ok(token.to_string());
        }
    }
    Err(AuthError::MalformedResponse(
        "no search-party token under either casing".to_string(),
    ))
}

fn net_err(target: &str, e: reqwest::Error) -> AuthError {
    if e.is_timeout() || e.is_connect() {
        AuthError::NetworkTimeout(target.to_string())
    } else {
        AuthError::MalformedResponse(format!("{target}: {e}"))
    }
}
