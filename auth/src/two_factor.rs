use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use owo_colors::OwoColorize;
use regex::Regex;
use std::time::{Duration, Instant};

use crate::anisette::{AnisetteClient, AnisetteHeaders, DeviceIdentity};
use crate::error::AuthError;
use crate::gsa::CLIENT_INFO;

const AUTH_PAGE_URL: &str = "https://gsa.apple.com/auth";
const REQUEST_SMS_URL: &str = "https://gsa.apple.com/auth/verify/phone/";
const SUBMIT_CODE_URL: &str = "https://gsa.apple.com/auth/verify/phone/securitycode";

const GRACE_WINDOW: Duration = Duration::from_secs(60);

/// Where a verification code comes from. Injected so the sub-protocol runs
/// without a terminal: tests, pre-supplied codes and webhook bridges all
/// slot in here.
pub trait CodePrompt: Send + Sync {
    /// Blocks until the operator submits one line. An empty line means
    /// "no code arrived yet".
    fn read_code(&self, prompt: &str) -> std::io::Result<String>;
}

/// What to do when the operator submits an empty line.
#[derive(Debug, PartialEq, Eq)]
enum EmptyCodeAction {
    /// Sleep out the remainder of the grace window, then ask again.
    WaitThenReprompt(Duration),
    /// The window already passed; request a fresh SMS immediately.
    RerequestSms,
}

fn empty_code_action(elapsed: Duration, grace: Duration) -> EmptyCodeAction {
    if elapsed < grace {
        EmptyCodeAction::WaitThenReprompt(grace - elapsed)
    } else {
        EmptyCodeAction::RerequestSms
    }
}

/// Runs the SMS second-factor exchange for the account identified by the
/// decrypted payload. On success the caller restarts the full handshake;
/// on rejection the whole attempt dies.
pub(crate) async fn run(
    http: &reqwest::Client,
    anisette: &AnisetteClient,
    device: &DeviceIdentity,
    adsid: &str,
    idms_token: &str,
    prompt: &dyn CodePrompt,
) -> Result<(), AuthError> {
    let identity_token = B64.encode(format!("{adsid}:{idms_token}"));

    let headers = anisette.build_headers(device).await?;
    let resp = signed(http.get(AUTH_PAGE_URL), &identity_token, &headers)
        .send()
        .await
        .map_err(|e| net_err(AUTH_PAGE_URL, e))?;
    if !resp.status().is_success() {
        return Err(AuthError::MalformedResponse(format!(
            "auth page returned HTTP {}",
            resp.status()
        )));
    }
    let page = resp.text().await.map_err(|e| net_err(AUTH_PAGE_URL, e))?;

    let phone_id = trusted_phone_id(&page);
    println!(
        "{} {}",
        "📱 Requesting SMS code for phone id".green(),
        phone_id.green().dimmed()
    );
    request_sms(http, anisette, device, &identity_token, phone_id).await?;

    let started = Instant::now();
    let mut code = read_code(
        prompt,
        &format!(
            "Enter SMS 2FA code (press Enter if none arrived within {}s): ",
            GRACE_WINDOW.as_secs()
        ),
    )?;

    if code.is_empty() {
        match empty_code_action(started.elapsed(), GRACE_WINDOW) {
            EmptyCodeAction::WaitThenReprompt(remaining) => {
                println!(
                    "{} {}",
                    "⏳ Waiting out the delivery window:".yellow(),
                    humantime::format_duration(remaining).yellow().dimmed()
                );
                tokio::time::sleep(remaining).await;
                code = read_code(
                    prompt,
                    "Enter SMS 2FA code if it arrived in the meantime, otherwise press Enter: ",
                )?;
                if code.is_empty() {
                    request_sms(http, anisette, device, &identity_token, phone_id).await?;
                    code = read_code(prompt, "Enter SMS 2FA code: ")?;
                }
            }
            EmptyCodeAction::RerequestSms => {
                request_sms(http, anisette, device, &identity_token, phone_id).await?;
                code = read_code(prompt, "Enter SMS 2FA code: ")?;
            }
        }
    }

    submit_code(http, anisette, device, &identity_token, phone_id, &code).await
}

fn read_code(prompt: &dyn CodePrompt, text: &str) -> Result<String, AuthError> {
    prompt
        .read_code(text)
        .map_err(|e| AuthError::TwoFactorRejected(format!("code prompt failed: {e}")))
}

async fn request_sms(
    http: &reqwest::Client,
    anisette: &AnisetteClient,
    device: &DeviceIdentity,
    identity_token: &str,
    phone_id: u64,
) -> Result<(), AuthError> {
    let headers = anisette.build_headers(device).await?;
    let body = serde_json::json!({"phoneNumber": {"id": phone_id}, "mode": "sms"});
    let resp = signed(http.put(REQUEST_SMS_URL), identity_token, &headers)
        .json(&body)
        .send()
        .await
        .map_err(|e| net_err(REQUEST_SMS_URL, e))?;
    if !resp.status().is_success() {
        return Err(AuthError::MalformedResponse(format!(
            "SMS request returned HTTP {}",
            resp.status()
        )));
    }
    Ok(())
}

async fn submit_code(
    http: &reqwest::Client,
    anisette: &AnisetteClient,
    device: &DeviceIdentity,
    identity_token: &str,
    phone_id: u64,
    code: &str,
) -> Result<(), AuthError> {
    let headers = anisette.build_headers(device).await?;
    let body = serde_json::json!({
        "phoneNumber": {"id": phone_id},
        "mode": "sms",
        "securityCode": {"code": code},
    });
    let resp = signed(http.post(SUBMIT_CODE_URL), identity_token, &headers)
        .json(&body)
        .send()
        .await
        .map_err(|e| net_err(SUBMIT_CODE_URL, e))?;

    // The status code alone proves nothing; the service signals acceptance
    // by echoing the account DSID in a response header.
    if resp.status().is_success() && resp.headers().contains_key("X-Apple-DSID") {
        println!("{}", "✅ Second factor verified.".green());
        Ok(())
    } else {
        Err(AuthError::TwoFactorRejected(
            "verification response carried no X-Apple-DSID header (wrong code or wrong phone)"
                .to_string(),
        ))
    }
}

fn signed(
    req: reqwest::RequestBuilder,
    identity_token: &str,
    headers: &AnisetteHeaders,
) -> reqwest::RequestBuilder {
    let mut req = req
        .header("User-Agent", "Xcode")
        .header("Accept-Language", "en-us")
        .header("X-Apple-Identity-Token", identity_token)
        .header("X-Apple-App-Info", "com.apple.gs.xcode.auth")
        .header("X-Xcode-Version", "11.2 (11B41)")
        .header("X-Mme-Client-Info", CLIENT_INFO);
    for (name, value) in headers.pairs() {
        req = req.header(name, value);
    }
    req
}

pub(crate) fn net_err(target: &str, e: reqwest::Error) -> AuthError {
    if e.is_timeout() || e.is_connect() {
        AuthError::NetworkTimeout(target.to_string())
    } else {
        AuthError::MalformedResponse(format!("{target}: {e}"))
    }
}

/// Digs the trusted phone-number id out of the auth page's embedded
/// boot_args fragment. Accounts with a single number often render none;
/// id 1 targets the first (and usually only) phone on record.
fn trusted_phone_id(html: &str) -> u64 {
    let re = Regex::new(r#"(?s)<script.*class="boot_args">\s*(.*?)\s*</script>"#)
        .expect("static regex");
    let Some(captures) = re.captures(html) else {
        eprintln!("2fa: no boot_args script in auth page; falling back to phone id 1");
        return 1;
    };
    let fragment = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let Ok(boot_args) = serde_json::from_str::<serde_json::Value>(fragment) else {
        eprintln!("2fa: boot_args fragment is not valid JSON; falling back to phone id 1");
        return 1;
    };
    match boot_args
        .pointer("/direct/phoneNumberVerification/trustedPhoneNumber/id")
        .and_then(serde_json::Value::as_u64)
    {
        Some(id) => id,
        None => {
            eprintln!("2fa: no trusted phone id in boot_args; falling back to phone id 1");
            1
        }
    }
}
