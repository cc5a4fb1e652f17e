use hayloft_auth::AuthError;
use serde_json::Value;

use crate::app::App;

const FETCH_ENDPOINT: &str = "https://gateway.icloud.com/acsnservice/fetch";

/// Forwards one report query upstream with the stored credential pair and
/// a fresh anisette header set.
pub async fn forward(app: &App, query: Value) -> Result<Value, AuthError> {
    let headers = app.anisette.build_headers(&app.device).await?;

    let mut req = app
        .http
        .post(FETCH_ENDPOINT)
        .basic_auth(&app.auth.dsid, Some(&app.auth.search_party_token))
        .json(&query);
    for (name, value) in headers.pairs() {
        req = req.header(name, value);
    }

    let resp = req.send().await.map_err(|e| net_err(FETCH_ENDPOINT, e))?;
    if !resp.status().is_success() {
        return Err(AuthError::MalformedResponse(format!(
            "fetch service returned HTTP {}",
            resp.status()
        )));
    }
    resp.json()
        .await
        .map_err(|e| AuthError::MalformedResponse(format!("{FETCH_ENDPOINT}: {e}")))
}

fn net_err(target: &str, e: reqwest::Error) -> AuthError {
    if e.is_timeout() || e.is_connect() {
        AuthError::NetworkTimeout(target.to_string())
    } else {
        AuthError::MalformedResponse(format!("{target}: {e}"))
    }
}
