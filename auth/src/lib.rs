pub mod anisette;
pub mod crypto;
pub mod delegates;
pub mod error;
pub mod gsa;
pub mod srp;
pub mod two_factor;

pub use anisette::{AnisetteClient, DeviceIdentity};
pub use delegates::AuthToken;
pub use error::AuthError;
pub use gsa::Credentials;
pub use two_factor::CodePrompt;

/// Full login: the GSA handshake (including the second-factor branch when
/// the server demands one) followed by the mobileme delegate registration
/// that yields the search-party token.
pub async fn authenticate(
    anisette: &AnisetteClient,
    device: &DeviceIdentity,
    creds: &Credentials,
    prompt: &dyn CodePrompt,
) -> Result<AuthToken, AuthError> {
    let client = gsa::GsaClient::new(anisette.clone(), device.clone());
    let spd = client.authenticate(creds, prompt).await?;

    let pet = gsa::pet_token(&spd)?;
    let adsid = gsa::spd_string(&spd, "adsid")?;

    delegates::register_mobileme(
        client.http(),
        anisette,
        device,
        &creds.username,
        &pet,
        &adsid,
    )
    .await
}
