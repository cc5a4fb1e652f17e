use thiserror::Error;

/// Failure taxonomy for one authentication attempt.
///
/// Only the anisette and timeout kinds are worth retrying by re-invoking
/// the attempt; everything else is terminal — repeating a failed SRP
/// exchange against the live service risks locking the account.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("server negotiated unsupported protocol variant {0:?}")]
    UnsupportedVariant(String),

    #[error("SRP challenge could not be processed: {0}")]
    Challenge(String),

    #[error("authentication rejected: {0}")]
    AuthenticationRejected(String),

    #[error("server proof mismatch; session cannot be trusted")]
    SessionVerification,

    #[error("encrypted payload has inconsistent padding (session key mismatch)")]
    Padding,

    #[error("server demands an unrecognized second factor {0:?}")]
    UnknownSecondFactor(String),

    #[error("second factor rejected: {0}")]
    TwoFactorRejected(String),

    #[error("server demanded another second factor after one was already verified")]
    SecondFactorLoop,

    #[error("anisette provider unavailable: {0}")]
    AnisetteUnavailable(String),

    #[error("network timeout talking to {0}")]
    NetworkTimeout(String),

    #[error("malformed server response: {0}")]
    MalformedResponse(String),
}

impl AuthError {
    /// Whether re-invoking the whole attempt is reasonable. Infrastructure
    /// trouble is; anything the server decided about the credentials or the
    /// session is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::AnisetteUnavailable(_) | AuthError::NetworkTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_infrastructure_failures_are_retryable() {
        assert!(AuthError::AnisetteUnavailable("down".into()).is_retryable());
        assert!(AuthError::NetworkTimeout("gsa.apple.com".into()).is_retryable());
        assert!(!AuthError::AuthenticationRejected("bad password".into()).is_retryable());
        assert!(!AuthError::SessionVerification.is_retryable());
        assert!(!AuthError::TwoFactorRejected("missing header".into()).is_retryable());
        assert!(!AuthError::Padding.is_retryable());
    }
}
