use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};

use crate::error::AuthError;

/// Password pre-hash variants negotiated during the SRP challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolVariant {
    S2k,
    S2kFo,
}

impl ProtocolVariant {
    /// Wire names, in the order they are advertised in the init request.
    pub const SUPPORTED: [&'static str; 2] = ["s2k", "s2k_fo"];

    /// Unknown variants abort the attempt; guessing a pre-hash scheme
    /// would burn an SRP round against the live service.
    pub fn from_wire(name: &str) -> Result<Self, AuthError> {
        match name {
            "s2k" => Ok(ProtocolVariant::S2k),
            "s2k_fo" => Ok(ProtocolVariant::S2kFo),
            other => Err(AuthError::UnsupportedVariant(other.to_string())),
        }
    }
}

pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(bytes);
    let out = h.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out);
    arr
}

/// PBKDF2 input per variant: the raw SHA-256 digest of the password for
/// `s2k`, its lowercase hex rendering (as bytes) for `s2k_fo`.
pub fn derive_password(
    password: &str,
    salt: &[u8],
    iterations: u32,
    variant: ProtocolVariant,
) -> [u8; 32] {
    let digest = sha256(password.as_bytes());
    let mut out = [0u8; 32];
    match variant {
        ProtocolVariant::S2k => pbkdf2_hmac::<Sha256>(&digest, salt, iterations, &mut out),
        ProtocolVariant::S2kFo => {
            pbkdf2_hmac::<Sha256>(hex::encode(digest).as_bytes(), salt, iterations, &mut out)
        }
    }
    out
}

const EXTRA_DATA_KEY_LABEL: &str = "extra data key:";
const EXTRA_DATA_IV_LABEL: &str = "extra data iv:";

/// Labeled sub-key of the negotiated SRP session key.
pub fn session_sub_key(session_key: &[u8], label: &str) -> [u8; 32] {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(session_key).expect("hmac accepts any key length");
    mac.update(label.as_bytes());
    mac.finalize().into_bytes().into()
}

/// Decrypt the completion response's `spd` blob with keys derived from the
/// negotiated session key. Only the first 16 bytes of the derived iv are
/// used. Bad padding means the session keys disagree and must surface.
pub fn decrypt_extra_data(session_key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, AuthError> {
    let key = session_sub_key(session_key, EXTRA_DATA_KEY_LABEL);
    let iv_full = session_sub_key(session_key, EXTRA_DATA_IV_LABEL);
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&iv_full[..16]);

    cbc::Decryptor::<Aes256>::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| AuthError::Padding)
}

#[cfg(test)]
pub(crate) fn encrypt_extra_data(session_key: &[u8], plaintext: &[u8]) -> Vec<u8> {
    use cbc::cipher::BlockEncryptMut;

    let key = session_sub_key(session_key, EXTRA_DATA_KEY_LABEL);
    let iv_full = session_sub_key(session_key, EXTRA_DATA_IV_LABEL);
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&iv_full[..16]);

    cbc::Encryptor::<Aes256>::new(&key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_parsing_fails_closed() {
        assert_eq!(ProtocolVariant::from_wire("s2k").unwrap(), ProtocolVariant::S2k);
        assert_eq!(
            ProtocolVariant::from_wire("s2k_fo").unwrap(),
            ProtocolVariant::S2kFo
        );
        assert!(matches!(
            ProtocolVariant::from_wire("s2k_v2"),
            Err(AuthError::UnsupportedVariant(v)) if v == "s2k_v2"
        ));
    }

    #[test]
    fn s2k_fo_feeds_pbkdf2_the_hex_string_not_the_digest() {
        let salt = [0x12u8, 0x34, 0x56, 0x78];
        let iterations = 19840;

        let digest = sha256(b"correct-horse");
        let hex_input = hex::encode(digest);

        let mut expected = [0u8; 32];
        pbkdf2_hmac::<Sha256>(hex_input.as_bytes(), &salt, iterations, &mut expected);
        let derived = derive_password("correct-horse", &salt, iterations, ProtocolVariant::S2kFo);
        assert_eq!(derived, expected);

        // And the raw-digest path must differ, or the variants would collapse.
        let plain = derive_password("correct-horse", &salt, iterations, ProtocolVariant::S2k);
        assert_ne!(derived, plain);
    }

    #[test]
    fn sub_keys_are_distinct_per_label() {
        let session_key = [7u8; 32];
        let key = session_sub_key(&session_key, "extra data key:");
        let iv = session_sub_key(&session_key, "extra data iv:");
        assert_ne!(key, iv);
    }

    #[test]
    fn decrypt_recovers_plaintext_for_all_small_lengths() {
        let session_key = sha256(b"negotiated");
        let mut payload = Vec::new();
        for len in 0..=256usize {
            payload.resize(len, 0);
            for (i, b) in payload.iter_mut().enumerate() {
                *b = (i * 31 % 251) as u8;
            }
            let ciphertext = encrypt_extra_data(&session_key, &payload);
            assert_eq!(ciphertext.len() % 16, 0);
            let plain = decrypt_extra_data(&session_key, &ciphertext).unwrap();
            assert_eq!(plain, payload, "length {len}");
        }
        // a couple of larger sizes, same shape as real spd blobs
        for len in [1000usize, 4096, 9999] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
            let ciphertext = encrypt_extra_data(&session_key, &payload);
            let plain = decrypt_extra_data(&session_key, &ciphertext).unwrap();
            assert_eq!(plain, payload, "length {len}");
        }
    }

    #[test]
    fn wrong_session_key_reports_padding_error() {
        let ciphertext = encrypt_extra_data(&sha256(b"right key"), b"account payload");
        let err = decrypt_extra_data(&sha256(b"wrong key"), &ciphertext).unwrap_err();
        assert!(matches!(err, AuthError::Padding));
    }

    #[test]
    fn truncated_ciphertext_reports_padding_error() {
        let session_key = sha256(b"negotiated");
        let mut ciphertext = encrypt_extra_data(&session_key, b"0123456789abcdef more");
        ciphertext.truncate(ciphertext.len() - 3);
        let err = decrypt_extra_data(&session_key, &ciphertext).unwrap_err();
        assert!(matches!(err, AuthError::Padding));
    }
}
