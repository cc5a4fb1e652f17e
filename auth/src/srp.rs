use num_bigint::BigUint;
use num_traits::Zero;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::crypto::sha256;
use crate::error::AuthError;

// Client side of SRP-6a (RFC 5054) for the 2048-bit group with SHA-256.
//
// GrandSlam speaks a dialect that stock SRP crates cannot be configured
// into, so the exchange is written out here:
// - the username never enters the x derivation (x = H(s | H(":" | p))),
//   though H(username) is still hashed into the M1 proof;
// - the p fed into x is not the raw password but the PBKDF2 derivation
//   negotiated in the challenge (see crypto::derive_password);
// - k and u follow the RFC 5054 padding rules, K = H(S).

// RFC 5054 2048-bit group (N,g)
const N_HEX: &str = "AC6BDB41324A9A9BF166DE5E1389582FAF72B6651987EE07FC3192943DB56050A37329CBB4A099ED8193E0757767A13DD52312AB4B03310DCD7F48A9DA04FD50E8083969EDB767B0CF6095179A163AB3661A05FBD5FAAAE82918A9962F0B93B855F97993EC975EEAA80D740ADBF4FF747359D041D5C33EA71D281E446B14773BCA97B43A23FB801676BD207A436C6481F1D2B9078717461A5B9D32E688F87748544523B524B0D57D5EA77A2775D2ECFA032CFBDBF52FB3786160279004E57AE6AF874E7303CE53299CCC041C7BC308D82A5698F3A8D0C38271AE35F8E9DBFBB694B5C803D89F7AE435DE236D525F54759B65E372FCD68EF20FA7111F9E4AFF73";
const G_DEC: u32 = 2;
const KEY_LEN: usize = 256; // 2048-bit group

fn from_be(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

fn to_be(v: &BigUint) -> Vec<u8> {
    v.to_bytes_be()
}

fn pad_to(bytes: &[u8], len: usize) -> Vec<u8> {
    if bytes.len() >= len {
        return bytes.to_vec();
    }
    let mut out = vec![0u8; len - bytes.len()];
    out.extend_from_slice(bytes);
    out
}

fn n() -> BigUint {
    BigUint::parse_bytes(N_HEX.as_bytes(), 16).expect("N parse")
}

fn g() -> BigUint {
    BigUint::from(G_DEC)
}

fn hcat(parts: &[&[u8]]) -> [u8; 32] {
    let mut h = Sha256::new();
    for p in parts {
        h.update(p);
    }
    let out = h.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out);
    arr
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}

fn compute_k() -> BigUint {
    // k = H(N || PAD(g))
    let n_bytes = to_be(&n());
    let g_pad = pad_to(&to_be(&g()), KEY_LEN);
    from_be(&hcat(&[&n_bytes, &g_pad]))
}

fn compute_u(a_pad: &[u8], b_pad: &[u8]) -> BigUint {
    // u = H(PAD(A) || PAD(B))
    from_be(&hcat(&[a_pad, b_pad]))
}

fn compute_x(salt: &[u8], derived_password: &[u8]) -> BigUint {
    // x = H(s || H(":" || p)); the username slot stays empty
    let inner = hcat(&[b":", derived_password]);
    from_be(&hcat(&[salt, &inner]))
}

fn compute_m1(
    username: &str,
    salt: &[u8],
    a_bytes: &[u8],
    b_bytes: &[u8],
    k_bytes: &[u8],
) -> [u8; 32] {
    // M1 = H( H(N) XOR H(PAD(g)) || H(I) || s || A || B || K )
    let hn = sha256(&to_be(&n()));
    let hg = sha256(&pad_to(&to_be(&g()), KEY_LEN));
    let hn_xor_hg = xor(&hn, &hg);

    let hi = sha256(username.as_bytes());
    hcat(&[&hn_xor_hg, &hi, salt, a_bytes, b_bytes, k_bytes])
}

fn compute_m2(a_bytes: &[u8], m1_bytes: &[u8], k_bytes: &[u8]) -> [u8; 32] {
    // M2 = H(A || M1 || K)
    hcat(&[a_bytes, m1_bytes, k_bytes])
}

/// Lifecycle of one SRP exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Created,
    ChallengeSent,
    ChallengeProcessed,
    Verified,
    Failed,
}

/// One client-side SRP exchange. Single-use: the ephemeral exponent is
/// drawn at construction and must never serve a second attempt.
///
/// The negotiated key stays sealed until the server proof verifies;
/// decrypting anything on an unverified session is a protocol violation.
pub struct ClientSession {
    username: String,
    a: BigUint,
    a_pub: BigUint,
    state: SessionState,
    expected_m2: Option<[u8; 32]>,
    session_key: Option<[u8; 32]>,
}

impl ClientSession {
    pub fn new(username: &str) -> Self {
        let mut rnd = [0u8; 32];
        rand::rng().fill_bytes(&mut rnd);
        let a = from_be(&rnd);
        let a_pub = g().modpow(&a, &n());

        Self {
            username: username.to_string(),
            a,
            a_pub,
            state: SessionState::Created,
            expected_m2: None,
            session_key: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Hands out A for the init request.
    pub fn start(&mut self) -> Result<Vec<u8>, AuthError> {
        if self.state != SessionState::Created {
            return Err(AuthError::Challenge(format!(
                "session already started (state {:?})",
                self.state
            )));
        }
        self.state = SessionState::ChallengeSent;
        Ok(to_be(&self.a_pub))
    }

    /// Derives the client proof M1 from the server challenge.
    /// `derived_password` is the PBKDF2 output, not the raw password.
    pub fn process_challenge(
        &mut self,
        derived_password: &[u8],
        salt: &[u8],
        server_public: &[u8],
    ) -> Result<[u8; 32], AuthError> {
        if self.state != SessionState::ChallengeSent {
            return Err(AuthError::Challenge(format!(
                "challenge received in state {:?}",
                self.state
            )));
        }

        let n_bn = n();
        let b_pub = from_be(server_public);
        if (&b_pub % &n_bn).is_zero() {
            self.state = SessionState::Failed;
            return Err(AuthError::Challenge(
                "server public value is a multiple of N".to_string(),
            ));
        }

        // Leading zeros in the wire encoding must not change the proof.
        let a_bytes = to_be(&self.a_pub);
        let b_bytes = to_be(&b_pub);

        let u = compute_u(&pad_to(&a_bytes, KEY_LEN), &pad_to(&b_bytes, KEY_LEN));
        if u.is_zero() {
            self.state = SessionState::Failed;
            return Err(AuthError::Challenge("u collapsed to zero".to_string()));
        }

        let k = compute_k();
        let x = compute_x(salt, derived_password);
        let v = g().modpow(&x, &n_bn);

        // S = (B - k*v) ^ (a + u*x) mod N
        let kv = (&k * &v) % &n_bn;
        let base = ((&b_pub + &n_bn) - kv) % &n_bn;
        let exp = &self.a + &u * &x;
        let s = base.modpow(&exp, &n_bn);

        let key = sha256(&to_be(&s));
        let m1 = compute_m1(&self.username, salt, &a_bytes, &b_bytes, &key);
        let m2 = compute_m2(&a_bytes, &m1, &key);

        self.expected_m2 = Some(m2);
        self.session_key = Some(key);
        self.state = SessionState::ChallengeProcessed;
        Ok(m1)
    }

    /// Verifies the server proof M2. A mismatch is fatal for the attempt:
    /// either the password was wrong on our side or someone sits between
    /// us and the server, and neither case is retried.
    pub fn verify_server(&mut self, server_proof: &[u8]) -> Result<(), AuthError> {
        if self.state != SessionState::ChallengeProcessed {
            return Err(AuthError::SessionVerification);
        }
        let expected = self.expected_m2.expect("set in process_challenge");
        if server_proof != expected {
            self.state = SessionState::Failed;
            return Err(AuthError::SessionVerification);
        }
        self.state = SessionState::Verified;
        Ok(())
    }

    /// The negotiated key K. Unreadable until the server proof verified.
    pub fn session_key(&self) -> Result<&[u8; 32], AuthError> {
        if self.state != SessionState::Verified {
            return Err(AuthError::SessionVerification);
        }
        Ok(self.session_key.as_ref().expect("set before Verified"))
    }
}
