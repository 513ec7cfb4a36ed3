//! PKCE S256 code verifier and challenge generation
//!
//! This module implements the client side of Proof Key for Code Exchange
//! (RFC 7636) with the `S256` challenge method.
//!
//! # How PKCE works
//!
//! 1. The client generates a high-entropy random `code_verifier`.
//! 2. The client hashes the verifier with SHA-256 and base64url-encodes the
//!    digest to produce the `code_challenge`.
//! 3. The authorization request carries `code_challenge` and
//!    `code_challenge_method=S256`.
//! 4. The token exchange carries the original `code_verifier`, letting the
//!    server prove the exchange comes from the party that started the flow.
//!
//! # References
//!
//! - RFC 7636 <https://www.rfc-editor.org/rfc/rfc7636>

use base64::Engine as _;
use rand::TryRngCore as _;
use sha2::{Digest, Sha256};

use crate::error::{OAuth2Error, Result};

/// The only challenge method this crate produces.
pub const S256: &str = "S256";

// ---------------------------------------------------------------------------
// PkceChallenge
// ---------------------------------------------------------------------------

/// A verifier together with its derived S256 challenge.
///
/// # Examples
///
/// ```
/// use oauth2_fetch::pkce::PkceChallenge;
///
/// let pkce = PkceChallenge::generate().unwrap();
/// assert_eq!(pkce.method, "S256");
/// assert_eq!(pkce.verifier.len(), 43);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    /// Sent to the token endpoint as `code_verifier`.
    pub verifier: String,
    /// Sent to the authorization endpoint as `code_challenge`.
    pub challenge: String,
    /// Always `"S256"`.
    pub method: String,
}

impl PkceChallenge {
    /// Generates a fresh verifier and derives its challenge.
    ///
    /// # Errors
    ///
    /// Returns [`OAuth2Error::CryptoUnavailable`] if the operating system
    /// random source cannot be read.
    pub fn generate() -> Result<Self> {
        let verifier = generate_verifier()?;
        Ok(Self::from_verifier(verifier))
    }

    /// Derives the challenge for an existing verifier.
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let (method, challenge) = code_challenge(&verifier);
        Self {
            verifier,
            challenge,
            method: method.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

/// Generates a code verifier: 32 bytes from the OS random source,
/// base64url-encoded without padding.
///
/// The result always matches `^[A-Za-z0-9_-]{43}$`.
///
/// # Errors
///
/// Returns [`OAuth2Error::CryptoUnavailable`] if no secure random source is
/// reachable.
///
/// # Examples
///
/// ```
/// use oauth2_fetch::pkce::generate_verifier;
///
/// let verifier = generate_verifier().unwrap();
/// assert_eq!(verifier.len(), 43);
/// ```
pub fn generate_verifier() -> Result<String> {
    let mut random_bytes = [0u8; 32];
    rand::rngs::OsRng
        .try_fill_bytes(&mut random_bytes)
        .map_err(|e| OAuth2Error::CryptoUnavailable(e.to_string()))?;

    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes))
}

/// Computes the S256 challenge for `verifier`.
///
/// Each UTF-16 code unit of the verifier contributes exactly one byte (the
/// unit truncated to eight bits) to the SHA-256 input, so a character
/// outside the BMP contributes two. For the ASCII verifiers RFC 7636 allows
/// this is identical to hashing the UTF-8 bytes.
///
/// # Returns
///
/// The pair `("S256", challenge)`.
///
/// # Examples
///
/// ```
/// use oauth2_fetch::pkce::code_challenge;
///
/// let (method, challenge) = code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
/// assert_eq!(method, "S256");
/// assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
/// ```
pub fn code_challenge(verifier: &str) -> (&'static str, String) {
    let bytes: Vec<u8> = verifier.encode_utf16().map(|unit| (unit & 0xFF) as u8).collect();
    let digest = Sha256::digest(&bytes);
    let challenge = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest.as_slice());
    (S256, challenge)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
