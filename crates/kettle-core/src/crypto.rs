//! Login cryptography
//!
//! The kettle authenticates the app with a mutual challenge-response over a
//! pre-shared device token:
//!
//! 1. both sides exchange 16-byte random values,
//! 2. `HKDF-SHA256(ikm = psk, salt = app_random || dev_random, info = "mible-login-info")`
//!    yields a 16-byte session key and a 16-byte HMAC key,
//! 3. the device proves itself with `HMAC-SHA256(session_key, dev_random || app_random)`,
//! 4. the app answers with `HMAC-SHA256(hmac_key, app_random || dev_random)`.
//!
//! Everything here is pure; the session driver in `kettle-ble` moves the
//! values over the wire.

use core::fmt;

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand_core::{CryptoRng, OsRng, RngCore};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{HandshakeError, KettleError};
use crate::protocol::{FRAGMENT_PREFIX_FIRST, FRAGMENT_PREFIX_SECOND, LOGIN_INFO};

type HmacSha256 = Hmac<Sha256>;

/// Length of the app and device random values
pub const RANDOM_LEN: usize = 16;
/// Length of the derived session and HMAC keys
pub const KEY_LEN: usize = 16;
/// Length of the login tokens
pub const TOKEN_LEN: usize = 32;
/// Bytes of the app token carried in the first fragment
pub const TOKEN_FIRST_FRAGMENT_LEN: usize = 18;

// ----------------------------------------------------------------------------
// Device Token
// ----------------------------------------------------------------------------

/// Pre-shared key provisioned for one kettle
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DeviceToken(Vec<u8>);

impl DeviceToken {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KettleError> {
        if bytes.is_empty() {
            return Err(KettleError::InvalidConfiguration {
                reason: "device token is empty".to_string(),
            });
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Decode the hex form stored in configuration
    pub fn from_hex(text: &str) -> Result<Self, KettleError> {
        let bytes = hex::decode(text.trim()).map_err(|e| KettleError::InvalidConfiguration {
            reason: format!("device token is not valid hex: {e}"),
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceToken(<{} bytes>)", self.0.len())
    }
}

// ----------------------------------------------------------------------------
// Key Derivation and Tokens
// ----------------------------------------------------------------------------

/// Keys derived for one login
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    pub session_key: [u8; KEY_LEN],
    pub hmac_key: [u8; KEY_LEN],
    /// `HMAC-SHA256(hmac_key, app_random || dev_random)`
    pub app_token: [u8; TOKEN_LEN],
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKeys(<redacted>)")
    }
}

/// Derive session and HMAC keys and the app token from both random values
pub fn derive_session_keys(
    psk: &[u8],
    app_random: &[u8],
    dev_random: &[u8],
) -> Result<SessionKeys, HandshakeError> {
    let mut salt = Vec::with_capacity(app_random.len() + dev_random.len());
    salt.extend_from_slice(app_random);
    salt.extend_from_slice(dev_random);

    let hkdf = Hkdf::<Sha256>::new(Some(salt.as_slice()), psk);
    let mut okm = [0u8; 64];
    hkdf.expand(LOGIN_INFO, &mut okm)
        .map_err(|_| HandshakeError::KeyDerivation)?;

    let mut keys = SessionKeys {
        session_key: [0u8; KEY_LEN],
        hmac_key: [0u8; KEY_LEN],
        app_token: [0u8; TOKEN_LEN],
    };
    keys.session_key.copy_from_slice(&okm[..KEY_LEN]);
    keys.hmac_key.copy_from_slice(&okm[KEY_LEN..2 * KEY_LEN]);
    okm.zeroize();

    keys.app_token = hmac_sha256(&keys.hmac_key, &[app_random, dev_random])?;
    Ok(keys)
}

/// Compute the app token `HMAC-SHA256(hmac_key, app_random || dev_random)`
pub fn compute_app_token(
    hmac_key: &[u8],
    app_random: &[u8],
    dev_random: &[u8],
) -> Result<[u8; TOKEN_LEN], HandshakeError> {
    hmac_sha256(hmac_key, &[app_random, dev_random])
}

/// Compute the token the device is expected to present
pub fn compute_device_token(
    session_key: &[u8],
    dev_random: &[u8],
    app_random: &[u8],
) -> Result<[u8; TOKEN_LEN], HandshakeError> {
    hmac_sha256(session_key, &[dev_random, app_random])
}

/// Check the device's signature in constant time
///
/// True iff `signature == HMAC-SHA256(session_key, dev_random || app_random)`.
pub fn verify_device_confirmation(
    session_key: &[u8],
    dev_random: &[u8],
    app_random: &[u8],
    signature: &[u8],
) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(session_key) else {
        return false;
    };
    mac.update(dev_random);
    mac.update(app_random);
    mac.verify_slice(signature).is_ok()
}

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Result<[u8; TOKEN_LEN], HandshakeError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| HandshakeError::KeyDerivation)?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().into())
}

// ----------------------------------------------------------------------------
// Fragment Tagging
// ----------------------------------------------------------------------------

/// Concatenate tagged fragments in arrival order, stripping the 2-byte tags
///
/// Frames without a `0100`/`0200` tag (acknowledgements, opcodes) are skipped.
pub fn reassemble_fragments<T: AsRef<[u8]>>(frames: &[T]) -> Vec<u8> {
    let mut payload = Vec::new();
    for frame in frames {
        let frame = frame.as_ref();
        if frame.starts_with(&FRAGMENT_PREFIX_FIRST) || frame.starts_with(&FRAGMENT_PREFIX_SECOND) {
            payload.extend_from_slice(&frame[2..]);
        }
    }
    payload
}

/// Split a token into its two tagged wire fragments (18 + 14 bytes of payload)
pub fn split_token(token: &[u8; TOKEN_LEN]) -> [Vec<u8>; 2] {
    let (first, second) = token.split_at(TOKEN_FIRST_FRAGMENT_LEN);
    [tag(FRAGMENT_PREFIX_FIRST, first), tag(FRAGMENT_PREFIX_SECOND, second)]
}

fn tag(prefix: [u8; 2], payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(2 + payload.len());
    frame.extend_from_slice(&prefix);
    frame.extend_from_slice(payload);
    frame
}

// ----------------------------------------------------------------------------
// Auth Context
// ----------------------------------------------------------------------------

/// Secrets for a single login attempt
///
/// The app random is drawn once at construction and the device random can be
/// recorded once; neither changes for the lifetime of the context. Dropping
/// the context wipes every field.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct AuthContext {
    psk: DeviceToken,
    app_random: [u8; RANDOM_LEN],
    dev_random: Option<Vec<u8>>,
    keys: Option<SessionKeys>,
}

impl AuthContext {
    /// Start a login attempt with a fresh app random from the OS RNG
    pub fn new(psk: DeviceToken) -> Self {
        Self::with_rng(psk, &mut OsRng)
    }

    /// Start a login attempt drawing the app random from `rng`
    pub fn with_rng<R: RngCore + CryptoRng>(psk: DeviceToken, rng: &mut R) -> Self {
        let mut app_random = [0u8; RANDOM_LEN];
        rng.fill_bytes(&mut app_random);
        Self {
            psk,
            app_random,
            dev_random: None,
            keys: None,
        }
    }

    pub fn app_random(&self) -> &[u8; RANDOM_LEN] {
        &self.app_random
    }

    /// App random tagged as a first fragment, as sent on the auth channel
    pub fn tagged_app_random(&self) -> Vec<u8> {
        tag(FRAGMENT_PREFIX_FIRST, &self.app_random)
    }

    pub fn dev_random(&self) -> Option<&[u8]> {
        self.dev_random.as_deref()
    }

    /// Record the reassembled device random and derive the session keys
    pub fn record_device_random(&mut self, dev_random: Vec<u8>) -> Result<(), HandshakeError> {
        if dev_random.is_empty() {
            return Err(HandshakeError::MissingRandom);
        }
        if self.dev_random.is_some() {
            return Err(HandshakeError::RandomAlreadySet);
        }

        let keys = derive_session_keys(self.psk.as_bytes(), &self.app_random, &dev_random)?;
        self.dev_random = Some(dev_random);
        self.keys = Some(keys);
        Ok(())
    }

    /// Verify the reassembled device token
    pub fn verify_device_token(&self, token: &[u8]) -> Result<(), HandshakeError> {
        let (keys, dev_random) = self.established()?;
        if verify_device_confirmation(&keys.session_key, dev_random, &self.app_random, token) {
            Ok(())
        } else {
            Err(HandshakeError::AuthFailed)
        }
    }

    /// Tagged wire fragments of the app token
    pub fn app_token_fragments(&self) -> Result<[Vec<u8>; 2], HandshakeError> {
        let (keys, _) = self.established()?;
        Ok(split_token(&keys.app_token))
    }

    pub fn keys(&self) -> Option<&SessionKeys> {
        self.keys.as_ref()
    }

    fn established(&self) -> Result<(&SessionKeys, &[u8]), HandshakeError> {
        match (&self.keys, &self.dev_random) {
            (Some(keys), Some(dev_random)) => Ok((keys, dev_random.as_slice())),
            _ => Err(HandshakeError::KeysNotDerived),
        }
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("dev_random", &self.dev_random.is_some())
            .field("keys", &self.keys.is_some())
            .finish_non_exhaustive()
    }
}
