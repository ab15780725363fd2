// Time-based one-time password derivation and verification
// RFC 6238, SHA-1, 6-digit codes over 30-second steps

use chrono::{DateTime, Utc};
use data_encoding::BASE32_NOPAD;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use totp_lite::{Sha1, totp_custom};
use tracing::debug;
use zeroize::Zeroize;

/// Length of a freshly generated shared secret in bytes (160 bits)
const SECRET_LEN: usize = 20;

/// TOTP policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TotpConfig {
    /// Time step in seconds (typically 30)
    pub time_step: u64,
    /// Number of digits in the code (typically 6)
    pub digits: u32,
    /// Steps of clock drift tolerated on either side of now
    pub skew: u64,
    /// Issuer name shown in authenticator apps
    pub issuer: String,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            time_step: 30,
            digits: 6,
            skew: 1,
            issuer: "Praxis".to_string(),
        }
    }
}

/// Shared TOTP secret material, zeroed on drop.
pub struct TotpSecret {
    bytes: Vec<u8>,
}

impl TotpSecret {
    /// Wrap raw bytes (the decryption path)
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for TotpSecret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// TOTP errors
#[derive(Debug, Clone)]
pub enum TotpError {
    /// QR code rendering failed
    QrRender,
}

impl std::fmt::Display for TotpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TotpError::QrRender => write!(f, "failed to render provisioning QR code"),
        }
    }
}

impl std::error::Error for TotpError {}

/// Manager for TOTP secret generation, provisioning display, and
/// verification
#[derive(Debug, Clone)]
pub struct TotpManager {
    config: TotpConfig,
}

impl TotpManager {
    pub fn new(config: TotpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TotpConfig {
        &self.config
    }

    /// Generate a fresh shared secret from the OS CSPRNG.
    pub fn generate_secret(&self) -> TotpSecret {
        let mut bytes = vec![0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut bytes);
        TotpSecret { bytes }
    }

    /// Base32 rendering of the secret for manual entry into an
    /// authenticator app.
    pub fn manual_key(&self, secret: &TotpSecret) -> String {
        BASE32_NOPAD.encode(secret.as_bytes())
    }

    /// Build the otpauth:// provisioning URI for an account.
    pub fn provisioning_uri(&self, secret: &TotpSecret, account_name: &str) -> String {
        format!(
            "otpauth://totp/{}:{}?secret={}&issuer={}&digits={}&period={}",
            urlencoding::encode(&self.config.issuer),
            urlencoding::encode(account_name),
            self.manual_key(secret),
            urlencoding::encode(&self.config.issuer),
            self.config.digits,
            self.config.time_step
        )
    }

    /// Render a provisioning URI as a scannable Unicode QR code.
    pub fn qr_code(&self, uri: &str) -> Result<String, TotpError> {
        let code = qrcode::QrCode::new(uri.as_bytes()).map_err(|_| TotpError::QrRender)?;
        Ok(code.render::<qrcode::render::unicode::Dense1x2>().build())
    }

    /// Verify a submitted code against the secret at `now`.
    ///
    /// Each candidate inside the configured skew window is derived and
    /// compared in constant time; the first match wins. Neither the secret
    /// nor any derived candidate is ever logged.
    pub fn verify_code(&self, secret: &[u8], code: &str, now: DateTime<Utc>) -> bool {
        if code.len() != self.config.digits as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }

        let step = self.config.time_step as i64;
        for offset in -(self.config.skew as i64)..=(self.config.skew as i64) {
            let at = now.timestamp() + offset * step;
            if at < 0 {
                continue;
            }

            let candidate =
                totp_custom::<Sha1>(self.config.time_step, self.config.digits, secret, at as u64);

            if bool::from(candidate.as_bytes().ct_eq(code.as_bytes())) {
                debug!(offset, "TOTP code accepted");
                return true;
            }
        }

        debug!("TOTP code rejected");
        false
    }
}
