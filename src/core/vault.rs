use aes_gcm::{
    aead::{consts::U16, Aead, KeyInit},
    aes::Aes256,
    AesGcm, Nonce,
};
use rand::RngCore;
use tracing::warn;

/// AES-256-GCM with a 16-byte IV, matching the persisted secret layout.
type VaultCipher = AesGcm<Aes256, U16>;

const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Placeholder shown instead of ciphertext fragments.
const ENCRYPTED_MASK: &str = "********";

/// Envelope encryption for gateway credentials at rest.
///
/// Secrets are persisted as `ivHex:authTagHex:ciphertextHex`. The vault never
/// aborts the process over key problems: a missing key degrades to plaintext
/// storage and a malformed key degrades to an ephemeral per-process key, both
/// logged loudly. Decryption of anything that does not look like vault output
/// returns the input unchanged so legacy plaintext rows stay readable.
pub struct CredentialVault {
    cipher: Option<VaultCipher>,
}

impl CredentialVault {
    /// Build the vault from `PAYMENT_ENCRYPTION_KEY` at startup.
    ///
    /// Accepts a 64-char hex key or a 32-byte raw key.
    pub fn from_env() -> Self {
        Self::new(std::env::var("PAYMENT_ENCRYPTION_KEY").ok().as_deref())
    }

    pub fn new(key: Option<&str>) -> Self {
        let Some(key) = key.filter(|k| !k.is_empty()) else {
            warn!("PAYMENT_ENCRYPTION_KEY not set, gateway credentials will be stored in plaintext");
            return Self { cipher: None };
        };

        let key_bytes = match Self::parse_key(key) {
            Some(bytes) => bytes,
            None => {
                warn!(
                    key_len = key.len(),
                    "PAYMENT_ENCRYPTION_KEY has invalid length, using an ephemeral key; \
                     secrets encrypted this run will not survive a restart"
                );
                let mut ephemeral = [0u8; KEY_LEN];
                rand::rngs::OsRng.fill_bytes(&mut ephemeral);
                ephemeral
            }
        };

        let cipher = VaultCipher::new_from_slice(&key_bytes)
            .ok()
            .or_else(|| {
                warn!("Failed to initialize credential cipher, falling back to plaintext storage");
                None
            });

        Self { cipher }
    }

    fn parse_key(key: &str) -> Option<[u8; KEY_LEN]> {
        let mut out = [0u8; KEY_LEN];
        if key.len() == KEY_LEN * 2 {
            let decoded = hex::decode(key).ok()?;
            out.copy_from_slice(&decoded);
            return Some(out);
        }
        if key.len() == KEY_LEN {
            out.copy_from_slice(key.as_bytes());
            return Some(out);
        }
        None
    }

    /// Encrypt a secret for persistence.
    ///
    /// In plaintext mode (no key configured) the input is returned unchanged.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let Some(cipher) = &self.cipher else {
            return plaintext.to_string();
        };

        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        let nonce = Nonce::<U16>::from_slice(&iv);

        match cipher.encrypt(nonce, plaintext.as_bytes()) {
            Ok(sealed) => {
                // aes-gcm appends the auth tag to the ciphertext
                let (body, tag) = sealed.split_at(sealed.len() - TAG_LEN);
                format!("{}:{}:{}", hex::encode(iv), hex::encode(tag), hex::encode(body))
            }
            Err(err) => {
                warn!(error = %err, "Credential encryption failed, storing plaintext");
                plaintext.to_string()
            }
        }
    }

    /// Decrypt a persisted secret.
    ///
    /// Input that does not match the `iv:tag:ciphertext` layout is treated as
    /// legacy plaintext and returned unchanged. A failed decryption (wrong key,
    /// corrupt record) also returns the original string so one bad row degrades
    /// a single gateway rather than the whole admin surface.
    pub fn decrypt(&self, stored: &str) -> String {
        let Some((iv, tag, body)) = Self::split_parts(stored) else {
            return stored.to_string();
        };

        let Some(cipher) = &self.cipher else {
            warn!("Encrypted credential found but no encryption key is configured");
            return stored.to_string();
        };

        let mut sealed = body;
        sealed.extend_from_slice(&tag);
        let nonce = Nonce::<U16>::from_slice(&iv);

        match cipher.decrypt(nonce, sealed.as_slice()) {
            Ok(plain) => String::from_utf8(plain).unwrap_or_else(|_| stored.to_string()),
            Err(_) => {
                warn!("Credential decryption failed, returning stored value unchanged");
                stored.to_string()
            }
        }
    }

    /// Whether a stored value matches the vault's encrypted layout.
    pub fn is_encrypted(&self, value: &str) -> bool {
        Self::split_parts(value).is_some()
    }

    /// Mask a secret for display: 3-char prefix + 4-char suffix of plaintext
    /// values, a constant placeholder for anything in encrypted form.
    pub fn mask(&self, secret: &str) -> String {
        if self.is_encrypted(secret) {
            return ENCRYPTED_MASK.to_string();
        }
        if secret.len() < 8 {
            return "****".to_string();
        }
        format!("{}****{}", &secret[..3], &secret[secret.len() - 4..])
    }

    fn split_parts(value: &str) -> Option<([u8; IV_LEN], Vec<u8>, Vec<u8>)> {
        let mut parts = value.splitn(3, ':');
        let iv_hex = parts.next()?;
        let tag_hex = parts.next()?;
        let body_hex = parts.next()?;

        if iv_hex.len() != IV_LEN * 2 || tag_hex.len() != TAG_LEN * 2 {
            return None;
        }

        let iv_bytes = hex::decode(iv_hex).ok()?;
        let tag = hex::decode(tag_hex).ok()?;
        let body = hex::decode(body_hex).ok()?;

        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&iv_bytes);
        Some((iv, tag, body))
    }
}
