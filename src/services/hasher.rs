use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;

use crate::error::TokenError;

/// シークレットの一方向ハッシュ化と検証
pub trait SecretHasher: Send + Sync {
    /// ソルト付きハッシュを生成（ソルトとパラメータは出力に埋め込まれる）
    fn hash(&self, plain: &str) -> Result<String, TokenError>;

    /// シークレットがハッシュと一致するか
    fn verify(&self, plain: &str, digest: &str) -> bool;
}

/// argon2id によるハッシュ化
#[derive(Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl SecretHasher for Argon2Hasher {
    fn hash(&self, plain: &str) -> Result<String, TokenError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                tracing::error!(error = ?e, "トークンハッシュ生成エラー");
                TokenError::Hashing(e.to_string())
            })?;
        Ok(hash.to_string())
    }

    /// # Note
    /// 比較は argon2 クレートの定数時間比較に任せる
    fn verify(&self, plain: &str, digest: &str) -> bool {
        if plain.is_empty() || digest.is_empty() {
            return false;
        }

        let parsed_hash = match PasswordHash::new(digest) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::error!(error = ?e, "トークンハッシュのパースエラー");
                return false;
            }
        };

        self.argon2()
            .verify_password(plain.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

/// `len` バイトのランダムシークレットを生成し、URL-safe Base64 でエンコード
pub fn generate_secret(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> Argon2Hasher {
        Argon2Hasher::new(Params::new(8, 1, 1, None).unwrap())
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = fast_hasher();
        let secret = generate_secret(32);
        let digest = hasher.hash(&secret).unwrap();

        assert!(digest.starts_with("$argon2id$"));
        assert_ne!(digest, secret);
        assert!(hasher.verify(&secret, &digest));
        assert!(!hasher.verify(&generate_secret(32), &digest));
    }

    #[test]
    fn test_hash_is_salted() {
        let hasher = fast_hasher();
        let a = hasher.hash("same-secret").unwrap();
        let b = hasher.hash("same-secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_uses_embedded_params() {
        // パラメータが異なるハッシャーでも検証できる
        let digest = fast_hasher().hash("secret").unwrap();
        let other = Argon2Hasher::new(Params::new(16, 2, 1, None).unwrap());
        assert!(other.verify("secret", &digest));
    }

    #[test]
    fn test_verify_rejects_empty_and_malformed() {
        let hasher = fast_hasher();
        let digest = hasher.hash("secret").unwrap();

        assert!(!hasher.verify("", &digest));
        assert!(!hasher.verify("secret", ""));
        assert!(!hasher.verify("secret", "invalid_hash_format"));
    }

    #[test]
    fn test_generate_secret() {
        let secret = generate_secret(32);
        // 32バイト → Base64(パディングなし) 43文字
        assert_eq!(secret.len(), 43);
        assert!(
            secret
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(secret, generate_secret(32));
    }
}
