use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, OsRng},
};
use data_encoding::BASE32;
use rand::RngCore;

use crate::error::MfaError;

/// TOTPシード暗号化サービス
///
/// # Security
/// - シードはAES-256-GCM（認証付き暗号）で暗号化して保存
/// - 改竄・破損した暗号文は復号エラーになる（不正なシードを返さない）
/// - シード平文はログに出力しない
#[derive(Clone)]
pub struct SecretVault {
    encryption_key: [u8; 32],
}

impl SecretVault {
    /// 新しい SecretVault を作成
    ///
    /// # Arguments
    /// * `encryption_key_base64` - Base64エンコードされた32バイトの暗号化キー
    pub fn new(encryption_key_base64: &str) -> Result<Self, MfaError> {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        let key_bytes = STANDARD.decode(encryption_key_base64).map_err(|e| {
            tracing::error!(error = ?e, "暗号化キーのBase64デコードエラー");
            MfaError::Internal(anyhow::anyhow!("invalid encryption key format"))
        })?;

        if key_bytes.len() != 32 {
            tracing::error!(
                expected = 32,
                actual = key_bytes.len(),
                "暗号化キーの長さが不正"
            );
            return Err(MfaError::Internal(anyhow::anyhow!(
                "encryption key must be 32 bytes"
            )));
        }

        let mut encryption_key = [0u8; 32];
        encryption_key.copy_from_slice(&key_bytes);

        Ok(Self { encryption_key })
    }

    /// 20バイト（160ビット）のランダムシードを生成し、Base32でエンコード
    ///
    /// Base32 は認証アプリへの手入力・QR連携用
    pub fn generate_seed() -> String {
        let mut bytes = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut bytes);
        BASE32.encode(&bytes)
    }

    /// シードをAES-256-GCMで暗号化
    ///
    /// # Returns
    /// 96ビットnonce (12バイト) + 暗号文
    pub fn encrypt(&self, seed: &str) -> Result<Vec<u8>, MfaError> {
        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            MfaError::Internal(anyhow::anyhow!("cipher initialization error"))
        })?;

        // 96ビット (12バイト) のランダムnonce生成
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher.encrypt(nonce, seed.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "シード暗号化エラー");
            MfaError::Internal(anyhow::anyhow!("encryption error"))
        })?;

        // nonce + ciphertext を結合
        let mut result = Vec::with_capacity(12 + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// 暗号化されたシードを復号
    ///
    /// # Note
    /// 改竄・破損・形式不正はすべて DecryptionFailed。
    /// アカウント設定異常であり「コード不一致」として扱ってはならない
    pub fn decrypt(&self, encrypted: &[u8]) -> Result<String, MfaError> {
        if encrypted.len() < 12 {
            tracing::error!(len = encrypted.len(), "暗号化データが短すぎる");
            return Err(MfaError::DecryptionFailed);
        }

        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            MfaError::Internal(anyhow::anyhow!("cipher initialization error"))
        })?;

        let (nonce_bytes, ciphertext) = encrypted.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|e| {
            tracing::error!(error = ?e, "シード復号エラー");
            MfaError::DecryptionFailed
        })?;

        String::from_utf8(plaintext).map_err(|e| {
            tracing::error!(error = ?e, "復号データのUTF-8変換エラー");
            MfaError::DecryptionFailed
        })
    }
}
