use data_encoding::BASE32;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use totp_rs::{Algorithm, TOTP};

use crate::error::MfaError;

/// TOTPのタイムステップ（秒）
const TOTP_PERIOD_SECS: i64 = 30;
/// 許容する時刻ずれ（前後ステップ数）
const TOTP_DRIFT_STEPS: i64 = 1;

/// TOTP (Time-based One-Time Password) サービス
///
/// # Security
/// - コード照合は定数時間比較（タイミングサイドチャネル対策）
/// - シード・コードはログに出力しない
#[derive(Clone)]
pub struct TotpService {
    issuer: String,
}

impl TotpService {
    /// 新しい TotpService を作成
    ///
    /// # Arguments
    /// * `issuer` - TOTP発行者名（アプリ名）
    pub fn new(issuer: String) -> Self {
        Self { issuer }
    }

    /// TOTPコードを検証
    ///
    /// # Note
    /// クライアントとサーバーの時刻ずれを許容するため、
    /// at の前後1ステップ（±30秒）のコードも受理する
    pub fn verify(&self, seed: &str, code: &str, at: OffsetDateTime) -> Result<bool, MfaError> {
        // 入力検証: コードは6桁の数字のみ
        if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
            return Ok(false);
        }

        let totp = self.create_totp_for_verify(seed)?;
        let timestamp = at.unix_timestamp();

        let mut matched = false;
        for step in -TOTP_DRIFT_STEPS..=TOTP_DRIFT_STEPS {
            let t = timestamp + step * TOTP_PERIOD_SECS;
            if t < 0 {
                continue;
            }
            let expected = totp.generate(t as u64);
            // 一致後も残りのステップを比較し続ける（処理時間を揃える）
            matched |= bool::from(expected.as_bytes().ct_eq(code.as_bytes()));
        }

        Ok(matched)
    }

    /// 登録用URI（otpauth://）を生成
    ///
    /// 発行者名とアカウントラベルを埋め込む。QR画像化は呼び出し側の責務
    pub fn enrollment_uri(&self, label: &str, seed: &str) -> Result<String, MfaError> {
        let totp = self.create_totp(label, seed)?;
        Ok(totp.get_url())
    }

    /// TOTP オブジェクトを作成（URI生成用）
    fn create_totp(&self, label: &str, seed: &str) -> Result<TOTP, MfaError> {
        let seed_bytes = BASE32.decode(seed.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "シードのBase32デコードエラー");
            MfaError::Internal(anyhow::anyhow!("invalid base32 seed"))
        })?;

        TOTP::new(
            Algorithm::SHA1,
            6,                       // 6桁
            TOTP_DRIFT_STEPS as u8,  // skew: 前後1ステップ許容
            TOTP_PERIOD_SECS as u64, // period: 30秒
            seed_bytes,
            Some(self.issuer.clone()),
            label.to_string(),
        )
        .map_err(|e| {
            tracing::error!(error = %e, "TOTP作成エラー");
            MfaError::Internal(anyhow::anyhow!("totp creation error"))
        })
    }

    /// TOTP オブジェクトを作成（検証用）
    fn create_totp_for_verify(&self, seed: &str) -> Result<TOTP, MfaError> {
        let seed_bytes = BASE32.decode(seed.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "シードのBase32デコードエラー");
            MfaError::Internal(anyhow::anyhow!("invalid base32 seed"))
        })?;

        TOTP::new(
            Algorithm::SHA1,
            6,
            TOTP_DRIFT_STEPS as u8,
            TOTP_PERIOD_SECS as u64,
            seed_bytes,
            None,
            String::new(),
        )
        .map_err(|e| {
            tracing::error!(error = %e, "TOTP作成エラー");
            MfaError::Internal(anyhow::anyhow!("totp creation error"))
        })
    }
}
