use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::MfaError;
use crate::models::Challenge;
use crate::repositories::ChallengeRepository;

/// 二要素認証チャレンジサービス
///
/// 一次認証（パスワード）成功からセッション発行までの間、
/// 単回使用のチャレンジを管理する。
///
/// # Security
/// - トークン（平文）はログに出力しない
/// - ストレージにはSHA-256ハッシュのみ保存
#[derive(Clone)]
pub struct ChallengeService<R> {
    repo: R,
    ttl_secs: i64,
    max_attempts: i32,
}

impl<R: ChallengeRepository> ChallengeService<R> {
    /// 新しい ChallengeService を作成
    ///
    /// # Arguments
    /// * `ttl_secs` - チャレンジの有効期間（秒）
    /// * `max_attempts` - チャレンジごとのコード試行回数上限
    pub fn new(repo: R, ttl_secs: i64, max_attempts: i32) -> Self {
        Self {
            repo,
            ttl_secs,
            max_attempts,
        }
    }

    /// 新しいチャレンジを作成し、平文トークンを返す
    pub async fn create(&self, account_id: Uuid) -> Result<String, MfaError> {
        let token = Self::generate_token();
        let token_hash = Self::hash_token(&token);
        let now = OffsetDateTime::now_utc();

        let challenge = Challenge {
            token_hash,
            account_id,
            created_at: now,
            expires_at: now + Duration::seconds(self.ttl_secs),
            consumed_at: None,
            attempt_count: 0,
        };

        self.repo
            .insert(&challenge)
            .await
            .map_err(MfaError::storage)?;

        tracing::info!(account_id = %account_id, "二要素認証チャレンジ作成");

        Ok(token)
    }

    /// トークンでチャレンジを検索
    ///
    /// # Security
    /// 不存在・期限切れ・消費済みは呼び出し側から区別できない
    /// （トークンの状態漏洩防止）
    pub async fn lookup(&self, token: &str) -> Result<Option<Challenge>, MfaError> {
        let token_hash = Self::hash_token(token);
        let challenge = self
            .repo
            .find_by_token_hash(&token_hash)
            .await
            .map_err(MfaError::storage)?;

        let challenge = match challenge {
            Some(c) => c,
            None => return Ok(None),
        };

        if challenge.is_consumed() {
            tracing::warn!(account_id = %challenge.account_id, "消費済みチャレンジへのアクセス");
            return Ok(None);
        }

        if challenge.is_expired(OffsetDateTime::now_utc()) {
            tracing::warn!(account_id = %challenge.account_id, "期限切れチャレンジへのアクセス");
            return Ok(None);
        }

        Ok(Some(challenge))
    }

    /// コード試行を記録
    ///
    /// # Note
    /// 上限を超えた試行はチャレンジ自体を消費（焼却）して
    /// TooManyAttempts を返す。チャレンジ単位の総当たり対策
    pub async fn record_attempt(&self, token: &str) -> Result<i32, MfaError> {
        let token_hash = Self::hash_token(token);
        let count = self
            .repo
            .increment_attempts(&token_hash)
            .await
            .map_err(MfaError::storage)?
            .ok_or(MfaError::ChallengeExpired)?;

        if count > self.max_attempts {
            let _ = self
                .repo
                .consume(&token_hash, OffsetDateTime::now_utc())
                .await
                .map_err(MfaError::storage)?;
            tracing::warn!(attempts = count, "試行回数上限超過によりチャレンジを無効化");
            return Err(MfaError::TooManyAttempts);
        }

        Ok(count)
    }

    /// チャレンジを消費（単回使用）
    ///
    /// # Returns
    /// 未消費から消費済みへの遷移に成功した呼び出しのみ true
    pub async fn consume(&self, token: &str) -> Result<bool, MfaError> {
        let token_hash = Self::hash_token(token);
        self.repo
            .consume(&token_hash, OffsetDateTime::now_utc())
            .await
            .map_err(MfaError::storage)
    }

    /// 期限切れチャレンジを削除
    ///
    /// 有効期限は lookup 時に遅延判定されるため、これはストレージ回収用
    pub async fn purge_expired(&self) -> Result<u64, MfaError> {
        self.repo
            .delete_expired(OffsetDateTime::now_utc())
            .await
            .map_err(MfaError::storage)
    }

    /// 32バイトのランダムトークンを生成
    fn generate_token() -> String {
        let mut bytes = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// トークンをSHA256でハッシュ化
    fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
