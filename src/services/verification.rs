use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::MfaError;
use crate::repositories::{BackupCodeRepository, ChallengeRepository, TwoFactorSecretRepository};
use crate::services::{BackupCodeService, ChallengeService, SecretVault, TotpService};

/// セッション発行時に引き渡すリクエスト情報
#[derive(Debug, Clone, Default)]
pub struct ClientMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// セッション発行のコントラクト
///
/// 二要素確認の成功後にのみ呼び出される。発行方式・保存場所は実装側の責務
#[async_trait]
pub trait SessionIssuer: Send + Sync {
    type Session: Send;

    /// アカウントの完全なセッションを発行
    async fn create(
        &self,
        account_id: Uuid,
        metadata: &ClientMetadata,
    ) -> anyhow::Result<Self::Session>;
}

/// 二要素認証の検証サービス
///
/// 一次認証成功時に発行されたチャレンジに対し、TOTPコードまたは
/// バックアップコードの提示を検証してセッション発行へ引き渡す。
/// チャレンジの発行自体は呼び出し側が ChallengeService::create で行う
#[derive(Clone)]
pub struct VerificationService<S, B, C, I> {
    secret_repo: S,
    backup_repo: B,
    challenges: ChallengeService<C>,
    vault: SecretVault,
    totp: TotpService,
    backup_codes: BackupCodeService,
    session_issuer: I,
}

impl<S, B, C, I> VerificationService<S, B, C, I>
where
    S: TwoFactorSecretRepository,
    B: BackupCodeRepository,
    C: ChallengeRepository,
    I: SessionIssuer,
{
    /// 新しい VerificationService を作成
    pub fn new(
        secret_repo: S,
        backup_repo: B,
        challenges: ChallengeService<C>,
        vault: SecretVault,
        totp: TotpService,
        session_issuer: I,
    ) -> Self {
        Self {
            secret_repo,
            backup_repo,
            challenges,
            vault,
            totp,
            backup_codes: BackupCodeService::new(),
            session_issuer,
        }
    }

    /// チャレンジに対するコード提示を検証し、セッションを発行する
    ///
    /// TOTPコードを先に照合し、不一致ならバックアップコードを照合する。
    ///
    /// # Security
    /// - コード不一致時もチャレンジは有効なまま（試行上限で頭打ち）
    /// - チャレンジの消費はセッション発行成功後。発行に失敗しても
    ///   一次認証からやり直させない
    pub async fn verify(
        &self,
        token: &str,
        code: &str,
        metadata: &ClientMetadata,
    ) -> Result<I::Session, MfaError> {
        validate_code_shape(code)?;
        let code = code.trim();

        let challenge = self
            .challenges
            .lookup(token)
            .await?
            .ok_or(MfaError::ChallengeExpired)?;
        let account_id = challenge.account_id;

        // 2FA未設定アカウントへのチャレンジは焼却して打ち切る
        // （どのコードも通らないため、再試行可能なまま残さない）
        let secret = self
            .secret_repo
            .find_by_account_id(account_id)
            .await
            .map_err(MfaError::storage)?;
        let secret = match secret {
            Some(s) if s.enabled => s,
            _ => {
                let _ = self.challenges.consume(token).await;
                tracing::warn!(account_id = %account_id, "2FA未設定アカウントへのチャレンジ");
                return Err(MfaError::NotConfigured);
            }
        };

        // 試行回数を記録（上限超過はここで TooManyAttempts）
        self.challenges.record_attempt(token).await?;

        let seed = self.vault.decrypt(&secret.secret_encrypted)?;
        let now = OffsetDateTime::now_utc();

        if !self.totp.verify(&seed, code, now)? {
            self.consume_backup_code(account_id, code).await?;
        }

        let session = self
            .session_issuer
            .create(account_id, metadata)
            .await
            .map_err(MfaError::Internal)?;

        // 消費レースに負けた場合は使用済みチャレンジとして扱う
        if !self.challenges.consume(token).await? {
            tracing::warn!(account_id = %account_id, "チャレンジは既に消費されていた");
            return Err(MfaError::ChallengeExpired);
        }

        tracing::info!(account_id = %account_id, "二要素認証成功");

        Ok(session)
    }

    /// バックアップコードを照合し、一致した1枚を条件付き更新で除去
    ///
    /// # Note
    /// 競合で更新に負けた場合は一度だけ再読込・再試行する。
    /// 再試行でもコードが残っていれば RaceConditionConflict
    async fn consume_backup_code(&self, account_id: Uuid, code: &str) -> Result<(), MfaError> {
        if self.try_consume_backup_code(account_id, code).await? {
            return Ok(());
        }

        if self.try_consume_backup_code(account_id, code).await? {
            return Ok(());
        }

        Err(MfaError::RaceConditionConflict)
    }

    /// 1回分の照合と条件付き更新
    ///
    /// # Returns
    /// - Ok(true): 一致し、除去の書き込みに勝った
    /// - Ok(false): 一致したが書き込みで負けた（要再読込）
    /// - Err(IncorrectCode): 一致しない（並行リクエストに使われた場合を含む）
    async fn try_consume_backup_code(
        &self,
        account_id: Uuid,
        code: &str,
    ) -> Result<bool, MfaError> {
        let set = self
            .backup_repo
            .find_by_account_id(account_id)
            .await
            .map_err(MfaError::storage)?
            .ok_or(MfaError::IncorrectCode)?;

        let (valid, remaining) = self.backup_codes.verify(&set.codes, code);
        if !valid {
            return Err(MfaError::IncorrectCode);
        }

        let updated = self
            .backup_repo
            .update_if_version(account_id, set.version, &remaining)
            .await
            .map_err(MfaError::storage)?;

        if updated {
            tracing::info!(
                account_id = %account_id,
                remaining = remaining.len(),
                "バックアップコード使用"
            );
        }

        Ok(updated)
    }
}

/// コード形状バリデーション
///
/// TOTPコード（6桁の数字）またはバックアップコード（8文字の16進数）
fn validate_code_shape(code: &str) -> Result<(), MfaError> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return Err(MfaError::Validation("認証コードは必須です".to_string()));
    }

    let is_totp = trimmed.len() == 6 && trimmed.chars().all(|c| c.is_ascii_digit());
    let is_backup = trimmed.len() == 8 && trimmed.chars().all(|c| c.is_ascii_hexdigit());
    if !is_totp && !is_backup {
        return Err(MfaError::Validation(
            "認証コードの形式が正しくありません".to_string(),
        ));
    }

    Ok(())
}
