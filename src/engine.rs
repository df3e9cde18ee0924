use secrecy::ExposeSecret;

use crate::config::Config;
use crate::error::MfaError;
use crate::repositories::{BackupCodeRepository, ChallengeRepository, TwoFactorSecretRepository};
use crate::services::{
    ChallengeService, EnrollmentService, PasswordVerifier, SecretVault, SessionIssuer,
    TotpService, VerificationService,
};

/// MFAエンジンの組み立て
///
/// 設定・リポジトリ・外部コラボレータから各サービスを構築して保持する。
/// 組み込み先はこの型を共有状態として持てばよい。
/// Clone は内部状態を共有する
#[derive(Clone)]
pub struct MfaEngine<S, B, C, P, I> {
    /// チャレンジサービス（一次認証成功時の発行に使う）
    pub challenges: ChallengeService<C>,
    /// 登録サービス
    pub enrollment: EnrollmentService<S, B, P>,
    /// 検証サービス
    pub verification: VerificationService<S, B, C, I>,
}

impl<S, B, C, P, I> MfaEngine<S, B, C, P, I>
where
    S: TwoFactorSecretRepository + Clone,
    B: BackupCodeRepository + Clone,
    C: ChallengeRepository + Clone,
    P: PasswordVerifier,
    I: SessionIssuer,
{
    /// 新しい MfaEngine を作成
    pub fn new(
        config: &Config,
        secret_repo: S,
        backup_repo: B,
        challenge_repo: C,
        password_verifier: P,
        session_issuer: I,
    ) -> Result<Self, MfaError> {
        let vault = SecretVault::new(config.encryption_key.expose_secret())?;
        let totp = TotpService::new(config.totp_issuer.clone());

        let challenges = ChallengeService::new(
            challenge_repo,
            config.challenge_ttl_secs,
            config.challenge_max_attempts,
        );

        let enrollment = EnrollmentService::new(
            secret_repo.clone(),
            backup_repo.clone(),
            vault.clone(),
            totp.clone(),
            password_verifier,
            config.backup_code_count,
        );

        let verification = VerificationService::new(
            secret_repo,
            backup_repo,
            challenges.clone(),
            vault,
            totp,
            session_issuer,
        );

        Ok(Self {
            challenges,
            enrollment,
            verification,
        })
    }
}
