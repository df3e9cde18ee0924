use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::MfaError;
use crate::models::TwoFactorSecret;
use crate::repositories::{BackupCodeRepository, TwoFactorSecretRepository};
use crate::services::{BackupCodeService, SecretVault, TotpService};

/// 一次認証（パスワード）再確認のコントラクト
///
/// パスワードハッシュの保存・照合方式は実装側の責務
#[async_trait]
pub trait PasswordVerifier: Send + Sync {
    /// アカウントのパスワードを検証
    async fn verify(&self, account_id: Uuid, password: &str) -> anyhow::Result<bool>;
}

/// 2FA設定開始時に呼び出し側へ返す情報
#[derive(Debug)]
pub struct SetupStarted {
    /// Base32エンコードされたシード（認証アプリへの手入力用）
    pub secret: String,
    /// otpauth:// URI（QR画像化は呼び出し側の責務）
    pub otpauth_uri: String,
}

/// 二要素認証の登録サービス
///
/// 設定開始 → 確認 → バックアップコード再発行 → 無効化を調停する
#[derive(Clone)]
pub struct EnrollmentService<S, B, P> {
    secret_repo: S,
    backup_repo: B,
    vault: SecretVault,
    totp: TotpService,
    backup_codes: BackupCodeService,
    password_verifier: P,
    backup_code_count: usize,
}

impl<S, B, P> EnrollmentService<S, B, P>
where
    S: TwoFactorSecretRepository,
    B: BackupCodeRepository,
    P: PasswordVerifier,
{
    /// 新しい EnrollmentService を作成
    pub fn new(
        secret_repo: S,
        backup_repo: B,
        vault: SecretVault,
        totp: TotpService,
        password_verifier: P,
        backup_code_count: usize,
    ) -> Self {
        Self {
            secret_repo,
            backup_repo,
            vault,
            totp,
            backup_codes: BackupCodeService::new(),
            password_verifier,
            backup_code_count,
        }
    }

    /// 2FA設定を開始（シード生成、登録URI返却）
    ///
    /// # Note
    /// 確認前の再実行は保留中のシークレットを黙って置き換える
    ///
    /// # Security
    /// シード平文は呼び出し側へ一度だけ返す。ログ出力禁止
    pub async fn start_setup(
        &self,
        account_id: Uuid,
        label: &str,
    ) -> Result<SetupStarted, MfaError> {
        if let Some(existing) = self
            .secret_repo
            .find_by_account_id(account_id)
            .await
            .map_err(MfaError::storage)?
        {
            if existing.enabled {
                return Err(MfaError::AlreadyEnabled);
            }
        }

        let seed = SecretVault::generate_seed();
        let encrypted = self.vault.encrypt(&seed)?;
        let now = OffsetDateTime::now_utc();

        self.secret_repo
            .save(&TwoFactorSecret::pending(account_id, encrypted, now))
            .await
            .map_err(MfaError::storage)?;

        // 前回の設定試行で残ったコードを掃除（再設定の冪等化）
        self.backup_repo
            .delete(account_id)
            .await
            .map_err(MfaError::storage)?;

        let otpauth_uri = self.totp.enrollment_uri(label, &seed)?;

        tracing::info!(account_id = %account_id, "2FA設定開始");

        Ok(SetupStarted {
            secret: seed,
            otpauth_uri,
        })
    }

    /// 2FA設定を確認し、有効化する
    ///
    /// # Returns
    /// バックアップコードの平文一式。この呼び出しでしか取得できない
    ///
    /// # Note
    /// コード不一致の場合は状態を変えない（保留のまま再試行可能）
    pub async fn confirm_setup(
        &self,
        account_id: Uuid,
        code: &str,
    ) -> Result<Vec<String>, MfaError> {
        validate_totp_code(code)?;

        let mut secret = self
            .secret_repo
            .find_by_account_id(account_id)
            .await
            .map_err(MfaError::storage)?
            .ok_or(MfaError::NotConfigured)?;

        if secret.enabled {
            return Err(MfaError::AlreadyEnabled);
        }

        let seed = self.vault.decrypt(&secret.secret_encrypted)?;

        if !self.totp.verify(&seed, code, OffsetDateTime::now_utc())? {
            return Err(MfaError::IncorrectCode);
        }

        let now = OffsetDateTime::now_utc();
        secret.enabled = true;
        secret.enabled_at = Some(now);
        secret.updated_at = now;
        self.secret_repo
            .save(&secret)
            .await
            .map_err(MfaError::storage)?;

        let codes = self.issue_backup_codes(account_id).await?;

        tracing::info!(account_id = %account_id, "2FA有効化完了");

        Ok(codes)
    }

    /// バックアップコードを再発行
    ///
    /// # Note
    /// 保存済みの一式を丸ごと置き換える。旧コードは以後永久に無効
    pub async fn regenerate_backup_codes(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<String>, MfaError> {
        let secret = self
            .secret_repo
            .find_by_account_id(account_id)
            .await
            .map_err(MfaError::storage)?
            .ok_or(MfaError::NotConfigured)?;

        if !secret.enabled {
            return Err(MfaError::NotEnabled);
        }

        let codes = self.issue_backup_codes(account_id).await?;

        tracing::info!(account_id = %account_id, "バックアップコード再発行");

        Ok(codes)
    }

    /// 2FAを無効化
    ///
    /// # Security
    /// 保護レベルを下げる操作のため、パスワード再確認必須。
    /// 確認に失敗した場合は状態を変えない
    pub async fn disable(&self, account_id: Uuid, password: &str) -> Result<(), MfaError> {
        let authorized = self
            .password_verifier
            .verify(account_id, password)
            .await
            .map_err(MfaError::Internal)?;

        if !authorized {
            tracing::warn!(account_id = %account_id, "2FA無効化失敗: パスワード不一致");
            return Err(MfaError::Unauthorized);
        }

        self.secret_repo
            .find_by_account_id(account_id)
            .await
            .map_err(MfaError::storage)?
            .ok_or(MfaError::NotConfigured)?;

        self.secret_repo
            .delete(account_id)
            .await
            .map_err(MfaError::storage)?;
        self.backup_repo
            .delete(account_id)
            .await
            .map_err(MfaError::storage)?;

        tracing::info!(account_id = %account_id, "2FA無効化完了");

        Ok(())
    }

    /// バックアップコードを発行し、ハッシュのみ保存
    async fn issue_backup_codes(&self, account_id: Uuid) -> Result<Vec<String>, MfaError> {
        let codes = self.backup_codes.generate(self.backup_code_count);
        let hashed: Vec<_> = codes.iter().map(|c| self.backup_codes.hash(c)).collect();
        self.backup_repo
            .replace(account_id, &hashed)
            .await
            .map_err(MfaError::storage)?;
        Ok(codes)
    }
}

/// TOTPコードバリデーション
fn validate_totp_code(code: &str) -> Result<(), MfaError> {
    if code.is_empty() {
        return Err(MfaError::Validation("認証コードは必須です".to_string()));
    }
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(MfaError::Validation(
            "認証コードは6桁の数字で入力してください".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use data_encoding::BASE32;
    use totp_rs::{Algorithm, TOTP};

    use crate::repositories::{InMemoryBackupCodeRepository, InMemoryTwoFactorSecretRepository};

    struct StubPasswordVerifier {
        accept: bool,
    }

    #[async_trait]
    impl PasswordVerifier for StubPasswordVerifier {
        async fn verify(&self, _account_id: Uuid, _password: &str) -> anyhow::Result<bool> {
            Ok(self.accept)
        }
    }

    type TestService = EnrollmentService<
        InMemoryTwoFactorSecretRepository,
        InMemoryBackupCodeRepository,
        StubPasswordVerifier,
    >;

    fn create_test_service(
        accept_password: bool,
    ) -> (
        TestService,
        InMemoryTwoFactorSecretRepository,
        InMemoryBackupCodeRepository,
    ) {
        let secret_repo = InMemoryTwoFactorSecretRepository::new();
        let backup_repo = InMemoryBackupCodeRepository::new();
        let vault = SecretVault::new(&STANDARD.encode([0u8; 32])).unwrap();
        let service = EnrollmentService::new(
            secret_repo.clone(),
            backup_repo.clone(),
            vault,
            TotpService::new("TestApp".to_string()),
            StubPasswordVerifier {
                accept: accept_password,
            },
            10,
        );
        (service, secret_repo, backup_repo)
    }

    /// 現在時刻の正しいコードを計算（テスト用）
    fn current_code(secret: &str) -> String {
        let seed_bytes = BASE32.decode(secret.as_bytes()).unwrap();
        let totp = TOTP::new(Algorithm::SHA1, 6, 1, 30, seed_bytes, None, String::new()).unwrap();
        totp.generate_current().unwrap()
    }

    async fn enroll(service: &TestService, account_id: Uuid) -> Vec<String> {
        let setup = service
            .start_setup(account_id, "user@example.com")
            .await
            .unwrap();
        service
            .confirm_setup(account_id, &current_code(&setup.secret))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_setup_returns_secret_and_uri() {
        let (service, secret_repo, _) = create_test_service(true);
        let account_id = Uuid::new_v4();

        let setup = service
            .start_setup(account_id, "user@example.com")
            .await
            .unwrap();

        assert_eq!(setup.secret.len(), 32);
        assert!(setup.otpauth_uri.starts_with("otpauth://totp/"));

        // 保留中（enabled = false）で保存されている
        let stored = secret_repo
            .find_by_account_id(account_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.enabled);
        assert!(stored.enabled_at.is_none());
    }

    #[tokio::test]
    async fn test_start_setup_replaces_pending_secret() {
        let (service, _, _) = create_test_service(true);
        let account_id = Uuid::new_v4();

        let first = service
            .start_setup(account_id, "user@example.com")
            .await
            .unwrap();
        let second = service
            .start_setup(account_id, "user@example.com")
            .await
            .unwrap();
        assert_ne!(first.secret, second.secret);

        // 旧シードのコードは無効、新シードのコードで確認できる
        let result = service
            .confirm_setup(account_id, &current_code(&first.secret))
            .await;
        assert!(matches!(result, Err(MfaError::IncorrectCode)));
        service
            .confirm_setup(account_id, &current_code(&second.secret))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_start_setup_rejects_enabled_account() {
        let (service, _, _) = create_test_service(true);
        let account_id = Uuid::new_v4();
        enroll(&service, account_id).await;

        let result = service.start_setup(account_id, "user@example.com").await;
        assert!(matches!(result, Err(MfaError::AlreadyEnabled)));
    }

    #[tokio::test]
    async fn test_confirm_setup_returns_backup_codes() {
        let (service, secret_repo, backup_repo) = create_test_service(true);
        let account_id = Uuid::new_v4();

        let codes = enroll(&service, account_id).await;
        assert_eq!(codes.len(), 10);

        let stored = secret_repo
            .find_by_account_id(account_id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.enabled);
        assert!(stored.enabled_at.is_some());

        // 保存されるのはハッシュのみ
        let set = backup_repo
            .find_by_account_id(account_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(set.remaining(), 10);
        for code in &codes {
            assert!(!set.codes.iter().any(|h| h.digest.contains(code)));
        }
    }

    #[tokio::test]
    async fn test_confirm_setup_with_wrong_code_is_retryable() {
        let (service, _, _) = create_test_service(true);
        let account_id = Uuid::new_v4();

        let setup = service
            .start_setup(account_id, "user@example.com")
            .await
            .unwrap();

        let result = service.confirm_setup(account_id, "000000").await;
        assert!(matches!(result, Err(MfaError::IncorrectCode)));

        // 保留のまま。正しいコードで再試行できる
        service
            .confirm_setup(account_id, &current_code(&setup.secret))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_confirm_setup_without_pending_secret() {
        let (service, _, _) = create_test_service(true);
        let result = service.confirm_setup(Uuid::new_v4(), "123456").await;
        assert!(matches!(result, Err(MfaError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_confirm_setup_validates_code_shape() {
        let (service, _, _) = create_test_service(true);
        let account_id = Uuid::new_v4();
        service
            .start_setup(account_id, "user@example.com")
            .await
            .unwrap();

        assert!(matches!(
            service.confirm_setup(account_id, "").await,
            Err(MfaError::Validation(_))
        ));
        assert!(matches!(
            service.confirm_setup(account_id, "12345a").await,
            Err(MfaError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_regenerate_requires_enabled() {
        let (service, _, _) = create_test_service(true);
        let account_id = Uuid::new_v4();

        // 未設定
        assert!(matches!(
            service.regenerate_backup_codes(account_id).await,
            Err(MfaError::NotConfigured)
        ));

        // 保留中（未確認）
        service
            .start_setup(account_id, "user@example.com")
            .await
            .unwrap();
        assert!(matches!(
            service.regenerate_backup_codes(account_id).await,
            Err(MfaError::NotEnabled)
        ));
    }

    #[tokio::test]
    async fn test_regenerate_invalidates_old_codes() {
        let (service, _, backup_repo) = create_test_service(true);
        let account_id = Uuid::new_v4();
        let old_codes = enroll(&service, account_id).await;

        let new_codes = service.regenerate_backup_codes(account_id).await.unwrap();
        assert_eq!(new_codes.len(), 10);

        let set = backup_repo
            .find_by_account_id(account_id)
            .await
            .unwrap()
            .unwrap();
        let checker = BackupCodeService::new();
        for code in &old_codes {
            let (valid, _) = checker.verify(&set.codes, code);
            assert!(!valid);
        }
        for code in &new_codes {
            let (valid, _) = checker.verify(&set.codes, code);
            assert!(valid);
        }
    }

    #[tokio::test]
    async fn test_disable_with_wrong_password() {
        let (service, secret_repo, backup_repo) = create_test_service(false);
        let account_id = Uuid::new_v4();
        enroll(&service, account_id).await;

        let result = service.disable(account_id, "wrong-password").await;
        assert!(matches!(result, Err(MfaError::Unauthorized)));

        // 状態は変わらない
        assert!(
            secret_repo
                .find_by_account_id(account_id)
                .await
                .unwrap()
                .unwrap()
                .enabled
        );
        assert!(
            backup_repo
                .find_by_account_id(account_id)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_disable_clears_enrollment() {
        let (service, secret_repo, backup_repo) = create_test_service(true);
        let account_id = Uuid::new_v4();
        enroll(&service, account_id).await;

        service.disable(account_id, "correct-password").await.unwrap();

        assert!(
            secret_repo
                .find_by_account_id(account_id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            backup_repo
                .find_by_account_id(account_id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_validate_totp_code() {
        assert!(validate_totp_code("123456").is_ok());
        assert!(validate_totp_code("").is_err());
        assert!(validate_totp_code("12345").is_err());
        assert!(validate_totp_code("12345a").is_err());
    }
}
