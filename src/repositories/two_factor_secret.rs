use async_trait::async_trait;
use uuid::Uuid;

use crate::models::TwoFactorSecret;

/// 二要素認証シークレットの永続化コントラクト
///
/// 物理的な保存方式（RDB、KVSなど）は実装側の責務。
/// 実装はアカウントごとに高々1レコードを保持すること
#[async_trait]
pub trait TwoFactorSecretRepository: Send + Sync {
    /// アカウントIDでシークレットを検索
    async fn find_by_account_id(
        &self,
        account_id: Uuid,
    ) -> anyhow::Result<Option<TwoFactorSecret>>;

    /// シークレットを保存
    ///
    /// # Note
    /// 既存レコードは丸ごと置き換える（再設定時の上書き）
    async fn save(&self, secret: &TwoFactorSecret) -> anyhow::Result<()>;

    /// シークレットを削除
    async fn delete(&self, account_id: Uuid) -> anyhow::Result<()>;
}
