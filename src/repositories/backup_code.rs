use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{BackupCodeSet, HashedBackupCode};

/// バックアップコード一式の永続化コントラクト
///
/// 使用済みコードの除去は update_if_version（CAS）経由でのみ行うこと。
/// 無条件の上書きで除去すると同一コードの二重使用レースが再発する
#[async_trait]
pub trait BackupCodeRepository: Send + Sync {
    /// アカウントIDでコード一式を検索
    async fn find_by_account_id(&self, account_id: Uuid) -> anyhow::Result<Option<BackupCodeSet>>;

    /// コード一式を丸ごと置き換え（新規発行・再発行用）
    ///
    /// # Note
    /// version は実装側で新しい世代に採番する
    async fn replace(&self, account_id: Uuid, codes: &[HashedBackupCode]) -> anyhow::Result<()>;

    /// 条件付き更新（CAS）
    ///
    /// 保存中の世代が expected_version と一致する場合のみ codes で置き換え、
    /// true を返す。不一致の場合は何も変更せず false を返す
    async fn update_if_version(
        &self,
        account_id: Uuid,
        expected_version: u64,
        codes: &[HashedBackupCode],
    ) -> anyhow::Result<bool>;

    /// コード一式を削除
    async fn delete(&self, account_id: Uuid) -> anyhow::Result<()>;
}
