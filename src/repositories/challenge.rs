use async_trait::async_trait;
use time::OffsetDateTime;

use crate::models::Challenge;

/// 二要素認証チャレンジの永続化コントラクト
///
/// increment_attempts と consume はアトミックであること。
/// 有効期限の判定は呼び出し側（サービス層）で行う
#[async_trait]
pub trait ChallengeRepository: Send + Sync {
    /// 新しいチャレンジを保存
    async fn insert(&self, challenge: &Challenge) -> anyhow::Result<()>;

    /// トークンハッシュでチャレンジを検索
    async fn find_by_token_hash(&self, token_hash: &str) -> anyhow::Result<Option<Challenge>>;

    /// 試行回数をアトミックにインクリメント
    ///
    /// # Returns
    /// 更新後の試行回数。チャレンジが存在しない場合は None
    async fn increment_attempts(&self, token_hash: &str) -> anyhow::Result<Option<i32>>;

    /// 未消費から消費済みへの条件付き遷移
    ///
    /// # Returns
    /// 遷移に成功した（レースに勝った）呼び出しのみ true。
    /// 既に消費済み、または存在しない場合は false
    async fn consume(&self, token_hash: &str, consumed_at: OffsetDateTime) -> anyhow::Result<bool>;

    /// 期限切れチャレンジを削除
    ///
    /// # Returns
    /// 削除された件数
    async fn delete_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64>;
}
