use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// 二要素認証チャレンジ
///
/// 一次認証（パスワード）成功から二要素確認までの短命なサーバー側レコード。
/// token_hash はトークンの SHA-256 ハッシュ（平文トークンは保存禁止）
#[derive(Debug, Clone, Serialize)]
pub struct Challenge {
    pub token_hash: String,
    pub account_id: Uuid,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub consumed_at: Option<OffsetDateTime>,
    pub attempt_count: i32,
}

impl Challenge {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }
}
