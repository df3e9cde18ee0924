use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// アカウントの二要素認証（TOTP）シークレット
///
/// シークレットは AES-256-GCM で暗号化されて保存される
/// 平文シークレットはログに出力禁止
#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorSecret {
    pub account_id: Uuid,
    #[serde(skip)]
    pub secret_encrypted: Vec<u8>,
    pub enabled: bool,
    pub enabled_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TwoFactorSecret {
    /// 未確認（enabled = false）のシークレットを作成
    pub fn pending(account_id: Uuid, secret_encrypted: Vec<u8>, now: OffsetDateTime) -> Self {
        Self {
            account_id,
            secret_encrypted,
            enabled: false,
            enabled_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
