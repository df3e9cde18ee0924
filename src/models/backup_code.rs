use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// ハッシュ化されたバックアップコード
///
/// salt は16バイトのランダム値、digest は SHA-256(salt || code)。
/// いずれも16進文字列。平文コードは保存禁止
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashedBackupCode {
    pub salt: String,
    pub digest: String,
}

/// アカウントのバックアップコード一式
///
/// enabled = true のアカウントにのみ存在する。
/// version は条件付き更新（CAS）用の世代番号で、リポジトリ実装が採番する
#[derive(Debug, Clone, Serialize)]
pub struct BackupCodeSet {
    pub account_id: Uuid,
    pub codes: Vec<HashedBackupCode>,
    pub version: u64,
    pub created_at: OffsetDateTime,
}

impl BackupCodeSet {
    /// 未使用コードの残数
    pub fn remaining(&self) -> usize {
        self.codes.len()
    }
}
