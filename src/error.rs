/// MFAエンジンのエラー型
///
/// 全ての公開オペレーションはこの型付き結果を返す。
/// エラーメッセージにシークレットや「2FA設定有無」のシグナルを含めない。
#[derive(Debug, thiserror::Error)]
pub enum MfaError {
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("二要素認証が設定されていません")]
    NotConfigured,

    #[error("二要素認証は既に有効です")]
    AlreadyEnabled,

    #[error("二要素認証が有効化されていません")]
    NotEnabled,

    #[error("認証コードが正しくありません")]
    IncorrectCode,

    #[error("無効または期限切れのチャレンジです")]
    ChallengeExpired,

    #[error("試行回数の上限に達しました")]
    TooManyAttempts,

    #[error("パスワードの確認に失敗しました")]
    Unauthorized,

    #[error("競合する更新により処理を完了できませんでした")]
    RaceConditionConflict,

    #[error("シークレットの復号に失敗しました")]
    DecryptionFailed,

    #[error("ストレージエラー")]
    Storage(#[source] anyhow::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),
}

impl MfaError {
    /// ストレージ層のエラーをラップ
    pub fn storage(err: anyhow::Error) -> Self {
        Self::Storage(err)
    }
}
