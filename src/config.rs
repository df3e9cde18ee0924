use secrecy::SecretBox;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    // 2FA (TOTP) 設定
    /// TOTP発行者名（認証アプリに表示される）
    pub totp_issuer: String,
    /// AES-256暗号化キー（Base64エンコード、32バイト）
    pub encryption_key: SecretBox<String>,

    // チャレンジ設定
    /// チャレンジの有効期間（秒）
    #[serde(default = "default_challenge_ttl_secs")]
    pub challenge_ttl_secs: i64,
    /// チャレンジごとのコード試行回数上限
    #[serde(default = "default_challenge_max_attempts")]
    pub challenge_max_attempts: i32,

    // バックアップコード設定
    /// 一度に発行するバックアップコードの枚数
    #[serde(default = "default_backup_code_count")]
    pub backup_code_count: usize,
}

const DEFAULT_CHALLENGE_TTL_SECS: i64 = 600;
const DEFAULT_CHALLENGE_MAX_ATTEMPTS: i32 = 5;
const DEFAULT_BACKUP_CODE_COUNT: usize = 10;

fn default_challenge_ttl_secs() -> i64 {
    DEFAULT_CHALLENGE_TTL_SECS
}

fn default_challenge_max_attempts() -> i32 {
    DEFAULT_CHALLENGE_MAX_ATTEMPTS
}

fn default_backup_code_count() -> usize {
    DEFAULT_BACKUP_CODE_COUNT
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}
