use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{BackupCodeSet, Challenge, HashedBackupCode, TwoFactorSecret};
use crate::repositories::{BackupCodeRepository, ChallengeRepository, TwoFactorSecretRepository};

/// 二要素認証シークレットのインメモリ実装
///
/// 開発・テスト用。再起動で消えるため本番には不向き。
/// Clone は状態を共有する（コネクションプールと同じ扱い）
#[derive(Clone, Default)]
pub struct InMemoryTwoFactorSecretRepository {
    secrets: Arc<RwLock<HashMap<Uuid, TwoFactorSecret>>>,
}

impl InMemoryTwoFactorSecretRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TwoFactorSecretRepository for InMemoryTwoFactorSecretRepository {
    async fn find_by_account_id(
        &self,
        account_id: Uuid,
    ) -> anyhow::Result<Option<TwoFactorSecret>> {
        Ok(self.secrets.read().await.get(&account_id).cloned())
    }

    async fn save(&self, secret: &TwoFactorSecret) -> anyhow::Result<()> {
        self.secrets
            .write()
            .await
            .insert(secret.account_id, secret.clone());
        Ok(())
    }

    async fn delete(&self, account_id: Uuid) -> anyhow::Result<()> {
        self.secrets.write().await.remove(&account_id);
        Ok(())
    }
}

/// 世代番号付きで保持する内部レコード
struct StoredCodeSet {
    version: u64,
    codes: Vec<HashedBackupCode>,
    created_at: OffsetDateTime,
}

/// バックアップコードのインメモリ実装
///
/// update_if_version は書き込みロック内で世代を照合するため、
/// 同一コードを使う並行リクエストは必ず一方だけが勝つ
#[derive(Clone, Default)]
pub struct InMemoryBackupCodeRepository {
    sets: Arc<RwLock<HashMap<Uuid, StoredCodeSet>>>,
}

impl InMemoryBackupCodeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BackupCodeRepository for InMemoryBackupCodeRepository {
    async fn find_by_account_id(&self, account_id: Uuid) -> anyhow::Result<Option<BackupCodeSet>> {
        Ok(self.sets.read().await.get(&account_id).map(|stored| {
            BackupCodeSet {
                account_id,
                codes: stored.codes.clone(),
                version: stored.version,
                created_at: stored.created_at,
            }
        }))
    }

    async fn replace(&self, account_id: Uuid, codes: &[HashedBackupCode]) -> anyhow::Result<()> {
        let mut sets = self.sets.write().await;
        let next_version = sets.get(&account_id).map_or(1, |s| s.version + 1);
        sets.insert(
            account_id,
            StoredCodeSet {
                version: next_version,
                codes: codes.to_vec(),
                created_at: OffsetDateTime::now_utc(),
            },
        );
        Ok(())
    }

    async fn update_if_version(
        &self,
        account_id: Uuid,
        expected_version: u64,
        codes: &[HashedBackupCode],
    ) -> anyhow::Result<bool> {
        let mut sets = self.sets.write().await;
        match sets.get_mut(&account_id) {
            Some(stored) if stored.version == expected_version => {
                stored.version += 1;
                stored.codes = codes.to_vec();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, account_id: Uuid) -> anyhow::Result<()> {
        self.sets.write().await.remove(&account_id);
        Ok(())
    }
}

/// チャレンジのインメモリ実装
///
/// consume / increment_attempts は書き込みロック内で完結するためアトミック
#[derive(Clone, Default)]
pub struct InMemoryChallengeRepository {
    challenges: Arc<RwLock<HashMap<String, Challenge>>>,
}

impl InMemoryChallengeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChallengeRepository for InMemoryChallengeRepository {
    async fn insert(&self, challenge: &Challenge) -> anyhow::Result<()> {
        self.challenges
            .write()
            .await
            .insert(challenge.token_hash.clone(), challenge.clone());
        Ok(())
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> anyhow::Result<Option<Challenge>> {
        Ok(self.challenges.read().await.get(token_hash).cloned())
    }

    async fn increment_attempts(&self, token_hash: &str) -> anyhow::Result<Option<i32>> {
        let mut challenges = self.challenges.write().await;
        Ok(challenges.get_mut(token_hash).map(|challenge| {
            challenge.attempt_count += 1;
            challenge.attempt_count
        }))
    }

    async fn consume(&self, token_hash: &str, consumed_at: OffsetDateTime) -> anyhow::Result<bool> {
        let mut challenges = self.challenges.write().await;
        match challenges.get_mut(token_hash) {
            Some(challenge) if challenge.consumed_at.is_none() => {
                challenge.consumed_at = Some(consumed_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let mut challenges = self.challenges.write().await;
        let before = challenges.len();
        challenges.retain(|_, challenge| !challenge.is_expired(now));
        Ok((before - challenges.len()) as u64)
    }
}
