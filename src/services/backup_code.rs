use std::collections::HashSet;

use data_encoding::{HEXLOWER, HEXUPPER};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::models::HashedBackupCode;

/// コードの乱数長（4バイト = 大文字16進数8文字）
const BACKUP_CODE_BYTES: usize = 4;
/// ソルト長（16バイト）
const SALT_BYTES: usize = 16;

/// バックアップコードサービス
///
/// # Security
/// - 平文コードは生成時に一度だけ呼び出し側へ返し、保存しない
/// - 保存するのはソルト付きSHA-256ハッシュのみ。
///   シード暗号化（AES-256-GCM）とはアルゴリズムも鍵素材も共有しない
/// - ハッシュ照合は定数時間比較
#[derive(Clone, Default)]
pub struct BackupCodeService;

impl BackupCodeService {
    pub fn new() -> Self {
        Self
    }

    /// n枚のバックアップコードを生成
    ///
    /// 各コードは独立な乱数から作る8文字の大文字16進数。
    /// 同一バッチ内で重複した場合は引き直す
    pub fn generate(&self, n: usize) -> Vec<String> {
        let mut codes = Vec::with_capacity(n);
        let mut seen = HashSet::new();

        while codes.len() < n {
            let mut bytes = [0u8; BACKUP_CODE_BYTES];
            OsRng.fill_bytes(&mut bytes);
            let code = HEXUPPER.encode(&bytes);
            if seen.insert(code.clone()) {
                codes.push(code);
            }
        }

        codes
    }

    /// コードをソルト付きSHA-256でハッシュ化
    ///
    /// ソルトはコードごとに独立した16バイトの乱数
    pub fn hash(&self, code: &str) -> HashedBackupCode {
        let mut salt = [0u8; SALT_BYTES];
        OsRng.fill_bytes(&mut salt);
        let salt_hex = HEXLOWER.encode(&salt);
        let digest = Self::digest_with_salt(&salt_hex, code);

        HashedBackupCode {
            salt: salt_hex,
            digest,
        }
    }

    /// 候補コードを照合し、一致した1枚を除いた残りを返す
    ///
    /// # Note
    /// - 候補は照合前に正規化（トリム＋大文字化）する
    /// - 一致しなければ (false, 入力そのまま) を返す
    /// - 空集合は常に不一致
    pub fn verify(
        &self,
        codes: &[HashedBackupCode],
        candidate: &str,
    ) -> (bool, Vec<HashedBackupCode>) {
        let normalized = candidate.trim().to_uppercase();

        let mut matched_index = None;
        for (i, stored) in codes.iter().enumerate() {
            let digest = Self::digest_with_salt(&stored.salt, &normalized);
            // 一致が見つかっても全件を比較し続ける（処理時間を揃える）
            if bool::from(digest.as_bytes().ct_eq(stored.digest.as_bytes()))
                && matched_index.is_none()
            {
                matched_index = Some(i);
            }
        }

        match matched_index {
            Some(i) => {
                let mut remaining = codes.to_vec();
                remaining.remove(i);
                (true, remaining)
            }
            None => (false, codes.to_vec()),
        }
    }

    /// ソルトと結合してSHA-256ハッシュを計算
    fn digest_with_salt(salt_hex: &str, code: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt_hex.as_bytes());
        hasher.update(code.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_count_and_format() {
        let service = BackupCodeService::new();
        let codes = service.generate(10);

        assert_eq!(codes.len(), 10);
        for code in &codes {
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn test_generate_pairwise_distinct() {
        let service = BackupCodeService::new();
        let codes = service.generate(10);
        let unique: HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_generate_batches_differ() {
        let service = BackupCodeService::new();
        // 2回の生成が完全一致する確率は無視できる
        assert_ne!(service.generate(10), service.generate(10));
    }

    #[test]
    fn test_hash_then_verify_consumes_one() {
        let service = BackupCodeService::new();
        let codes = service.generate(5);
        let hashed: Vec<_> = codes.iter().map(|c| service.hash(c)).collect();

        let (valid, remaining) = service.verify(&hashed, &codes[2]);
        assert!(valid);
        assert_eq!(remaining.len(), 4);
        // 使用済みコードは残りに含まれない
        let (valid_again, _) = service.verify(&remaining, &codes[2]);
        assert!(!valid_again);
    }

    #[test]
    fn test_verify_is_case_insensitive() {
        let service = BackupCodeService::new();
        let hashed = vec![service.hash("AAAA1111")];

        let (valid, remaining) = service.verify(&hashed, "aaaa1111");
        assert!(valid);
        assert!(remaining.is_empty());
    }

    #[test]
    fn test_verify_trims_whitespace() {
        let service = BackupCodeService::new();
        let hashed = vec![service.hash("AAAA1111")];

        let (valid, _) = service.verify(&hashed, "  AAAA1111  ");
        assert!(valid);
    }

    #[test]
    fn test_verify_no_match_leaves_set_unchanged() {
        let service = BackupCodeService::new();
        let codes = service.generate(3);
        let hashed: Vec<_> = codes.iter().map(|c| service.hash(c)).collect();

        let (valid, remaining) = service.verify(&hashed, "00000000");
        assert!(!valid);
        assert_eq!(remaining, hashed);
    }

    #[test]
    fn test_verify_empty_set() {
        let service = BackupCodeService::new();
        let (valid, remaining) = service.verify(&[], "AAAA1111");
        assert!(!valid);
        assert!(remaining.is_empty());
    }

    #[test]
    fn test_sequential_exhaustion() {
        let service = BackupCodeService::new();
        let codes = service.generate(5);
        let mut hashed: Vec<_> = codes.iter().map(|c| service.hash(c)).collect();

        for code in &codes {
            let (valid, remaining) = service.verify(&hashed, code);
            assert!(valid);
            hashed = remaining;
        }
        assert!(hashed.is_empty());

        // 使い切った後は全コードが不一致
        for code in &codes {
            let (valid, _) = service.verify(&hashed, code);
            assert!(!valid);
        }
    }

    #[test]
    fn test_hash_uses_independent_salts() {
        let service = BackupCodeService::new();
        let a = service.hash("AAAA1111");
        let b = service.hash("AAAA1111");

        // 同じコードでもソルトが異なればハッシュも異なる
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.digest, b.digest);
    }
}
