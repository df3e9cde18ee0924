pub mod backup_code;
pub mod challenge;
pub mod memory;
pub mod two_factor_secret;

pub use backup_code::BackupCodeRepository;
pub use challenge::ChallengeRepository;
pub use memory::{
    InMemoryBackupCodeRepository, InMemoryChallengeRepository, InMemoryTwoFactorSecretRepository,
};
pub use two_factor_secret::TwoFactorSecretRepository;
