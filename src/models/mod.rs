pub mod backup_code;
pub mod challenge;
pub mod two_factor_secret;

pub use backup_code::{BackupCodeSet, HashedBackupCode};
pub use challenge::Challenge;
pub use two_factor_secret::TwoFactorSecret;
