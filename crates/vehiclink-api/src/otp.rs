use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::auth::AppState;

/// Wrong guesses allowed before an entry is thrown away.
pub const MAX_ATTEMPTS: u32 = 5;

const RANDOM_CODE_DIGITS: u32 = 6;

/// Where codes come from. Delivery is out of scope, so codes are only logged.
#[derive(Debug, Clone)]
pub enum CodeSource {
    /// Every request gets the same demo code.
    Fixed(String),
    /// A fresh zero-padded six-digit code per request.
    Random,
}

impl CodeSource {
    fn generate(&self) -> String {
        match self {
            Self::Fixed(code) => code.clone(),
            Self::Random => {
                let n = rand::rng().random_range(0..10u32.pow(RANDOM_CODE_DIGITS));
                format!("{:0width$}", n, width = RANDOM_CODE_DIGITS as usize)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpCheck {
    Verified,
    Mismatch,
    Expired,
    Missing,
}

struct OtpEntry {
    code: String,
    expires_at: Instant,
    failed_attempts: u32,
}

/// In-memory email → code map with per-entry expiry.
pub struct OtpStore {
    entries: Mutex<HashMap<String, OtpEntry>>,
    ttl: Duration,
    source: CodeSource,
}

impl OtpStore {
    pub fn new(source: CodeSource, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            source,
        }
    }

    /// Issue a code for `email`, replacing any earlier one.
    pub fn issue(&self, email: &str) -> Result<String> {
        let expires_at = Instant::now()
            .checked_add(self.ttl)
            .ok_or_else(|| anyhow!("OTP lifetime of {:?} is out of range", self.ttl))?;
        let code = self.source.generate();
        let entry = OtpEntry {
            code: code.clone(),
            expires_at,
            failed_attempts: 0,
        };

        self.lock()?.insert(email.to_string(), entry);
        Ok(code)
    }

    /// Check a submitted code. The entry is consumed on success, on expiry and
    /// once [`MAX_ATTEMPTS`] wrong guesses have been made.
    pub fn verify(&self, email: &str, code: &str) -> Result<OtpCheck> {
        let mut entries = self.lock()?;

        let Some(entry) = entries.get_mut(email) else {
            return Ok(OtpCheck::Missing);
        };

        if Instant::now() >= entry.expires_at {
            entries.remove(email);
            return Ok(OtpCheck::Expired);
        }

        if entry.code != code {
            entry.failed_attempts += 1;
            if entry.failed_attempts >= MAX_ATTEMPTS {
                warn!("Too many wrong codes for {}, discarding entry", email);
                entries.remove(email);
            }
            return Ok(OtpCheck::Mismatch);
        }

        entries.remove(email);
        Ok(OtpCheck::Verified)
    }

    /// Drop every expired entry and return how many were removed.
    pub fn prune_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok(before - entries.len())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, OtpEntry>>> {
        self.entries
            .lock()
            .map_err(|e| anyhow!("OTP store lock poisoned: {}", e))
    }
}

/// Background task that prunes expired codes.
pub async fn run_cleanup_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match state.otp.prune_expired() {
            Ok(count) => {
                if count > 0 {
                    info!("OTP cleanup: pruned {} expired codes", count);
                } else {
                    debug!("OTP cleanup: nothing to prune");
                }
            }
            Err(e) => {
                warn!("OTP cleanup error: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_store(ttl: Duration) -> OtpStore {
        OtpStore::new(CodeSource::Fixed("123456".into()), ttl)
    }

    #[test]
    fn verified_code_is_consumed() {
        let store = demo_store(Duration::from_secs(60));
        assert_eq!(store.issue("a@b.c").unwrap(), "123456");

        assert_eq!(store.verify("a@b.c", "123456").unwrap(), OtpCheck::Verified);
        assert_eq!(store.verify("a@b.c", "123456").unwrap(), OtpCheck::Missing);
    }

    #[test]
    fn wrong_code_keeps_entry_until_attempts_run_out() {
        let store = demo_store(Duration::from_secs(60));
        store.issue("a@b.c").unwrap();

        for _ in 0..MAX_ATTEMPTS - 1 {
            assert_eq!(store.verify("a@b.c", "000000").unwrap(), OtpCheck::Mismatch);
        }
        assert_eq!(store.verify("a@b.c", "123456").unwrap(), OtpCheck::Verified);

        store.issue("a@b.c").unwrap();
        for _ in 0..MAX_ATTEMPTS {
            assert_eq!(store.verify("a@b.c", "000000").unwrap(), OtpCheck::Mismatch);
        }
        assert_eq!(store.verify("a@b.c", "123456").unwrap(), OtpCheck::Missing);
    }

    #[test]
    fn expired_code_is_rejected_and_removed() {
        let store = demo_store(Duration::ZERO);
        store.issue("a@b.c").unwrap();

        assert_eq!(store.verify("a@b.c", "123456").unwrap(), OtpCheck::Expired);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn reissue_resets_attempts() {
        let store = demo_store(Duration::from_secs(60));
        store.issue("a@b.c").unwrap();
        for _ in 0..MAX_ATTEMPTS - 1 {
            store.verify("a@b.c", "000000").unwrap();
        }

        store.issue("a@b.c").unwrap();
        for _ in 0..MAX_ATTEMPTS - 1 {
            store.verify("a@b.c", "000000").unwrap();
        }
        assert_eq!(store.verify("a@b.c", "123456").unwrap(), OtpCheck::Verified);
    }

    #[test]
    fn prune_only_removes_expired_entries() {
        let expired = demo_store(Duration::ZERO);
        expired.issue("a@b.c").unwrap();
        expired.issue("d@e.f").unwrap();
        assert_eq!(expired.prune_expired().unwrap(), 2);

        let live = demo_store(Duration::from_secs(60));
        live.issue("a@b.c").unwrap();
        assert_eq!(live.prune_expired().unwrap(), 0);
        assert_eq!(live.len().unwrap(), 1);
    }

    #[test]
    fn oversized_ttl_is_an_error_not_a_panic() {
        let store = demo_store(Duration::from_secs(u64::MAX));
        assert!(store.issue("a@b.c").is_err());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn random_codes_are_six_digits() {
        let store = OtpStore::new(CodeSource::Random, Duration::from_secs(60));
        for _ in 0..20 {
            let code = store.issue("a@b.c").unwrap();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
