//! One-time code issuance and validation.
//!
//! A code moves through `NoCode -> Live -> {Consumed, Expired}`. Issuing always produces a new
//! live code and discards whatever the subject held before, so a subject never has more than
//! one live code. Expiry is evaluated lazily, when a code is validated; nothing sweeps the
//! store in the background.
//!
//! Codes are held in an [`OtpStore`] owned by the caller's session (see
//! [`crate::session::Session`]). The [`OtpManager`] itself is stateless apart from its TTL and
//! clock, so one manager can serve every session.

use crate::clock::{Clock, SystemClock};
use crate::constants::OTP_CODE_LEN;
use crate::error::OtpError;
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::fmt;

/// A six-digit code in its canonical fixed-width string form.
///
/// Codes are always compared as strings, so `"007123"` and `"7123"` are different codes.
#[derive(Clone, PartialEq, Eq)]
pub struct OtpCode(String);

impl OtpCode {
    /// Draws a code uniformly from `100000..=999999`.
    ///
    /// Leading-zero codes are never generated, which keeps codes issued here interchangeable
    /// with ones users may have received from older deployments.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let n: u32 = rng.gen_range(100_000..=999_999);
        Self(format!("{n:0width$}", width = OTP_CODE_LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn matches(&self, submitted: &str) -> bool {
        self.0 == submitted
    }
}

impl fmt::Display for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Keep codes out of `{:?}` output in logs.
impl fmt::Debug for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OtpCode(******)")
    }
}

/// A live code and its validity window.
#[derive(Clone, Debug)]
pub struct OtpRecord {
    code: OtpCode,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl OtpRecord {
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// A code is still valid at exactly `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Pending codes keyed by subject identity.
///
/// A consumed or expired code is removed, so every record present here is either live or
/// expired-but-not-yet-checked.
#[derive(Debug, Default)]
pub struct OtpStore {
    codes: HashMap<String, OtpRecord>,
}

impl OtpStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self, subject: &str) -> Option<&OtpRecord> {
        self.codes.get(subject.trim())
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn clear(&mut self) {
        self.codes.clear();
    }
}

/// Issues and validates one-time codes against a caller-owned [`OtpStore`].
#[derive(Clone, Debug)]
pub struct OtpManager<C = SystemClock> {
    ttl: Duration,
    clock: C,
}

impl OtpManager<SystemClock> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<C: Clock> OtpManager<C> {
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self { ttl, clock }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a fresh code for `subject`, replacing any code it already held.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] if `subject` is blank.
    pub fn issue(&self, store: &mut OtpStore, subject: &str) -> CoreResult<OtpCode> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(CoreError::InvalidInput(
                "one-time code subject cannot be empty".into(),
            ));
        }

        let code = OtpCode::generate(&mut rand::thread_rng());
        let issued_at = self.clock.now();
        let record = OtpRecord {
            code: code.clone(),
            issued_at,
            expires_at: issued_at + self.ttl,
        };

        if store.codes.insert(subject.to_owned(), record).is_some() {
            tracing::debug!("replaced pending one-time code for {}", subject);
        }
        tracing::info!(
            "issued one-time code for {} (valid {}s)",
            subject,
            self.ttl.num_seconds()
        );

        Ok(code)
    }

    /// Checks `submitted` against the code held for `subject`.
    ///
    /// On success the code is consumed. An expired code is discarded as it is reported, so
    /// the next attempt sees [`OtpError::NotFound`]. A mismatch leaves the code live.
    pub fn validate(
        &self,
        store: &mut OtpStore,
        subject: &str,
        submitted: &str,
    ) -> Result<(), OtpError> {
        let subject = subject.trim();
        let record = store.codes.get(subject).ok_or(OtpError::NotFound)?;

        if record.is_expired_at(self.clock.now()) {
            store.codes.remove(subject);
            tracing::info!("one-time code for {} expired", subject);
            return Err(OtpError::Expired);
        }

        if !record.code.matches(submitted.trim()) {
            tracing::warn!("one-time code mismatch for {}", subject);
            return Err(OtpError::Mismatch);
        }

        store.codes.remove(subject);
        tracing::info!("one-time code for {} verified", subject);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn manager(ttl_secs: i64) -> (OtpManager<ManualClock>, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap());
        (
            OtpManager::with_clock(Duration::seconds(ttl_secs), clock.clone()),
            clock,
        )
    }

    /// Any six-digit string that differs from `code`.
    fn other_code(code: &OtpCode) -> String {
        if code.as_str() == "123456" {
            "654321".into()
        } else {
            "123456".into()
        }
    }

    #[test]
    fn test_generated_codes_are_six_digits_without_leading_zero() {
        let mut rng = rand::thread_rng();
        for _ in 0..1_000 {
            let code = OtpCode::generate(&mut rng);
            assert_eq!(code.as_str().len(), 6);
            assert!(code.as_str().bytes().all(|b| b.is_ascii_digit()));
            assert_ne!(code.as_str().as_bytes()[0], b'0');
        }
    }

    #[test]
    fn test_validate_correct_code_succeeds_exactly_once() {
        let (manager, _clock) = manager(300);
        let mut store = OtpStore::new();

        let code = manager.issue(&mut store, "alice@example.com").unwrap();
        assert_eq!(
            manager.validate(&mut store, "alice@example.com", code.as_str()),
            Ok(())
        );
        assert_eq!(
            manager.validate(&mut store, "alice@example.com", code.as_str()),
            Err(OtpError::NotFound)
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_validate_before_issue_is_not_found() {
        let (manager, _clock) = manager(300);
        let mut store = OtpStore::new();

        assert_eq!(
            manager.validate(&mut store, "bob", "123456"),
            Err(OtpError::NotFound)
        );
    }

    #[test]
    fn test_expired_code_is_reported_then_discarded() {
        let (manager, clock) = manager(300);
        let mut store = OtpStore::new();

        let code = manager.issue(&mut store, "carol").unwrap();
        clock.advance(Duration::seconds(301));

        assert_eq!(
            manager.validate(&mut store, "carol", code.as_str()),
            Err(OtpError::Expired)
        );
        assert_eq!(
            manager.validate(&mut store, "carol", code.as_str()),
            Err(OtpError::NotFound)
        );
    }

    #[test]
    fn test_code_is_valid_at_exact_expiry_instant() {
        let (manager, clock) = manager(600);
        let mut store = OtpStore::new();

        let code = manager.issue(&mut store, "dave").unwrap();
        clock.advance(Duration::seconds(600));

        assert_eq!(manager.validate(&mut store, "dave", code.as_str()), Ok(()));
    }

    #[test]
    fn test_mismatch_keeps_code_live() {
        let (manager, _clock) = manager(300);
        let mut store = OtpStore::new();

        let code = manager.issue(&mut store, "erin").unwrap();
        assert_eq!(
            manager.validate(&mut store, "erin", &other_code(&code)),
            Err(OtpError::Mismatch)
        );
        assert_eq!(manager.validate(&mut store, "erin", code.as_str()), Ok(()));
    }

    #[test]
    fn test_comparison_is_string_not_numeric() {
        let (manager, _clock) = manager(300);
        let mut store = OtpStore::new();

        let code = manager.issue(&mut store, "frank").unwrap();
        let padded = format!("0{}", code.as_str());

        assert_eq!(
            manager.validate(&mut store, "frank", &padded),
            Err(OtpError::Mismatch)
        );
    }

    #[test]
    fn test_submitted_code_is_trimmed() {
        let (manager, _clock) = manager(300);
        let mut store = OtpStore::new();

        let code = manager.issue(&mut store, "gina").unwrap();
        let submitted = format!("  {}\n", code.as_str());
        assert_eq!(manager.validate(&mut store, "gina", &submitted), Ok(()));
    }

    #[test]
    fn test_reissue_invalidates_previous_code() {
        let (manager, _clock) = manager(300);
        let mut store = OtpStore::new();

        let first = manager.issue(&mut store, "harry").unwrap();
        let second = manager.issue(&mut store, "harry").unwrap();
        assert_eq!(store.len(), 1);

        if first != second {
            assert_eq!(
                manager.validate(&mut store, "harry", first.as_str()),
                Err(OtpError::Mismatch)
            );
        }
        assert_eq!(manager.validate(&mut store, "harry", second.as_str()), Ok(()));
        assert_eq!(
            manager.validate(&mut store, "harry", first.as_str()),
            Err(OtpError::NotFound)
        );
    }

    #[test]
    fn test_reissue_after_expiry_returns_to_live() {
        let (manager, clock) = manager(300);
        let mut store = OtpStore::new();

        manager.issue(&mut store, "ivy").unwrap();
        clock.advance(Duration::seconds(400));
        let fresh = manager.issue(&mut store, "ivy").unwrap();

        assert_eq!(manager.validate(&mut store, "ivy", fresh.as_str()), Ok(()));
    }

    #[test]
    fn test_subjects_do_not_interfere() {
        let (manager, _clock) = manager(300);
        let mut store = OtpStore::new();

        let a = manager.issue(&mut store, "a@example.com").unwrap();
        let b = manager.issue(&mut store, "b@example.com").unwrap();

        assert_eq!(manager.validate(&mut store, "a@example.com", a.as_str()), Ok(()));
        assert!(store.pending("b@example.com").is_some());
        assert_eq!(manager.validate(&mut store, "b@example.com", b.as_str()), Ok(()));
    }

    #[test]
    fn test_issue_records_absolute_expiry() {
        let (manager, clock) = manager(600);
        let mut store = OtpStore::new();

        manager.issue(&mut store, "jack").unwrap();
        let record = store.pending("jack").unwrap();
        assert_eq!(record.issued_at(), clock.now());
        assert_eq!(record.expires_at(), clock.now() + Duration::seconds(600));
    }

    #[test]
    fn test_issue_rejects_blank_subject() {
        let (manager, _clock) = manager(300);
        let mut store = OtpStore::new();

        let err = manager.issue(&mut store, "   ").unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_expired_then_reissued_end_to_end() {
        let (manager, clock) = manager(300);
        let mut store = OtpStore::new();

        manager.issue(&mut store, "alice@example.com").unwrap();
        clock.advance(Duration::seconds(301));
        assert_eq!(
            manager.validate(&mut store, "alice@example.com", "123456"),
            Err(OtpError::Expired)
        );

        let code = manager.issue(&mut store, "alice@example.com").unwrap();
        clock.advance(Duration::seconds(60));
        assert_eq!(
            manager.validate(&mut store, "alice@example.com", code.as_str()),
            Ok(())
        );
    }

    #[test]
    fn test_debug_does_not_reveal_code() {
        let code = OtpCode::generate(&mut rand::thread_rng());
        assert!(!format!("{code:?}").contains(code.as_str()));
    }
}
