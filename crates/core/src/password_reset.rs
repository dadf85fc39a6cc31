//! Password reset by one-time code.
//!
//! The flow spans three requests within one session: `request` issues a code and hands it to
//! the notifier, `verify` checks the code the user typed, and `complete` stores the new
//! password. Progress is kept on the [`Session`], so a code issued in one session cannot be
//! redeemed from another.

use crate::clock::{Clock, SystemClock};
use crate::error::OtpError;
use crate::notify::Notifier;
use crate::otp::{OtpManager, OtpRecord};
use crate::session::{PendingReset, Session};
use crate::users::UserService;
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Outcome of a reset request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResetRequested {
    /// False when the notifier failed. The code is still live.
    pub code_delivered: bool,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PasswordResetService<C = SystemClock> {
    users: UserService,
    otp: OtpManager<C>,
    notifier: Arc<dyn Notifier>,
}

impl<C: Clock> PasswordResetService<C> {
    pub fn new(users: UserService, otp: OtpManager<C>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            users,
            otp,
            notifier,
        }
    }

    /// Starts a reset for the account identified by e-mail or username.
    ///
    /// Any earlier reset progress in the session is discarded. A delivery failure is reported
    /// through [`ResetRequested::code_delivered`]; it does not withdraw the code.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if no account matches `identity`.
    pub fn request(&self, session: &mut Session, identity: &str) -> CoreResult<ResetRequested> {
        let user = self
            .users
            .find_by_identity(identity)?
            .ok_or(CoreError::NotFound("user"))?;

        session.clear_reset();
        let code = self.otp.issue(&mut session.otp, &user.email)?;
        let expires_at = session
            .otp
            .pending(&user.email)
            .map(OtpRecord::expires_at)
            .ok_or(OtpError::NotFound)?;
        session.pending_reset = Some(PendingReset {
            user_id: user.id,
            subject: user.email.clone(),
        });

        let code_delivered = match self.notifier.send_otp(&user.email, &code, self.otp.ttl()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("failed to deliver reset code to {}: {}", user.email, e);
                false
            }
        };

        Ok(ResetRequested {
            code_delivered,
            expires_at,
        })
    }

    /// Checks the submitted code against the one issued in this session.
    ///
    /// # Errors
    ///
    /// `CoreError::Otp` with `NotFound` when no reset is pending, `Expired` when the code is
    /// too old, and `Mismatch` when it is wrong. A mismatch leaves the code usable.
    pub fn verify(&self, session: &mut Session, code: &str) -> CoreResult<()> {
        let pending = session
            .pending_reset
            .clone()
            .ok_or(OtpError::NotFound)?;

        self.otp.validate(&mut session.otp, &pending.subject, code)?;

        session.pending_reset = None;
        session.reset_user = Some(pending.user_id);
        Ok(())
    }

    /// Sets the new password once the code has been verified.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Unauthenticated` if no code has been verified in this session, and
    /// `CoreError::InvalidInput` if the password is too short or the confirmation differs (the
    /// session stays verified so the user can try again).
    pub fn complete(&self, session: &mut Session, password: &str, confirm: &str) -> CoreResult<()> {
        let user_id = session.reset_user.ok_or(CoreError::Unauthenticated)?;
        self.users.set_password(user_id, password, confirm)?;
        session.clear_reset();
        tracing::info!("password reset completed for user id {}", user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notify::NotifyError;
    use crate::otp::OtpCode;
    use crate::session::SessionRegistry;
    use crate::store::Database;
    use crate::users::Registration;
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Keeps every code it is asked to send, optionally failing afterwards.
    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl Outbox {
        fn last_code(&self) -> String {
            let sent = self.sent.lock().unwrap();
            sent.last().expect("a code should have been sent").1.clone()
        }
    }

    impl Notifier for Outbox {
        fn send_otp(
            &self,
            recipient: &str,
            code: &OtpCode,
            _ttl: Duration,
        ) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_owned(), code.as_str().to_owned()));
            if self.fail {
                Err(NotifyError::Failed("mail server unreachable".into()))
            } else {
                Ok(())
            }
        }
    }

    struct Fixture {
        resets: PasswordResetService<ManualClock>,
        users: UserService,
        outbox: Arc<Outbox>,
        clock: ManualClock,
        sessions: SessionRegistry<ManualClock>,
        session: Uuid,
    }

    fn fixture(fail_delivery: bool) -> Fixture {
        let users = UserService::new(Database::open_in_memory().unwrap());
        users
            .register(&Registration {
                username: "alice",
                email: "alice@example.com",
                full_name: None,
                password: "secret1",
                confirm_password: "secret1",
            })
            .unwrap();

        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap());
        let outbox = Arc::new(Outbox {
            fail: fail_delivery,
            ..Default::default()
        });
        let resets = PasswordResetService::new(
            users.clone(),
            OtpManager::with_clock(Duration::seconds(300), clock.clone()),
            outbox.clone(),
        );
        let sessions = SessionRegistry::with_clock(Duration::hours(1), clock.clone());
        let session = sessions.create();

        Fixture {
            resets,
            users,
            outbox,
            clock,
            sessions,
            session,
        }
    }

    impl Fixture {
        fn run<T>(
            &self,
            f: impl FnOnce(&PasswordResetService<ManualClock>, &mut Session) -> CoreResult<T>,
        ) -> CoreResult<T> {
            self.sessions
                .with_session(self.session, |s| f(&self.resets, s))
        }
    }

    #[test]
    fn test_full_reset_flow() {
        let fx = fixture(false);

        let requested = fx.run(|r, s| r.request(s, "Alice@Example.com")).unwrap();
        assert!(requested.code_delivered);
        assert_eq!(
            requested.expires_at,
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 5, 0).unwrap()
        );

        let code = fx.outbox.last_code();
        fx.run(|r, s| r.verify(s, &code)).unwrap();
        fx.run(|r, s| r.complete(s, "newpass1", "newpass1")).unwrap();

        assert!(fx.users.authenticate("alice", "newpass1").is_ok());
        assert!(fx.users.authenticate("alice", "secret1").is_err());

        let again = fx.run(|r, s| r.complete(s, "other12", "other12"));
        assert!(matches!(again, Err(CoreError::Unauthenticated)));
    }

    #[test]
    fn test_request_by_username() {
        let fx = fixture(false);
        fx.run(|r, s| r.request(s, "alice")).unwrap();
        assert_eq!(fx.outbox.sent.lock().unwrap()[0].0, "alice@example.com");
    }

    #[test]
    fn test_unknown_identity() {
        let fx = fixture(false);
        let err = fx.run(|r, s| r.request(s, "nobody@example.com")).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        assert!(fx.outbox.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_verify_without_request() {
        let fx = fixture(false);
        let err = fx.run(|r, s| r.verify(s, "123456")).unwrap_err();
        assert!(matches!(err, CoreError::Otp(OtpError::NotFound)));
    }

    #[test]
    fn test_expired_code_then_fresh_code() {
        let fx = fixture(false);
        fx.run(|r, s| r.request(s, "alice@example.com")).unwrap();
        let stale = fx.outbox.last_code();

        fx.clock.advance(Duration::seconds(301));
        let err = fx.run(|r, s| r.verify(s, &stale)).unwrap_err();
        assert!(matches!(err, CoreError::Otp(OtpError::Expired)));
        let err = fx.run(|r, s| r.verify(s, &stale)).unwrap_err();
        assert!(matches!(err, CoreError::Otp(OtpError::NotFound)));

        fx.run(|r, s| r.request(s, "alice@example.com")).unwrap();
        let fresh = fx.outbox.last_code();
        fx.run(|r, s| r.verify(s, &fresh)).unwrap();
    }

    #[test]
    fn test_reissue_invalidates_first_code() {
        let fx = fixture(false);
        fx.run(|r, s| r.request(s, "alice")).unwrap();
        let first = fx.outbox.last_code();
        fx.run(|r, s| r.request(s, "alice")).unwrap();
        let second = fx.outbox.last_code();

        if first != second {
            let err = fx.run(|r, s| r.verify(s, &first)).unwrap_err();
            assert!(matches!(err, CoreError::Otp(OtpError::Mismatch)));
        }
        fx.run(|r, s| r.verify(s, &second)).unwrap();
    }

    #[test]
    fn test_mismatch_keeps_code_live() {
        let fx = fixture(false);
        fx.run(|r, s| r.request(s, "alice")).unwrap();
        let code = fx.outbox.last_code();
        let wrong = if code == "123456" { "654321" } else { "123456" };

        let err = fx.run(|r, s| r.verify(s, wrong)).unwrap_err();
        assert!(matches!(err, CoreError::Otp(OtpError::Mismatch)));
        fx.run(|r, s| r.verify(s, &code)).unwrap();
    }

    #[test]
    fn test_delivery_failure_keeps_code() {
        let fx = fixture(true);
        let requested = fx.run(|r, s| r.request(s, "alice")).unwrap();
        assert!(!requested.code_delivered);

        let code = fx.outbox.last_code();
        fx.run(|r, s| r.verify(s, &code)).unwrap();
    }

    #[test]
    fn test_bad_new_password_keeps_verification() {
        let fx = fixture(false);
        fx.run(|r, s| r.request(s, "alice")).unwrap();
        let code = fx.outbox.last_code();
        fx.run(|r, s| r.verify(s, &code)).unwrap();

        let err = fx.run(|r, s| r.complete(s, "abc", "abc")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
        fx.run(|r, s| r.complete(s, "newpass1", "newpass1")).unwrap();
    }

    #[test]
    fn test_code_cannot_be_redeemed_from_another_session() {
        let fx = fixture(false);
        fx.run(|r, s| r.request(s, "alice")).unwrap();
        let code = fx.outbox.last_code();

        let other = fx.sessions.create();
        let err = fx
            .sessions
            .with_session(other, |s| fx.resets.verify(s, &code))
            .unwrap_err();
        assert!(matches!(err, CoreError::Otp(OtpError::NotFound)));
    }
}
