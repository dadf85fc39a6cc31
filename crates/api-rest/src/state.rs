use oncobloom_core::entries::EntryService;
use oncobloom_core::notify::{LogNotifier, Notifier};
use oncobloom_core::password_reset::PasswordResetService;
use oncobloom_core::patients::PatientService;
use oncobloom_core::users::UserService;
use oncobloom_core::{CoreConfig, CoreResult, Database, OtpManager, SessionRegistry};
use std::sync::Arc;

/// Application state for the REST API server
///
/// Contains shared state that needs to be accessible to all request handlers. Every service
/// shares the one database handle.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<CoreConfig>,
    pub db: Database,
    pub sessions: SessionRegistry,
    pub users: UserService,
    pub patients: PatientService,
    pub entries: EntryService,
    pub resets: PasswordResetService,
}

impl AppState {
    pub fn new(cfg: Arc<CoreConfig>, db: Database, notifier: Arc<dyn Notifier>) -> Self {
        let users = UserService::new(db.clone());
        Self {
            sessions: SessionRegistry::new(cfg.session_lifetime()),
            patients: PatientService::new(db.clone(), cfg.clone()),
            entries: EntryService::new(db.clone()),
            resets: PasswordResetService::new(
                users.clone(),
                OtpManager::new(cfg.otp_ttl()),
                notifier,
            ),
            users,
            db,
            cfg,
        }
    }

    /// Opens the configured database and logs reset codes instead of mailing them. Codes are
    /// only written out in development mode.
    pub fn open(cfg: Arc<CoreConfig>) -> CoreResult<Self> {
        let db = Database::open(cfg.database_path())?;
        let notifier = Arc::new(LogNotifier::new(cfg.dev_mode()));
        Ok(Self::new(cfg, db, notifier))
    }
}
