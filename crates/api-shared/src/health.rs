use crate::dto::HealthRes;

/// Simple health service shared by the HTTP surfaces.
///
/// This service provides a standardised way to report the health status of Oncobloom. The
/// caller performs the store round-trip and passes in the result.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Builds the health response for the given store state.
    ///
    /// # Returns
    /// A `HealthRes` that is `ok` only when the store answered.
    pub fn check_health(store_ok: bool) -> HealthRes {
        HealthRes {
            ok: store_ok,
            message: if store_ok {
                "Oncobloom is alive".into()
            } else {
                "Oncobloom is running but the database is unavailable".into()
            },
            database: if store_ok { "connected" } else { "unavailable" }.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_reflects_store() {
        let up = HealthService::check_health(true);
        assert!(up.ok);
        assert_eq!(up.database, "connected");

        let down = HealthService::check_health(false);
        assert!(!down.ok);
        assert_eq!(down.database, "unavailable");
    }
}
