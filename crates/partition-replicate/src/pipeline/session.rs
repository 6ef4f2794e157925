//! Connection-scoped session configuration.

use tracing::{debug, warn};

use crate::core::traits::{Connection, Dialect, SessionStep};
use crate::error::{ReplicateError, Result};

/// Applies the dialect's session settings to a freshly opened connection.
///
/// Steps run in [`SessionStep::ORDER`]; steps the dialect has no statement
/// for are skipped, and the full-scan step only runs when requested.
pub struct SessionConfigurer<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> SessionConfigurer<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    /// Statements that `configure` would run, in order.
    pub fn statements(&self, for_full_scan: bool) -> Vec<(SessionStep, String)> {
        SessionStep::ORDER
            .iter()
            .filter(|step| for_full_scan || **step != SessionStep::FullScan)
            .filter_map(|step| {
                self.dialect
                    .session_statement(*step)
                    .map(|sql| (*step, sql))
            })
            .collect()
    }

    /// Apply every session step, stopping at the first failure.
    ///
    /// Returns the number of statements applied.
    pub async fn configure(
        &self,
        connection: &mut dyn Connection,
        for_full_scan: bool,
    ) -> Result<usize> {
        let steps = self.statements(for_full_scan);
        let role = connection.role();

        for (applied, (step, sql)) in steps.iter().enumerate() {
            if let Err(e) = connection.execute(sql).await {
                warn!(
                    "{} session setup stopped at {} after {} of {} statements",
                    role,
                    step.name(),
                    applied,
                    steps.len()
                );
                return Err(ReplicateError::SessionConfig(format!(
                    "{} ({}): {}",
                    step.name(),
                    sql,
                    e
                )));
            }
        }

        debug!(
            "{} session configured ({} statements, full scan: {})",
            role,
            steps.len(),
            for_full_scan
        );
        Ok(steps.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::ConnectionFactory;
    use crate::core::ConnectionRole;
    use crate::drivers::{MssqlDialect, PostgresDialect};
    use crate::error::ErrorKind;
    use crate::testing::{Event, Failures, MockDatabase};

    #[tokio::test]
    async fn test_applies_steps_in_order() {
        let db = MockDatabase::default();
        let dialect = PostgresDialect::new();
        let mut conn = db.open(ConnectionRole::Source).await.unwrap();

        let applied = SessionConfigurer::new(&dialect)
            .configure(conn.as_mut(), true)
            .await
            .unwrap();
        assert_eq!(applied, 4);

        let executed: Vec<String> = db
            .events_for(1)
            .into_iter()
            .filter_map(|e| match e {
                Event::Execute(sql) => Some(sql),
                _ => None,
            })
            .collect();
        assert_eq!(
            executed,
            vec![
                "SET lc_numeric TO 'C'".to_string(),
                "SET DateStyle TO 'ISO, YMD'".to_string(),
                "SET TimeZone TO 'UTC'".to_string(),
                "SET enable_indexscan TO off; SET enable_bitmapscan TO off".to_string(),
            ]
        );
    }

    #[test]
    fn test_full_scan_step_only_when_requested() {
        let dialect = PostgresDialect::new();
        let configurer = SessionConfigurer::new(&dialect);
        let without: Vec<SessionStep> = configurer
            .statements(false)
            .into_iter()
            .map(|(s, _)| s)
            .collect();
        assert_eq!(
            without,
            vec![
                SessionStep::NumericFormat,
                SessionStep::DateFormat,
                SessionStep::TimestampFormat
            ]
        );
        assert_eq!(configurer.statements(true).len(), 4);
    }

    #[test]
    fn test_missing_steps_are_skipped() {
        let dialect = MssqlDialect::new();
        let steps = SessionConfigurer::new(&dialect).statements(true);
        assert_eq!(
            steps,
            vec![
                (SessionStep::NumericFormat, "SET LANGUAGE us_english".to_string()),
                (SessionStep::DateFormat, "SET DATEFORMAT ymd".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_step_fails_the_call() {
        let db = MockDatabase::default();
        db.set_failures(Failures {
            execute_containing: Some("DateStyle".into()),
            ..Default::default()
        });
        let dialect = PostgresDialect::new();
        let mut conn = db.open(ConnectionRole::Sink).await.unwrap();

        let err = SessionConfigurer::new(&dialect)
            .configure(conn.as_mut(), false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);

        // Nothing after the failed step runs
        let executed = db
            .events_for(1)
            .into_iter()
            .filter(|e| matches!(e, Event::Execute(_)))
            .count();
        assert_eq!(executed, 2);
    }
}
