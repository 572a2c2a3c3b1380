//! Cron-driven GC runs.
//!
//! The schedule expression is re-read from its [`ScheduleSource`] before
//! every run, so the interval can change without restarting the node.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::{info, warn};

use crate::config::GcConfig;
use crate::coordinator::{FleetGc, GcReport};
use crate::error::{GcError, GcResult};

/// Where the current cron expression comes from.
pub trait ScheduleSource: Send + Sync {
    fn schedule_expression(&self) -> GcResult<String>;
}

/// A fixed expression.
#[derive(Clone, Debug)]
pub struct StaticSchedule(pub String);

impl ScheduleSource for StaticSchedule {
    fn schedule_expression(&self) -> GcResult<String> {
        Ok(self.0.clone())
    }
}

impl ScheduleSource for GcConfig {
    fn schedule_expression(&self) -> GcResult<String> {
        Ok(self.schedule.clone())
    }
}

/// Parse a cron expression with a seconds field.
pub fn parse_schedule(expression: &str) -> GcResult<Schedule> {
    Schedule::from_str(expression).map_err(|e| GcError::InvalidSchedule {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

struct ActiveSchedule {
    expression: String,
    schedule: Schedule,
}

/// Runs a [`FleetGc`] on a cron schedule.
pub struct GcScheduler {
    gc: Arc<FleetGc>,
    source: Arc<dyn ScheduleSource>,
    dry_run: bool,
    active: Option<ActiveSchedule>,
}

impl GcScheduler {
    pub fn new(gc: Arc<FleetGc>, source: Arc<dyn ScheduleSource>, dry_run: bool) -> Self {
        Self {
            gc,
            source,
            dry_run,
            active: None,
        }
    }

    /// The expression currently in force, if any has been loaded.
    pub fn expression(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.expression.as_str())
    }

    /// Reload the expression from the source.
    ///
    /// A source error or an unparsable expression keeps the previous
    /// schedule; it is only an error when there is no previous schedule.
    pub fn refresh(&mut self) -> GcResult<&Schedule> {
        let loaded = self
            .source
            .schedule_expression()
            .and_then(|expression| parse_schedule(&expression).map(|s| (expression, s)));

        match loaded {
            Ok((expression, schedule)) => {
                let changed = self.expression() != Some(expression.as_str());
                if changed {
                    info!(schedule = %expression, "gc schedule loaded");
                    self.active = Some(ActiveSchedule {
                        expression,
                        schedule,
                    });
                }
            }
            Err(e) => match &self.active {
                Some(active) => {
                    warn!(error = %e, schedule = %active.expression, "keeping previous gc schedule");
                }
                None => return Err(e),
            },
        }

        self.active
            .as_ref()
            .map(|a| &a.schedule)
            .ok_or_else(|| GcError::InvalidSchedule {
                expression: String::new(),
                reason: "no schedule configured".to_string(),
            })
    }

    /// The next time a run is due.
    pub fn next_run(&mut self) -> GcResult<DateTime<Utc>> {
        let next = self.refresh()?.upcoming(Utc).next();
        next.ok_or_else(|| GcError::InvalidSchedule {
            expression: self.expression().unwrap_or_default().to_string(),
            reason: "no upcoming run".to_string(),
        })
    }

    /// Run once now.
    pub async fn run_once(&mut self) -> GcResult<GcReport> {
        if let Err(e) = self.refresh() {
            warn!(error = %e, "gc schedule unavailable");
        }
        self.gc.run(self.dry_run).await
    }

    /// Run on schedule until `shutdown` resolves.
    ///
    /// A failed run is logged and the next one is scheduled as usual.
    pub async fn run_until<F>(mut self, shutdown: F) -> GcResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let next = self.next_run()?;
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            info!(next = %next, "next gc run scheduled");
            tokio::select! {
                _ = &mut shutdown => {
                    info!("gc scheduler shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(wait) => {}
            }
            match self.gc.run(self.dry_run).await {
                Ok(report) => info!(
                    deleted = report.deleted(),
                    skipped = report.skipped.len(),
                    "scheduled gc run complete"
                ),
                Err(e) => warn!(error = %e, "scheduled gc run failed"),
            }
        }
    }
}

impl std::fmt::Debug for GcScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcScheduler")
            .field("expression", &self.expression())
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HiveRegistry;
    use std::sync::Mutex;

    struct Swappable(Mutex<String>);

    impl Swappable {
        fn set(&self, expression: &str) {
            *self.0.lock().unwrap() = expression.to_string();
        }
    }

    impl ScheduleSource for Swappable {
        fn schedule_expression(&self) -> GcResult<String> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    fn fleet() -> Arc<FleetGc> {
        Arc::new(FleetGc::new(Arc::new(HiveRegistry::new()), Duration::from_secs(1)))
    }

    #[test]
    fn parses_seven_field_expressions() {
        assert!(parse_schedule("0 0 3 * * * *").is_ok());
        assert!(parse_schedule("0 */5 * * * *").is_ok());
        assert!(matches!(
            parse_schedule("not cron"),
            Err(GcError::InvalidSchedule { .. })
        ));
    }

    #[test]
    fn schedule_changes_are_picked_up() {
        let source = Arc::new(Swappable(Mutex::new("0 0 3 * * * *".into())));
        let mut scheduler = GcScheduler::new(fleet(), source.clone(), true);
        scheduler.refresh().unwrap();
        assert_eq!(scheduler.expression(), Some("0 0 3 * * * *"));

        source.set("0 30 * * * *");
        scheduler.refresh().unwrap();
        assert_eq!(scheduler.expression(), Some("0 30 * * * *"));
    }

    #[test]
    fn invalid_expression_keeps_previous() {
        let source = Arc::new(Swappable(Mutex::new("0 0 3 * * * *".into())));
        let mut scheduler = GcScheduler::new(fleet(), source.clone(), true);
        scheduler.refresh().unwrap();

        source.set("every tuesday");
        assert!(scheduler.refresh().is_ok());
        assert_eq!(scheduler.expression(), Some("0 0 3 * * * *"));
    }

    #[test]
    fn invalid_first_expression_is_an_error() {
        let mut scheduler = GcScheduler::new(
            fleet(),
            Arc::new(StaticSchedule("every tuesday".into())),
            true,
        );
        assert!(scheduler.refresh().is_err());
        assert!(scheduler.next_run().is_err());
    }

    #[test]
    fn next_run_is_in_the_future() {
        let mut scheduler = GcScheduler::new(fleet(), Arc::new(GcConfig::default()), true);
        let next = scheduler.next_run().unwrap();
        assert!(next > Utc::now());
    }

    #[tokio::test]
    async fn run_once_runs_the_fleet() {
        let mut scheduler = GcScheduler::new(fleet(), Arc::new(GcConfig::default()), true);
        let report = scheduler.run_once().await.unwrap();
        assert!(report.dry_run);
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let scheduler = GcScheduler::new(fleet(), Arc::new(GcConfig::default()), true);
        scheduler.run_until(async {}).await.unwrap();
    }
}
