//! Cron-driven scheduled applications.
//!
//! A [`ScheduledApplication`] binds a [`Task`](crate::Task) to a cron
//! expression. `start` spawns a timer loop that sleeps until the next fire
//! time and runs the task in a detached tokio task; `stop` cancels the loop
//! without touching runs already in flight.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::{Application, BoxTask, Clock, TaskError};

/// What to do when a tick fires while the previous run is still executing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverlapPolicy {
    #[default]
    Skip,
    Allow,
}

impl FromStr for OverlapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "allow" => Ok(Self::Allow),
            other => Err(format!("unknown overlap policy '{other}', expected 'skip' or 'allow'")),
        }
    }
}

/// Convert a 5-field Unix expression to the 6/7-field format of the `cron` crate.
fn normalize_expression(expression: &str) -> String {
    if expression.split_whitespace().count() == 5 {
        format!("0 {}", expression.trim())
    } else {
        expression.trim().to_string()
    }
}

pub fn parse_schedule(expression: &str) -> Result<Schedule, TaskError> {
    Schedule::from_str(&normalize_expression(expression))
        .map_err(|e| TaskError::InvalidSchedule(format!("'{expression}': {e}")))
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ScheduledApplication {
    name: String,
    expression: String,
    task: BoxTask,
    overlap: OverlapPolicy,
    clock: Arc<dyn Clock>,
    running: Mutex<Option<Running>>,
    in_flight: Arc<AtomicBool>,
}

impl ScheduledApplication {
    /// The expression is validated on [`Application::start`], not here.
    pub fn new(
        name: impl Into<String>,
        expression: impl Into<String>,
        task: BoxTask,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            task,
            overlap: OverlapPolicy::default(),
            clock,
            running: Mutex::new(None),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_overlap(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

#[async_trait]
impl Application for ScheduledApplication {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), TaskError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!(application = %self.name, "Already running, start ignored");
            return Ok(());
        }

        let schedule = parse_schedule(&self.expression)?;
        if schedule.after(&self.clock.now()).next().is_none() {
            return Err(TaskError::InvalidSchedule(format!(
                "'{}' has no upcoming fire time",
                self.expression
            )));
        }

        info!(
            application = %self.name,
            schedule = %self.expression,
            "Starting application with cron schedule"
        );

        let cancel = CancellationToken::new();
        let ticker = Ticker {
            application: self.name.clone(),
            schedule,
            task: self.task.clone(),
            clock: self.clock.clone(),
            overlap: self.overlap,
            in_flight: self.in_flight.clone(),
        };
        let handle = tokio::spawn(ticker.run(cancel.clone()));

        *running = Some(Running { cancel, handle });
        Ok(())
    }

    async fn stop(&self) -> Result<bool, TaskError> {
        let Some(Running { cancel, handle }) = self.running.lock().await.take() else {
            debug!(application = %self.name, "Not running, stop ignored");
            return Ok(false);
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            error!(application = %self.name, error = %e, "Timer loop ended abnormally");
        }

        info!(application = %self.name, "Application stopped");
        Ok(true)
    }
}

impl Drop for ScheduledApplication {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

struct Ticker {
    application: String,
    schedule: Schedule,
    task: BoxTask,
    clock: Arc<dyn Clock>,
    overlap: OverlapPolicy,
    in_flight: Arc<AtomicBool>,
}

impl Ticker {
    async fn run(self, cancel: CancellationToken) {
        let mut previous: Option<DateTime<Utc>> = None;

        loop {
            let now = self.clock.now();
            // A fire never repeats even if the clock lags the timer slightly.
            let from = previous.map_or(now, |p| p.max(now));
            let Some(next) = self.schedule.after(&from).next() else {
                warn!(application = %self.application, "Schedule has no upcoming fire time");
                break;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {
                    previous = Some(next);
                    self.fire(next);
                }
            }
        }

        debug!(application = %self.application, "Timer loop exited");
    }

    fn fire(&self, at: DateTime<Utc>) {
        let guard = match self.overlap {
            OverlapPolicy::Skip => {
                if self.in_flight.swap(true, Ordering::SeqCst) {
                    warn!(
                        application = %self.application,
                        fire_time = %at,
                        "Previous run still executing, tick skipped"
                    );
                    return;
                }
                Some(InFlightGuard(self.in_flight.clone()))
            }
            OverlapPolicy::Allow => None,
        };

        let task = self.task.clone();
        let application = self.application.clone();
        let span = info_span!("task", name = %task.name(), fire_time = %at);

        tokio::spawn(
            async move {
                let _guard = guard;
                match task.run().await {
                    Ok(true) => debug!(application = %application, "Scheduled run succeeded"),
                    Ok(false) => warn!(application = %application, "Scheduled run reported failure"),
                    Err(e) => error!(application = %application, error = %e, "Scheduled run failed"),
                }
            }
            .instrument(span),
        );
    }
}

struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
