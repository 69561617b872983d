use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::Local;
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::actions::{UiActions, UserActions};
use crate::app::config::BotConfig;
use crate::app::error::AppError;
use crate::app::gestures::{HumanInput, Pacing};
use crate::app::models::{ProgressEvent, RunSummary};
use crate::app::shell::ShellExecutor;
use crate::app::state::SessionState;

/// Counters for one run. Owned and mutated exclusively by the cycle-runner
/// worker; everyone else sees snapshots through progress events.
#[derive(Debug, Default)]
pub struct RunState {
    pub total_users: u32,
    pub completed_users: u32,
    pub total_likes: u32,
    pub current_cycle: u32,
    pub users_since_restart: u32,
    pub app_restarts: u32,
}

pub struct RunHandle {
    running: Arc<AtomicBool>,
    join: JoinHandle<RunSummary>,
    trace_id: String,
}

impl RunHandle {
    /// Cooperative stop; the worker exits at the next user/cycle boundary.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn join(self) -> Option<RunSummary> {
        self.join.join().ok()
    }
}

/// Validates the configuration, claims the session's running flag and spawns
/// the single cycle-runner worker. No shell command is issued before
/// validation passes.
pub fn start_run(
    config: BotConfig,
    session: &SessionState,
    events: SyncSender<ProgressEvent>,
) -> Result<RunHandle, AppError> {
    let shell: Arc<dyn ShellExecutor> = Arc::new(crate::app::shell::SuShell::default());
    start_run_with(config, session, events, shell, Pacing::default())
}

pub fn start_run_with(
    config: BotConfig,
    session: &SessionState,
    events: SyncSender<ProgressEvent>,
    shell: Arc<dyn ShellExecutor>,
    pacing: Pacing,
) -> Result<RunHandle, AppError> {
    let trace_id = Uuid::new_v4().to_string();
    let user_ids = config.validate_for_run(&trace_id)?;

    if !session.try_begin_run() {
        return Err(AppError::validation("A run is already active", &trace_id));
    }
    let running = session.running_flag();

    let input = HumanInput::new(Arc::clone(&shell), pacing, trace_id.clone());
    let actions = UiActions::new(
        shell,
        input,
        config.coordinates.clone(),
        config.target.clone(),
        trace_id.clone(),
    );

    let worker = CycleWorker {
        actions: Box::new(actions),
        user_ids,
        cycle_count: config.cycle_count,
        delay_min: config.delay_min,
        delay_max: config.delay_max,
        enable_app_restart: config.enable_app_restart,
        app_restart_interval: config.app_restart_interval,
        running: Arc::clone(&running),
        events,
        pacing,
        state: RunState::default(),
        trace_id: trace_id.clone(),
    };

    info!(trace_id = %trace_id, users = worker.user_ids.len(), cycles = worker.cycle_count, "starting run");
    let join = std::thread::spawn(move || worker.run());
    Ok(RunHandle {
        running,
        join,
        trace_id,
    })
}

pub(crate) struct CycleWorker {
    pub(crate) actions: Box<dyn UserActions>,
    pub(crate) user_ids: Vec<String>,
    pub(crate) cycle_count: u32,
    pub(crate) delay_min: f64,
    pub(crate) delay_max: f64,
    pub(crate) enable_app_restart: bool,
    pub(crate) app_restart_interval: u32,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) events: SyncSender<ProgressEvent>,
    pub(crate) pacing: Pacing,
    pub(crate) state: RunState,
    pub(crate) trace_id: String,
}

impl CycleWorker {
    pub(crate) fn run(mut self) -> RunSummary {
        self.state.total_users = self.user_ids.len() as u32;
        self.status("Starting like run".to_string());

        'cycles: for cycle in 1..=self.cycle_count {
            if !self.is_running() {
                break;
            }
            self.state.current_cycle = cycle;
            self.emit(ProgressEvent::CycleStarted {
                cycle,
                cycle_count: self.cycle_count,
            });
            self.log(format!("Cycle {cycle}/{} started", self.cycle_count));
            self.emit_progress();

            let last_index = self.user_ids.len() - 1;
            let user_ids = self.user_ids.clone();
            for (index, user_id) in user_ids.iter().enumerate() {
                if !self.is_running() {
                    break 'cycles;
                }
                self.process_user(user_id);
                if index < last_index {
                    // Wider than the per-gesture delays; spaces users apart.
                    self.sleep_uniform(self.delay_min * 1.5, self.delay_max * 2.0);
                }
            }

            if cycle < self.cycle_count && self.is_running() {
                self.log(format!(
                    "Cycle {cycle} done, resting {:.0}s before the next one",
                    self.pacing.cycle_rest
                ));
                self.pacing.sleep_secs(self.pacing.cycle_rest);
            }
        }

        let cancelled = !self.is_running();
        let summary = RunSummary {
            cycles_run: self.state.current_cycle,
            completed_users: self.state.completed_users,
            expected_likes: self.state.total_users * self.cycle_count,
            total_likes: self.state.total_likes,
            app_restarts: self.state.app_restarts,
            cancelled,
        };
        if cancelled {
            self.status("Run cancelled".to_string());
        } else {
            self.status(format!(
                "All cycles finished: expected {} likes, placed {}",
                summary.expected_likes, summary.total_likes
            ));
        }
        self.emit(ProgressEvent::Finished(summary.clone()));
        // Release the session; a new run may start.
        self.running.store(false, Ordering::SeqCst);
        summary
    }

    /// One user, error-contained at every stage. Whatever happens in
    /// search/profile/like, the restart-and-count tail still runs.
    fn process_user(&mut self, user_id: &str) {
        self.status(format!("Processing user {user_id}"));

        match self.actions.search_user(user_id) {
            Ok(()) => match self.actions.enter_user_profile() {
                Ok(()) => match self.actions.like_latest_work() {
                    Ok(likes) => {
                        self.state.total_likes += likes;
                        self.log(format!("Liked {likes} newest post of {user_id}"));
                    }
                    Err(err) => {
                        warn!(trace_id = %self.trace_id, user_id, error = %err, "like failed");
                        self.log(format!("Could not like newest post of {user_id}"));
                    }
                },
                Err(err) => {
                    warn!(trace_id = %self.trace_id, user_id, error = %err, "profile entry failed");
                    self.log(format!("Could not open profile of {user_id}"));
                }
            },
            Err(err) => {
                warn!(trace_id = %self.trace_id, user_id, error = %err, "search failed");
                self.log(format!("Could not search user {user_id}"));
            }
        }

        self.state.users_since_restart += 1;
        if self.enable_app_restart
            && self.is_running()
            && self.state.users_since_restart >= self.app_restart_interval
        {
            self.log(format!("Restarting app after {user_id}"));
            self.actions.restart_app();
            self.state.app_restarts += 1;
            self.state.users_since_restart = 0;
        }

        self.state.completed_users += 1;
        self.emit_progress();
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn sleep_uniform(&self, min: f64, max: f64) {
        let duration = if min < max {
            rand::thread_rng().gen_range(min..max)
        } else {
            min
        };
        self.pacing.sleep_secs(duration);
    }

    /// Events are best effort: a full or disconnected channel never stalls
    /// the worker.
    fn emit(&self, event: ProgressEvent) {
        let _ = self.events.try_send(event);
    }

    fn emit_progress(&self) {
        let restart_countdown = if self.enable_app_restart {
            self.app_restart_interval
                .saturating_sub(self.state.users_since_restart)
        } else {
            0
        };
        self.emit(ProgressEvent::Progress {
            completed_users: self.state.completed_users,
            total_users: self.state.total_users,
            total_likes: self.state.total_likes,
            current_cycle: self.state.current_cycle,
            restart_countdown,
        });
    }

    fn status(&self, message: String) {
        info!(trace_id = %self.trace_id, "{message}");
        self.emit(ProgressEvent::Status {
            message: message.clone(),
        });
        self.emit_log(message);
    }

    fn log(&self, message: String) {
        info!(trace_id = %self.trace_id, "{message}");
        self.emit_log(message);
    }

    fn emit_log(&self, message: String) {
        self.emit(ProgressEvent::Log {
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            message,
        });
    }
}
