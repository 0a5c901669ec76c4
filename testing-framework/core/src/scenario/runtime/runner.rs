use std::{
    any::Any,
    collections::HashMap,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use futures::FutureExt as _;
use rand::thread_rng;
use thiserror::Error;
use tokio::{
    sync::watch,
    task::JoinSet,
    time::{sleep, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    gate::ReadinessGate,
    scenario::{
        DynError, TaskDispatcher, TaskTableError, UserId, UserState, VirtualUser, WaitBetween,
    },
};

const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RunError {
    #[error("bootstrap failed: {0}")]
    Bootstrap(#[source] DynError),
    #[error(transparent)]
    TaskTable(#[from] TaskTableError),
}

#[derive(Clone, Copy, Debug)]
pub struct RunnerConfig {
    pub run_duration: Duration,
    /// Users started per second; non-positive starts everyone at once.
    pub spawn_rate: f64,
    pub wait_between: WaitBetween,
    /// How long users may finish their current task after the stop signal.
    pub stop_grace: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            run_duration: Duration::from_secs(60),
            spawn_rate: 1.0,
            wait_between: WaitBetween::default(),
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

#[derive(Default)]
struct RunStats {
    spawned: AtomicUsize,
    registering: AtomicUsize,
    registered: AtomicUsize,
    abandoned: AtomicUsize,
    tasks_succeeded: AtomicUsize,
    tasks_failed: AtomicUsize,
}

impl RunStats {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub spawned: usize,
    /// Users that entered registration (the readiness gate let them through).
    pub registering: usize,
    pub registered: usize,
    pub abandoned: usize,
    pub tasks_succeeded: usize,
    pub tasks_failed: usize,
    pub elapsed: Duration,
}

/// Spawns virtual users, gates them on bootstrap, and drives them for the
/// configured duration.
pub struct Runner<C> {
    config: RunnerConfig,
    gate: Arc<ReadinessGate<Arc<C>>>,
    stats: Arc<RunStats>,
    users: JoinSet<()>,
    stop: watch::Sender<bool>,
    next_user_id: UserId,
}

impl<C: Send + Sync + 'static> Runner<C> {
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            config,
            gate: Arc::new(ReadinessGate::new()),
            stats: Arc::new(RunStats::default()),
            users: JoinSet::new(),
            stop,
            next_user_id: 0,
        }
    }

    #[must_use]
    pub fn gate(&self) -> Arc<ReadinessGate<Arc<C>>> {
        Arc::clone(&self.gate)
    }

    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            spawned: self.stats.spawned.load(Ordering::Relaxed),
            registering: self.stats.registering.load(Ordering::Relaxed),
            registered: self.stats.registered.load(Ordering::Relaxed),
            abandoned: self.stats.abandoned.load(Ordering::Relaxed),
            tasks_succeeded: self.stats.tasks_succeeded.load(Ordering::Relaxed),
            tasks_failed: self.stats.tasks_failed.load(Ordering::Relaxed),
            elapsed: Duration::ZERO,
        }
    }

    /// Spawns `count` users of kind `U`, staggered by the spawn rate. They
    /// stay in [`UserState::Created`] until the gate opens.
    pub fn spawn_users<U>(
        &mut self,
        count: usize,
        overrides: &HashMap<String, u32>,
    ) -> Result<(), TaskTableError>
    where
        U: VirtualUser<Context = C>,
    {
        if count == 0 {
            return Ok(());
        }
        let dispatcher = Arc::new(
            U::tasks()
                .with_overrides(U::kind(), overrides)
                .dispatcher(U::kind())?,
        );
        info!(kind = U::kind(), count, "spawning users");

        for _ in 0..count {
            let id = self.next_user_id;
            let offset = self.spawn_offset(id);
            self.next_user_id += 1;

            let gate = Arc::clone(&self.gate);
            let stats = Arc::clone(&self.stats);
            let dispatcher = Arc::clone(&dispatcher);
            let stop = self.stop.subscribe();
            let pacing = self.config.wait_between;

            self.users.spawn(async move {
                let outcome = AssertUnwindSafe(run_user::<U>(
                    id, offset, gate, stats, dispatcher, pacing, stop,
                ))
                .catch_unwind()
                .await;
                if let Err(panic) = outcome {
                    warn!(kind = U::kind(), user = id, "user panicked: {}", panic_message(panic));
                }
            });
        }
        Ok(())
    }

    fn spawn_offset(&self, id: UserId) -> Duration {
        let rate = self.config.spawn_rate;
        if rate.is_finite() && rate > 0.0 {
            Duration::try_from_secs_f64(id as f64 / rate).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    }

    /// Runs bootstrap, opens the gate with its result and drives the users.
    /// A bootstrap error stops every user before any registration starts.
    pub async fn run<F, E>(mut self, bootstrap: F) -> Result<RunSummary, RunError>
    where
        F: Future<Output = Result<C, E>>,
        E: Into<DynError>,
    {
        let started = Instant::now();
        let context = match bootstrap.await {
            Ok(context) => Arc::new(context),
            Err(err) => {
                let err = err.into();
                warn!(error = %err, "bootstrap failed, stopping users");
                Self::drain_users(&mut self.users).await;
                return Err(RunError::Bootstrap(err));
            }
        };

        if self.gate.open(context).is_err() {
            warn!("readiness gate was already open");
        }
        info!(
            users = self.users.len(),
            duration = ?self.config.run_duration,
            "bootstrap complete, users released"
        );

        let finished_early = Self::drive_until_timer(&mut self.users, self.config.run_duration).await;
        if !finished_early {
            self.stop.send_replace(true);
            Self::drive_until_timer(&mut self.users, self.config.stop_grace).await;
        }
        Self::drain_users(&mut self.users).await;

        let summary = RunSummary {
            elapsed: started.elapsed(),
            ..self.summary()
        };
        info!(?summary, "run finished");
        Ok(summary)
    }

    /// Joins users until `duration` elapses. Returns true when every user
    /// finished before the deadline.
    async fn drive_until_timer(users: &mut JoinSet<()>, duration: Duration) -> bool {
        let run_future = async {
            while let Some(result) = users.join_next().await {
                Self::log_join_result(result);
            }
        };
        timeout(duration, run_future).await.is_ok()
    }

    async fn drain_users(users: &mut JoinSet<()>) {
        users.abort_all();
        while let Some(result) = users.join_next().await {
            Self::log_join_result(result);
        }
    }

    fn log_join_result(result: Result<(), tokio::task::JoinError>) {
        match result {
            Ok(()) => {}
            Err(join_err) if join_err.is_cancelled() => {}
            Err(join_err) => warn!("user task failed: {join_err}"),
        }
    }
}

async fn run_user<U: VirtualUser>(
    id: UserId,
    offset: Duration,
    gate: Arc<ReadinessGate<Arc<U::Context>>>,
    stats: Arc<RunStats>,
    dispatcher: Arc<TaskDispatcher<U>>,
    pacing: WaitBetween,
    mut stop: watch::Receiver<bool>,
) {
    let kind = U::kind();
    sleep(offset).await;
    RunStats::bump(&stats.spawned);
    debug!(kind, user = id, state = ?UserState::Created, "user spawned");

    let context = gate.wait().await;
    RunStats::bump(&stats.registering);
    debug!(kind, user = id, state = ?UserState::Registering, "user registering");

    let mut user = match U::on_start(id, context).await {
        Ok(user) => user,
        Err(err) => {
            RunStats::bump(&stats.abandoned);
            warn!(kind, user = id, error = %err, "registration failed, abandoning user");
            return;
        }
    };
    RunStats::bump(&stats.registered);
    debug!(kind, user = id, state = ?UserState::Active, "user active");

    while !stop_requested(&stop) {
        let task = dispatcher.pick(&mut thread_rng());
        match task.run(&mut user).await {
            Ok(()) => RunStats::bump(&stats.tasks_succeeded),
            Err(err) => {
                RunStats::bump(&stats.tasks_failed);
                debug!(kind, user = id, task = task.name(), error = %err, "task failed");
            }
        }

        tokio::select! {
            () = pacing.wait() => {}
            _ = stop.changed() => break,
        }
    }
    debug!(kind, user = id, state = ?UserState::Stopped, "user stopped");
}

fn stop_requested(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow()
}

/// Attempts to turn a panic payload into a readable string for diagnostics.
fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic.downcast::<String>().map_or_else(
        |panic| {
            panic.downcast::<&'static str>().map_or_else(
                |_| "unknown panic".to_owned(),
                |message| (*message).to_owned(),
            )
        },
        |message| *message,
    )
}
