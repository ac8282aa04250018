//! The control task that owns the process-wide [`TimerEngine`].
//!
//! One tokio task owns the engine and drives two independent cadences:
//!
//! - the **logic tick** (default 1 s) is the only thing that detects
//!   completion. It exists exactly while the engine is running and is never
//!   tied to a view.
//! - the **visual tick** (default 50 ms) publishes [`Progress`] to attached
//!   views. It exists exactly while at least one view is attached.
//!
//! Commands, queries, and both ticks are handled one at a time on that task,
//! so a completion can never interleave with a `pause()` or `stop()`.
//!
//! The ledger and preference are read with `spawn_blocking` before the first
//! message is processed; messages sent earlier simply wait in the channel.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::dial::TimeField;
use super::engine::{EngineParts, Progress, TimerEngine};
use crate::alert::{self, Alert};
use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::storage::{Config, DailyUsageRecord, KvStore, PropertiesFile, TimerConfig};

const EVENT_CAPACITY: usize = 64;

type CommandFn = Box<dyn FnOnce(&mut TimerEngine) -> Option<Event> + Send>;
type QueryFn = Box<dyn FnOnce(&TimerEngine) + Send>;

enum Message {
    Command(CommandFn, oneshot::Sender<Option<Event>>),
    Query(QueryFn),
    Attach(oneshot::Sender<(u64, watch::Receiver<Progress>)>),
    Detach(u64),
    Shutdown,
}

/// Collaborators and settings for a [`TimerService`].
pub struct ServiceOptions {
    pub store: Arc<dyn KvStore>,
    pub clock: Arc<dyn Clock>,
    pub alert: Box<dyn Alert>,
    pub timer: TimerConfig,
}

impl ServiceOptions {
    /// System clock, properties file and alert as described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            store: Arc::new(PropertiesFile::new(config.properties_path()?)),
            clock: Arc::new(SystemClock),
            alert: alert::from_config(&config.alert),
            timer: config.timer.clone(),
        })
    }
}

/// Spawner for the control task.
pub struct TimerService {
    engine: TimerEngine,
    rx: mpsc::UnboundedReceiver<Message>,
    events: broadcast::Sender<Event>,
    progress: watch::Sender<Progress>,
    views: BTreeSet<u64>,
    next_view_id: u64,
    logic: Option<Interval>,
    visual: Option<Interval>,
    timer: TimerConfig,
}

enum Step {
    Message(Option<Message>),
    Logic,
    Visual,
}

impl TimerService {
    /// Spawn the control task on the current tokio runtime.
    ///
    /// # Errors
    /// Returns [`CoreError::Runtime`] when called outside a runtime.
    pub fn spawn(options: ServiceOptions) -> Result<EngineHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CoreError::Runtime(e.to_string()))?;
        let (handle, task) = Self::prepare(options);
        runtime.spawn(task);
        Ok(handle)
    }

    /// Spawn the control task on a thread with its own runtime, so it lives
    /// until shutdown or process exit regardless of the caller's runtime.
    ///
    /// # Errors
    /// Returns [`CoreError::Io`] when the runtime or thread cannot be created.
    pub fn spawn_dedicated(options: ServiceOptions) -> Result<EngineHandle> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (handle, task) = Self::prepare(options);
        std::thread::Builder::new()
            .name("lofitimer-engine".to_string())
            .spawn(move || runtime.block_on(task))?;
        Ok(handle)
    }

    fn prepare(options: ServiceOptions) -> (EngineHandle, impl Future<Output = ()> + Send + 'static) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let task = Self::boot(options, rx, events.clone());
        (EngineHandle { tx, events }, task)
    }

    async fn boot(
        options: ServiceOptions,
        rx: mpsc::UnboundedReceiver<Message>,
        events: broadcast::Sender<Event>,
    ) {
        let ServiceOptions {
            store,
            clock,
            alert,
            timer,
        } = options;

        let load_config = timer.clone();
        let loaded = tokio::task::spawn_blocking(move || {
            EngineParts::load(store, clock, alert, &load_config)
        })
        .await;
        let parts = match loaded {
            Ok(parts) => parts,
            Err(e) => {
                error!(error = %e, "Failed to load timer state, service not started");
                return;
            }
        };

        let engine = TimerEngine::new(parts);
        let (progress, _) = watch::channel(engine.progress());
        info!(
            configured_secs = engine.total_secs(),
            "Timer service started"
        );

        let service = Self {
            engine,
            rx,
            events,
            progress,
            views: BTreeSet::new(),
            next_view_id: 0,
            logic: None,
            visual: None,
            timer,
        };
        service.run().await;
    }

    async fn run(mut self) {
        loop {
            let step = tokio::select! {
                biased;
                msg = self.rx.recv() => Step::Message(msg),
                _ = next_tick(&mut self.logic) => Step::Logic,
                _ = next_tick(&mut self.visual) => Step::Visual,
            };

            match step {
                Step::Message(None) | Step::Message(Some(Message::Shutdown)) => break,
                Step::Message(Some(msg)) => self.handle(msg),
                Step::Logic => self.logic_tick(),
                Step::Visual => self.publish_progress(),
            }
            self.sync_cadences();
        }
        info!("Timer service stopped");
    }

    fn handle(&mut self, msg: Message) {
        match msg {
            Message::Command(f, reply) => {
                let event = f(&mut self.engine);
                if let Some(event) = &event {
                    self.publish(event.clone());
                }
                let _ = reply.send(event);
            }
            Message::Query(f) => f(&self.engine),
            Message::Attach(reply) => {
                let id = self.next_view_id;
                self.next_view_id += 1;
                self.views.insert(id);
                debug!(view = id, attached = self.views.len(), "View attached");
                // A view coming back while running reconciles right away.
                self.logic_tick();
                self.publish_progress();
                let _ = reply.send((id, self.progress.subscribe()));
            }
            Message::Detach(id) => {
                self.views.remove(&id);
                debug!(view = id, attached = self.views.len(), "View detached");
            }
            Message::Shutdown => {}
        }
    }

    fn logic_tick(&mut self) {
        if let Some(event) = self.engine.logic_tick() {
            self.publish(event);
        }
    }

    fn publish(&mut self, event: Event) {
        // No subscribers is fine.
        let _ = self.events.send(event);
        self.publish_progress();
    }

    fn publish_progress(&mut self) {
        self.progress.send_replace(self.engine.progress());
    }

    /// Logic tick follows the running phase, visual tick follows attached
    /// views. Neither depends on the other.
    fn sync_cadences(&mut self) {
        match (self.engine.is_running(), self.logic.is_some()) {
            (true, false) => {
                let mut interval = tokio::time::interval(self.timer.logic_tick());
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.logic = Some(interval);
                debug!("Logic tick started");
            }
            (false, true) => {
                self.logic = None;
                debug!("Logic tick stopped");
            }
            _ => {}
        }

        match (!self.views.is_empty(), self.visual.is_some()) {
            (true, false) => {
                let mut interval = tokio::time::interval(self.timer.visual_tick());
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.visual = Some(interval);
            }
            (false, true) => self.visual = None,
            _ => {}
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Cloneable handle to the control task.
///
/// Every method posts a message to the task that owns the engine and waits
/// for it to be handled. Commands return the resulting event, or `None` when
/// the command was a no-op in the current phase.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Message>,
    events: broadcast::Sender<Event>,
}

impl EngineHandle {
    /// Run `f` against the engine on the control task.
    pub async fn command<F>(&self, f: F) -> Result<Option<Event>>
    where
        F: FnOnce(&mut TimerEngine) -> Option<Event> + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Command(Box::new(f), reply))
            .map_err(|_| CoreError::ServiceClosed)?;
        rx.await.map_err(|_| CoreError::ServiceClosed)
    }

    /// Read from the engine on the control task.
    pub async fn query<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&TimerEngine) -> R + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let run: QueryFn = Box::new(move |engine| {
            let _ = reply.send(f(engine));
        });
        self.tx
            .send(Message::Query(run))
            .map_err(|_| CoreError::ServiceClosed)?;
        rx.await.map_err(|_| CoreError::ServiceClosed)
    }

    pub async fn configure(&self, hours: u32, minutes: u32, seconds: u32) -> Result<Option<Event>> {
        self.command(move |engine| engine.configure(hours, minutes, seconds))
            .await
    }

    pub async fn adjust(&self, field: TimeField, delta: i32) -> Result<Option<Event>> {
        self.command(move |engine| engine.adjust(field, delta)).await
    }

    pub async fn toggle_preset(&self) -> Result<Option<Event>> {
        self.command(TimerEngine::toggle_preset).await
    }

    pub async fn set_countable(&self, countable: bool) -> Result<Option<Event>> {
        self.command(move |engine| engine.set_countable(countable))
            .await
    }

    pub async fn set_counting(&self, enabled: bool) -> Result<Option<Event>> {
        self.command(move |engine| engine.set_counting(enabled))
            .await
    }

    /// Pause or start in one step on the control task.
    pub async fn toggle(&self) -> Result<Option<Event>> {
        self.command(TimerEngine::toggle).await
    }

    pub async fn start(&self) -> Result<Option<Event>> {
        self.command(TimerEngine::start).await
    }

    pub async fn pause(&self) -> Result<Option<Event>> {
        self.command(TimerEngine::pause).await
    }

    pub async fn stop(&self) -> Result<Option<Event>> {
        self.command(TimerEngine::stop).await
    }

    /// Seconds left, recomputed from the wall clock while running.
    pub async fn remaining(&self) -> Result<f64> {
        self.query(TimerEngine::remaining_secs).await
    }

    pub async fn total(&self) -> Result<u64> {
        self.query(TimerEngine::total_secs).await
    }

    pub async fn is_active(&self) -> Result<bool> {
        self.query(TimerEngine::is_active).await
    }

    pub async fn progress(&self) -> Result<Progress> {
        self.query(TimerEngine::progress).await
    }

    pub async fn last_n_days(&self, n: usize) -> Result<Vec<DailyUsageRecord>> {
        self.query(move |engine| engine.last_n_days(n)).await
    }

    /// Attach a view. Progress is published to it at the visual cadence
    /// until the returned handle is detached or dropped.
    pub async fn attach(&self) -> Result<ViewHandle> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Attach(reply))
            .map_err(|_| CoreError::ServiceClosed)?;
        let (id, progress) = rx.await.map_err(|_| CoreError::ServiceClosed)?;
        Ok(ViewHandle {
            id,
            progress,
            tx: self.tx.clone(),
        })
    }

    /// Receive every event the engine emits from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Stop the control task. Pending messages sent before this are handled.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Message::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// An attached view. Detaches on drop.
pub struct ViewHandle {
    id: u64,
    progress: watch::Receiver<Progress>,
    tx: mpsc::UnboundedSender<Message>,
}

impl ViewHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Latest published progress.
    pub fn current(&self) -> Progress {
        self.progress.borrow().clone()
    }

    /// Wait for the next publication.
    pub async fn changed(&mut self) -> Result<Progress> {
        self.progress
            .changed()
            .await
            .map_err(|_| CoreError::ServiceClosed)?;
        Ok(self.progress.borrow_and_update().clone())
    }

    pub fn detach(self) {}
}

impl Drop for ViewHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(Message::Detach(self.id));
    }
}

static GLOBAL: OnceCell<EngineHandle> = OnceCell::new();

/// Initialize the process-wide engine once and return it. Later calls return
/// the same handle and ignore `options`.
///
/// The engine runs on its own thread and runtime, so callers may come and go
/// with their own runtimes.
pub fn init_global<F>(options: F) -> Result<&'static EngineHandle>
where
    F: FnOnce() -> Result<ServiceOptions>,
{
    GLOBAL.get_or_try_init(|| TimerService::spawn_dedicated(options()?))
}

/// The process-wide engine, if [`init_global`] has run.
pub fn global() -> Option<&'static EngineHandle> {
    GLOBAL.get()
}
