#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![deny(clippy::use_self, rust_2018_idioms)]
#![allow(clippy::multiple_crate_versions, clippy::module_name_repetitions)]

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use chrono::Local;
use communication::Output;
use config::Config;
use display::DisplayBoard;
use registry::{Registry, Signals};

pub mod alarm;
pub mod buffer;
pub mod command;
pub mod communication;
pub mod config;
pub mod display;
pub mod dispatcher;
pub mod error;
pub mod registry;
/// one thread per request kind, each applying its kind to the registry
pub mod workers;

pub use alarm::Alarm;
pub use buffer::BoundedQueue;
pub use error::{Error, Result};

/// Everything the worker and display threads share.
#[derive(Debug)]
pub struct Context {
    pub registry: Registry,
    pub signals: Signals,
    pub board: DisplayBoard,
    pub output: Arc<dyn Output>,
    pub display_tick: Duration,
}

impl Context {
    #[must_use]
    pub fn new(output: Arc<dyn Output>, display_tick: Duration) -> Self {
        Self {
            registry: Registry::new(),
            signals: Signals::default(),
            board: DisplayBoard::default(),
            output,
            display_tick,
        }
    }

    pub fn emit(&self, line: impl AsRef<str>) {
        self.output.emit(line.as_ref());
    }
}

/// Unrecoverable: the registry can't be kept consistent past this point.
pub(crate) fn fatal(ctx: &Context, err: &Error) -> ! {
    log::error!("{err}");
    ctx.emit(format!("Fatal: {err}"));
    log::logger().flush();
    std::process::abort()
}

/// starts a named thread, the name shows up in panics and debuggers
///
/// # Errors
/// if the OS refuses to create the thread
pub fn spawn_named<F>(name: impl Into<String>, f: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let name = name.into();
    thread::Builder::new()
        .name(name.clone())
        .spawn(f)
        .map_err(|source| Error::Spawn { name, source })
}

/// A running alarm system: the request queue, the dispatcher and one
/// thread per lifecycle operation. Display threads come and go on their own.
#[derive(Debug)]
pub struct AlarmSystem {
    ctx: Arc<Context>,
    queue: Arc<BoundedQueue<Alarm>>,
    workers: Vec<JoinHandle<()>>,
}

impl AlarmSystem {
    /// # Errors
    /// if any of the worker threads can't be spawned
    pub fn start(config: &Config, output: Arc<dyn Output>) -> Result<Self> {
        config.validate()?;
        let ctx = Arc::new(Context::new(output, config.display_tick()));
        let queue = Arc::new(BoundedQueue::new(config.queue_capacity));

        let mut workers = Vec::with_capacity(6);
        workers.push({
            let (ctx, queue) = (Arc::clone(&ctx), Arc::clone(&queue));
            spawn_named("consumer", move || dispatcher::run(&ctx, &queue))?
        });
        let loops: [(&str, fn(&Arc<Context>)); 5] = [
            ("start-alarm", workers::start::run),
            ("change-alarm", workers::change::run),
            ("suspend-reactivate-alarm", workers::suspend::run),
            ("cancel-alarm", workers::cancel::run),
            ("view-alarms", workers::view::run),
        ];
        for (name, run) in loops {
            let ctx = Arc::clone(&ctx);
            workers.push(spawn_named(name, move || run(&ctx))?);
        }
        log::info!("alarm system started with {} workers", workers.len());

        Ok(Self {
            ctx,
            queue,
            workers,
        })
    }

    /// Queues a parsed request, blocking while the queue is full. Returns
    /// the queue slot used.
    pub fn submit(&self, request: Alarm) -> usize {
        let (kind, alarm_id, received_at) = (request.kind, request.alarm_id, request.received_at);
        let slot = self.queue.enqueue(request);
        self.ctx.emit(format!(
            "Alarm Thread has Inserted {kind} Request({alarm_id}) at {}: {} into Circular_Buffer Index: {slot}",
            Local::now().timestamp(),
            received_at.timestamp(),
        ));
        slot
    }

    #[must_use]
    pub const fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// names of the long running worker threads
    pub fn worker_names(&self) -> impl Iterator<Item = &str> {
        self.workers.iter().filter_map(|worker| worker.thread().name())
    }
}
