//! Display threads.
//!
//! Every display thread serves one group and owns up to
//! [`MAX_ALARMS_PER_THREAD`] alarms. It wakes once per tick, and when its
//! group holds the round-robin turn, diffs each owned alarm against a private
//! [`Snapshot`] and prints what changed, then prints the alarm itself when its
//! interval has elapsed.
//!
//! The [`DisplayBoard`] (the list of display threads plus the round-robin
//! token) has its own mutex. Lock order is registry, then board, then the
//! slots of a single display thread. Nothing acquires them the other way
//! around.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};

use chrono::{DateTime, Local, TimeDelta};

use crate::{
    alarm::{Alarm, AlarmId, GroupId, Status},
    error::Result,
    registry::Records,
    spawn_named, Context,
};

pub const MAX_ALARMS_PER_THREAD: usize = 2;

pub type DisplayId = usize;

type Slots = [Option<u64>; MAX_ALARMS_PER_THREAD];

/// The part of a display thread that other threads may see: its group and
/// which registry records (by sequence number) it owns.
#[derive(Debug)]
pub struct DisplayThread {
    id: DisplayId,
    group_id: GroupId,
    slots: Mutex<Slots>,
}

impl DisplayThread {
    fn new(id: DisplayId, group_id: GroupId, seq: u64) -> Self {
        let mut slots = [None; MAX_ALARMS_PER_THREAD];
        slots[0] = Some(seq);
        Self {
            id,
            group_id,
            slots: Mutex::new(slots),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub const fn id(&self) -> DisplayId {
        self.id
    }

    #[must_use]
    pub const fn group_id(&self) -> GroupId {
        self.group_id
    }

    #[must_use]
    pub fn alarm_count(&self) -> usize {
        self.lock().iter().flatten().count()
    }

    #[must_use]
    pub fn slots(&self) -> Slots {
        *self.lock()
    }

    fn owns(&self, seq: u64) -> bool {
        self.lock().contains(&Some(seq))
    }

    fn attach(&self, seq: u64) -> bool {
        let mut slots = self.lock();
        slots.iter_mut().find(|slot| slot.is_none()).map_or(false, |slot| {
            *slot = Some(seq);
            true
        })
    }

    /// frees only the given slot, the other slot keeps its alarm
    fn release(&self, index: usize) {
        self.lock()[index] = None;
    }
}

/// which alarm, and so which group, was displayed last
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// id of the last printed alarm, cleared with the group when a cycle closes
    pub alarm_id: AlarmId,
    pub group_id: GroupId,
}

#[derive(Debug, Default)]
struct Board {
    threads: Vec<Arc<DisplayThread>>,
    last_displayed: Option<Token>,
    next_id: DisplayId,
}

/// the list of running display threads and the round-robin token
#[derive(Debug, Default)]
pub struct DisplayBoard {
    inner: Mutex<Board>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// attached to the free slot of a running thread, or already held by it
    Existing(DisplayId),
    /// a new thread was started for the alarm
    Created(DisplayId),
}

impl Assignment {
    #[must_use]
    pub const fn display_id(self) -> DisplayId {
        match self {
            Self::Existing(id) | Self::Created(id) => id,
        }
    }
}

impl DisplayBoard {
    fn lock(&self) -> MutexGuard<'_, Board> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.lock().threads.len()
    }

    #[must_use]
    pub fn threads(&self) -> Vec<Arc<DisplayThread>> {
        self.lock().threads.clone()
    }

    #[must_use]
    pub fn last_displayed(&self) -> Option<Token> {
        self.lock().last_displayed
    }

    /// the display thread currently owning the record `seq`
    #[must_use]
    pub fn owner_of(&self, seq: u64) -> Option<DisplayId> {
        self.lock()
            .threads
            .iter()
            .find(|thread| thread.slots().contains(&Some(seq)))
            .map(|thread| thread.id)
    }

    /// whether a display thread of `group_id` still holds the record `seq`
    #[must_use]
    pub fn is_held_by_group(&self, seq: u64, group_id: GroupId) -> bool {
        self.lock()
            .threads
            .iter()
            .any(|thread| thread.group_id == group_id && thread.owns(seq))
    }

    /// Frees a slot under the board lock, so [`assign`] never sees an owner
    /// that is about to let go.
    fn release(&self, thread: &DisplayThread, index: usize) {
        let _board = self.lock();
        thread.release(index);
    }

    fn record_displayed(&self, token: Token, closes_cycle: bool) {
        self.lock().last_displayed = if closes_cycle { None } else { Some(token) };
    }

    /// Unlists `thread` if it owns nothing. Decided under the board lock so a
    /// concurrent [`assign`] can't attach to a thread that is about to exit.
    fn leave_if_idle(&self, thread: &Arc<DisplayThread>) -> bool {
        let mut board = self.lock();
        if thread.alarm_count() > 0 {
            return false;
        }
        board.threads.retain(|other| !Arc::ptr_eq(other, thread));
        true
    }
}

/// Hands the record `seq` to a display thread of `group_id`, starting a new
/// thread when every existing one of the group is full.
///
/// Must be called without holding the registry lock.
///
/// # Errors
/// if a new display thread can't be spawned
pub fn assign(ctx: &Arc<Context>, seq: u64, group_id: GroupId) -> Result<Assignment> {
    let mut board = ctx.board.lock();
    // moved away and back before the old thread let go
    if let Some(owner) = board
        .threads
        .iter()
        .find(|thread| thread.group_id == group_id && thread.owns(seq))
    {
        return Ok(Assignment::Existing(owner.id));
    }
    if let Some(thread) = board
        .threads
        .iter()
        .find(|thread| thread.group_id == group_id && thread.attach(seq))
    {
        return Ok(Assignment::Existing(thread.id));
    }

    board.next_id += 1;
    let thread = Arc::new(DisplayThread::new(board.next_id, group_id, seq));
    spawn(ctx, &thread)?;
    board.threads.push(Arc::clone(&thread));
    Ok(Assignment::Created(thread.id))
}

fn spawn(ctx: &Arc<Context>, thread: &Arc<DisplayThread>) -> Result<JoinHandle<()>> {
    let mut displayer = Displayer::new(Arc::clone(ctx), Arc::clone(thread));
    spawn_named(format!("display-{}", thread.id), move || displayer.run())
}

/// Whether `group_id` may display this tick.
///
/// `groups` is the sorted set of active groups. The group after the one that
/// displayed last gets the turn, the smallest one when there is no token. A
/// group without active alarms is always let through so its thread can
/// retire what it still owns.
#[must_use]
pub fn is_turn(groups: &[GroupId], group_id: GroupId, last: Option<Token>) -> bool {
    if groups.len() <= 1 || !groups.contains(&group_id) {
        return true;
    }
    let last_index = last.and_then(|token| groups.iter().position(|g| *g == token.group_id));
    match last_index {
        Some(index) => groups[(index + 1) % groups.len()] == group_id,
        None => groups[0] == group_id,
    }
}

/// A display thread's private copy of an alarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub seq: u64,
    pub alarm_id: AlarmId,
    pub group_id: GroupId,
    pub received_at: DateTime<Local>,
    pub duration: u32,
    pub interval: u32,
    pub message: String,
    pub status: Status,
    pub last_printed_at: Option<DateTime<Local>>,
}

/// What [`Snapshot::update`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    /// the record is gone or was cancelled
    Removed,
    Expired,
    /// the alarm now belongs to another group, its new thread takes over
    Relinquished,
    /// the alarm moved into this group and this thread acknowledged it
    TakenOver,
    Changed { message: bool, interval: bool },
    Unchanged,
}

impl Update {
    #[must_use]
    pub const fn retires(self) -> bool {
        matches!(self, Self::Removed | Self::Expired | Self::Relinquished)
    }
}

impl Snapshot {
    /// `MOVED` is never copied, only acknowledged later by [`Snapshot::update`]
    #[must_use]
    pub fn new(alarm: &Alarm) -> Self {
        Self {
            seq: alarm.seq,
            alarm_id: alarm.alarm_id,
            group_id: alarm.group_id,
            received_at: alarm.received_at,
            duration: alarm.duration,
            interval: alarm.interval,
            message: alarm.message.clone(),
            status: alarm.status.difference(Status::MOVED),
            last_printed_at: None,
        }
    }

    /// Diffs the live record against this snapshot and brings the snapshot up
    /// to date. Checks run in priority order and the first hit wins, except
    /// that message and interval changes are reported together.
    pub fn update(&mut self, live: Option<&Alarm>, now: DateTime<Local>) -> Update {
        let Some(live) = live.filter(|live| !live.status.contains(Status::REMOVE)) else {
            self.status = Status::REMOVE;
            return Update::Removed;
        };
        if live.is_expired(now) {
            self.status = Status::REMOVE;
            return Update::Expired;
        }
        if live.group_id != self.group_id {
            self.status = Status::REMOVE;
            return Update::Relinquished;
        }
        if live.status.contains(Status::MOVED) && !self.status.contains(Status::MOVED) {
            self.refresh(live);
            return Update::TakenOver;
        }

        let message = live.message != self.message;
        let interval = live.interval != self.interval;
        self.refresh(live);
        if message || interval {
            Update::Changed { message, interval }
        } else {
            Update::Unchanged
        }
    }

    fn refresh(&mut self, live: &Alarm) {
        self.message.clone_from(&live.message);
        self.interval = live.interval;
        self.duration = live.duration;
        self.status = live.status;
    }

    /// Suspended and retired alarms are never due. Otherwise the alarm is due
    /// once more than `interval` seconds passed since it was last printed.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Local>) -> bool {
        if self.status.intersects(Status::SUSPENDED | Status::REMOVE) {
            return false;
        }
        self.last_printed_at.map_or(true, |last| {
            now - last > TimeDelta::seconds(i64::from(self.interval))
        })
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Group({}) {} {} {} {}",
            self.group_id,
            self.received_at.timestamp(),
            self.interval,
            self.duration,
            self.message
        )
    }
}

/// a slot that finished this tick
struct Retired {
    index: usize,
    seq: u64,
    /// false when another thread now owns the record
    purge: bool,
}

/// The state owned by one running display thread.
struct Displayer {
    ctx: Arc<Context>,
    thread: Arc<DisplayThread>,
    snapshots: [Option<Snapshot>; MAX_ALARMS_PER_THREAD],
}

impl Displayer {
    fn new(ctx: Arc<Context>, thread: Arc<DisplayThread>) -> Self {
        Self {
            ctx,
            thread,
            snapshots: [None, None],
        }
    }

    fn run(&mut self) {
        log::debug!(
            "display thread {} for group {} started",
            self.thread.id,
            self.thread.group_id
        );
        loop {
            thread::sleep(self.ctx.display_tick);
            let now = Local::now();
            if self.ctx.board.leave_if_idle(&self.thread) {
                self.ctx.emit(format!(
                    "No More Alarms in Group({}): Display Thread {} exiting at {}",
                    self.thread.group_id,
                    self.thread.id,
                    now.timestamp()
                ));
                return;
            }
            let retired = self.tick(now);
            self.retire(retired, now);
        }
    }

    /// One poll under the read lock.
    fn tick(&mut self, now: DateTime<Local>) -> Vec<Retired> {
        let ctx = Arc::clone(&self.ctx);
        let records = ctx.registry.read();
        let mut retired = self.pick_up(&records);

        let groups = records.active_group_ids();
        let group_id = self.thread.group_id;
        let last = ctx.board.last_displayed();
        if !is_turn(&groups, group_id, last) {
            log::trace!(
                "display thread {} skips, not group {group_id}'s turn (last printed {:?})",
                self.thread.id,
                last.map(|token| token.alarm_id)
            );
            return retired;
        }
        let in_rotation = groups.contains(&group_id);
        let closes_cycle = records.is_largest_group(group_id);

        for index in 0..MAX_ALARMS_PER_THREAD {
            let Some(snapshot) = self.snapshots[index].as_mut() else {
                continue;
            };
            let live = records.get(snapshot.seq);
            let update = snapshot.update(live, now);
            let subject = match (update, live) {
                (Update::Relinquished, Some(live)) => {
                    format!("Alarm({}) at {}: {live}", live.alarm_id, now.timestamp())
                }
                _ => format!("Alarm({}) at {}: {snapshot}", snapshot.alarm_id, now.timestamp()),
            };
            announce(&ctx, self.thread.id, &subject, update);

            if update != Update::TakenOver && snapshot.is_due(now) {
                ctx.emit(format!(
                    "Alarm ({}) Printed by Alarm Display Thread {} at {}: {snapshot}",
                    snapshot.alarm_id,
                    self.thread.id,
                    now.timestamp()
                ));
                snapshot.last_printed_at = Some(now);
            }
            if in_rotation {
                ctx.board.record_displayed(
                    Token {
                        alarm_id: snapshot.alarm_id,
                        group_id,
                    },
                    closes_cycle,
                );
            }
            if update.retires() {
                retired.push(Retired {
                    index,
                    seq: snapshot.seq,
                    purge: update != Update::Relinquished,
                });
            }
        }
        retired
    }

    /// Creates snapshots for slots attached since the last tick.
    fn pick_up(&mut self, records: &Records) -> Vec<Retired> {
        let mut vanished = Vec::new();
        for (index, slot) in self.thread.slots().into_iter().enumerate() {
            let Some(seq) = slot else { continue };
            if self.snapshots[index].is_some() {
                continue;
            }
            match records.get(seq) {
                Some(alarm) if alarm.group_id == self.thread.group_id => {
                    self.snapshots[index] = Some(Snapshot::new(alarm));
                }
                // moved again before this thread got to it, the new group's
                // thread gets it instead
                Some(_) => vanished.push(Retired {
                    index,
                    seq,
                    purge: false,
                }),
                None => {
                    log::debug!("record {seq} vanished before display thread {} saw it", self.thread.id);
                    vanished.push(Retired {
                        index,
                        seq,
                        purge: false,
                    });
                }
            }
        }
        vanished
    }

    /// Drops finished slots outside the read lock, purging records this
    /// thread was the last to own. A record that moved back into this
    /// thread's group since the tick keeps its slot.
    fn retire(&mut self, retired: Vec<Retired>, now: DateTime<Local>) {
        let ctx = Arc::clone(&self.ctx);
        for Retired { index, seq, purge } in retired {
            self.snapshots[index] = None;
            if purge {
                if ctx.registry.write().purge(seq, self.thread.group_id, now) {
                    log::debug!("record {seq} purged by display thread {}", self.thread.id);
                }
                ctx.board.release(&self.thread, index);
                continue;
            }
            let records = ctx.registry.read();
            let returned = records
                .get(seq)
                .is_some_and(|alarm| alarm.group_id == self.thread.group_id);
            if returned {
                log::debug!(
                    "record {seq} is back in group {}, display thread {} keeps it",
                    self.thread.group_id,
                    self.thread.id
                );
            } else {
                ctx.board.release(&self.thread, index);
            }
        }
    }
}

fn announce(ctx: &Context, id: DisplayId, subject: &str, update: Update) {
    match update {
        Update::Removed | Update::Relinquished => {
            ctx.emit(format!("Display Thread {id} Has Stopped Printing Message of {subject}"));
        }
        Update::Expired => {
            ctx.emit(format!("Display Thread {id} Has Stopped Printing Expired {subject}"));
        }
        Update::TakenOver => {
            ctx.emit(format!("Display Thread {id} Has Taken Over Printing Message of {subject}"));
        }
        Update::Changed { message, interval } => {
            if message {
                ctx.emit(format!("Display Thread {id} Starts to Print Changed Message {subject}"));
            }
            if interval {
                ctx.emit(format!(
                    "Display Thread {id} Starts to Print Changed Interval Value {subject}"
                ));
            }
        }
        Update::Unchanged => {}
    }
}
