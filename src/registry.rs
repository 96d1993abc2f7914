//! The shared alarm registry.
//!
//! Two timestamp ordered lists live behind a single reader/writer lock: the
//! alarm list (start records plus pending cancel, suspend, reactivate and
//! view requests) and the change list (pending change requests). Nothing
//! reaches the lists except through [`Registry::read`] and
//! [`Registry::write`], which hand out guards that release the lock when
//! dropped.
//!
//! Workers are woken through one [`Signal`] per request kind.

use std::sync::{Condvar, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Local};

use crate::alarm::{Alarm, AlarmId, GroupId, RequestKind, Status};

/// a list of records kept sorted by arrival time
#[derive(Debug, Default, Clone)]
pub struct AlarmList(Vec<Alarm>);

impl AlarmList {
    /// inserts after every record that arrived at the same time or earlier
    pub fn insert(&mut self, alarm: Alarm) {
        let at = self
            .0
            .partition_point(|existing| existing.received_at <= alarm.received_at);
        self.0.insert(at, alarm);
    }

    pub fn remove(&mut self, seq: u64) -> Option<Alarm> {
        let at = self.0.iter().position(|alarm| alarm.seq == seq)?;
        Some(self.0.remove(at))
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Alarm> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn take(&mut self) -> Vec<Alarm> {
        std::mem::take(&mut self.0)
    }
}

/// true when `a` arrived strictly before `b`, sequence numbers break ties
fn arrived_before(a: &Alarm, b: &Alarm) -> bool {
    (a.received_at, a.seq) < (b.received_at, b.seq)
}

/// The contents guarded by the registry lock.
#[derive(Debug, Default)]
pub struct Records {
    alarms: AlarmList,
    changes: AlarmList,
}

impl Records {
    pub fn insert_alarm(&mut self, alarm: Alarm) {
        self.alarms.insert(alarm);
    }

    pub fn insert_change(&mut self, change: Alarm) {
        self.changes.insert(change);
    }

    #[must_use]
    pub const fn alarms(&self) -> &AlarmList {
        &self.alarms
    }

    #[must_use]
    pub const fn changes(&self) -> &AlarmList {
        &self.changes
    }

    /// drains every pending change request, oldest first
    pub fn take_changes(&mut self) -> Vec<Alarm> {
        self.changes.take()
    }

    pub fn remove(&mut self, seq: u64) -> Option<Alarm> {
        self.alarms.remove(seq)
    }

    #[must_use]
    pub fn get(&self, seq: u64) -> Option<&Alarm> {
        self.alarms.iter().find(|alarm| alarm.seq == seq)
    }

    pub fn get_mut(&mut self, seq: u64) -> Option<&mut Alarm> {
        self.alarms.0.iter_mut().find(|alarm| alarm.seq == seq)
    }

    /// the start record of `alarm_id` that has not been cancelled or retired
    #[must_use]
    pub fn find_live(&self, alarm_id: AlarmId) -> Option<&Alarm> {
        self.alarms
            .iter()
            .find(|alarm| alarm.is_live() && alarm.alarm_id == alarm_id)
    }

    pub fn find_live_mut(&mut self, alarm_id: AlarmId) -> Option<&mut Alarm> {
        self.alarms
            .0
            .iter_mut()
            .find(|alarm| alarm.is_live() && alarm.alarm_id == alarm_id)
    }

    /// the most recently arrived record whose kind is one of `kinds`
    #[must_use]
    pub fn latest_request(&self, kinds: &[RequestKind]) -> Option<&Alarm> {
        self.alarms
            .iter()
            .rev()
            .find(|alarm| kinds.contains(&alarm.kind))
    }

    /// the most recently arrived start record not yet handed to a display thread
    #[must_use]
    pub fn latest_unassigned(&self) -> Option<&Alarm> {
        self.alarms
            .iter()
            .rev()
            .find(|alarm| alarm.is_live() && !alarm.assigned)
    }

    /// The most recent start record for the request's alarm id that arrived
    /// before the request itself.
    #[must_use]
    pub fn target_of(&self, request: &Alarm) -> Option<u64> {
        self.alarms
            .iter()
            .rev()
            .find(|alarm| {
                alarm.kind == RequestKind::Start
                    && alarm.alarm_id == request.alarm_id
                    && arrived_before(alarm, request)
            })
            .map(|alarm| alarm.seq)
    }

    /// sorted, distinct groups of every active or suspended alarm
    #[must_use]
    pub fn active_group_ids(&self) -> Vec<GroupId> {
        let mut groups: Vec<GroupId> = self
            .alarms
            .iter()
            .filter(|alarm| alarm.is_displayable())
            .map(|alarm| alarm.group_id)
            .collect();
        groups.sort_unstable();
        groups.dedup();
        groups
    }

    /// with no active groups at all every group counts as the largest
    #[must_use]
    pub fn is_largest_group(&self, group_id: GroupId) -> bool {
        self.active_group_ids()
            .last()
            .map_or(true, |largest| *largest == group_id)
    }

    /// start records that arrived strictly before `cutoff` and are still live
    pub fn live_before(&self, cutoff: DateTime<Local>) -> impl Iterator<Item = &Alarm> {
        self.alarms
            .iter()
            .filter(move |alarm| alarm.is_live() && alarm.received_at < cutoff)
    }

    /// Unlinks a retired start record. Records that were moved to another
    /// group in the meantime are left alone.
    pub fn purge(&mut self, seq: u64, group_id: GroupId, now: DateTime<Local>) -> bool {
        let retire = self.get(seq).is_some_and(|alarm| {
            alarm.group_id == group_id
                && (alarm.status.contains(Status::REMOVE) || alarm.is_expired(now))
        });
        retire && self.remove(seq).is_some()
    }
}

/// Owner of the alarm and change lists.
///
/// Backed by [`std::sync::RwLock`]: any number of readers at once, a writer
/// excludes readers and other writers.
#[derive(Debug, Default)]
pub struct Registry {
    records: RwLock<Records>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// shared access, released when the guard drops
    pub fn read(&self) -> RwLockReadGuard<'_, Records> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// exclusive access, released when the guard drops
    pub fn write(&self) -> RwLockWriteGuard<'_, Records> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A sticky wake-up flag. A notification delivered while nobody waits is
/// kept until the next [`Signal::wait`].
#[derive(Debug, Default)]
pub struct Signal {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    pub fn notify(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cond.notify_one();
    }

    pub fn wait(&self) {
        let guard = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let mut pending = self
            .cond
            .wait_while(guard, |pending| !*pending)
            .unwrap_or_else(PoisonError::into_inner);
        *pending = false;
    }
}

#[derive(Debug, Default)]
pub struct Signals {
    pub start: Signal,
    pub change: Signal,
    pub suspend_reactivate: Signal,
    pub cancel: Signal,
    pub view: Signal,
}

impl Signals {
    #[must_use]
    pub const fn for_kind(&self, kind: RequestKind) -> &Signal {
        match kind {
            RequestKind::Start => &self.start,
            RequestKind::Change => &self.change,
            RequestKind::Suspend | RequestKind::Reactivate => &self.suspend_reactivate,
            RequestKind::Cancel => &self.cancel,
            RequestKind::View => &self.view,
        }
    }
}
