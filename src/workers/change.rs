//! Applies pending change requests to the alarms they name.

use std::sync::Arc;

use chrono::Local;

use crate::{alarm::Status, Context};

pub fn run(ctx: &Arc<Context>) {
    super::serve(ctx, &ctx.signals.change, "change", apply_changes);
}

/// Drains the change list. Every change is consumed whether or not its alarm
/// exists. Returns false when there was nothing pending.
pub fn apply_changes(ctx: &Arc<Context>) -> bool {
    let now = Local::now().timestamp();
    let mut lines = Vec::new();
    let mut moved = false;
    {
        let mut records = ctx.registry.write();
        let changes = records.take_changes();
        if changes.is_empty() {
            return false;
        }
        for change in changes {
            let Some(alarm) = records.find_live_mut(change.alarm_id) else {
                log::warn!("change for unknown alarm {}", change.alarm_id);
                lines.push(format!(
                    "Invalid Change Alarm Request({}) at {now}: Group({}) {} {} {}",
                    change.alarm_id,
                    change.group_id,
                    change.received_at.timestamp(),
                    change.duration,
                    change.message
                ));
                continue;
            };
            alarm.duration = change.duration;
            alarm.expires_at = change.expires_at;
            alarm.message = change.message;
            if alarm.group_id != change.group_id {
                alarm.group_id = change.group_id;
                // an alarm nobody displays yet has nothing to hand over
                if ctx.board.is_held_by_group(alarm.seq, change.group_id) {
                    // moved back before its old display thread let go
                    alarm.status.remove(Status::MOVED);
                    alarm.assigned = true;
                } else if alarm.assigned {
                    alarm.status.insert(Status::MOVED);
                    alarm.assigned = false;
                    moved = true;
                }
            }
            lines.push(format!(
                "Change Alarm Thread Has Changed Alarm({}) at {now}: {alarm}",
                alarm.alarm_id
            ));
        }
    }

    for line in lines {
        ctx.emit(line);
    }
    if moved {
        ctx.signals.start.notify();
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alarm::Alarm,
        workers::{
            start::assign_next,
            test_support::{ago, context, insert},
        },
    };

    fn assigned(id: u32, group: u32) -> Alarm {
        let mut alarm = Alarm::start(id, group, 2, 60, "hi", ago(5));
        alarm.status = Status::ACTIVE;
        alarm.assigned = true;
        alarm
    }

    #[test]
    fn change_in_place_keeps_group_and_interval() {
        let (ctx, rx) = context();
        let seq = insert(&ctx, assigned(1, 5));
        let change = Alarm::change(1, 5, 30, "updated", ago(0));
        let expires_at = change.expires_at;
        ctx.registry.write().insert_change(change);

        assert!(apply_changes(&ctx));
        assert!(!apply_changes(&ctx));

        let records = ctx.registry.read();
        let alarm = records.get(seq).expect("alarm");
        assert_eq!(alarm.message, "updated");
        assert_eq!(alarm.duration, 30);
        assert_eq!(alarm.expires_at, expires_at);
        assert_eq!(alarm.interval, 2);
        assert_eq!(alarm.status, Status::ACTIVE);
        assert!(records.changes().is_empty());
        let line = rx.try_recv().expect("diagnostic");
        assert!(line.starts_with("Change Alarm Thread Has Changed Alarm(1)"));
    }

    #[test]
    fn group_change_marks_moved_and_requests_reassignment() {
        let (ctx, _rx) = context();
        let seq = insert(&ctx, assigned(1, 5));
        ctx.registry
            .write()
            .insert_change(Alarm::change(1, 7, 60, "bye", ago(0)));

        assert!(apply_changes(&ctx));
        {
            let records = ctx.registry.read();
            let alarm = records.get(seq).expect("alarm");
            assert_eq!(alarm.group_id, 7);
            assert!(alarm.status.contains(Status::ACTIVE | Status::MOVED));
            assert!(!alarm.assigned);
        }
        // the start worker was woken, so this returns at once
        ctx.signals.start.wait();
    }

    #[test]
    fn change_for_unknown_alarm_is_discarded() {
        let (ctx, rx) = context();
        ctx.registry
            .write()
            .insert_change(Alarm::change(99, 1, 10, "x", ago(0)));
        assert!(apply_changes(&ctx));

        let records = ctx.registry.read();
        assert!(records.alarms().is_empty());
        assert!(records.changes().is_empty());
        let line = rx.try_recv().expect("diagnostic");
        assert!(line.starts_with("Invalid Change Alarm Request(99)"));
    }

    #[test]
    fn all_pending_changes_are_applied_oldest_first() {
        let (ctx, _rx) = context();
        let seq = insert(&ctx, assigned(1, 5));
        {
            let mut records = ctx.registry.write();
            records.insert_change(Alarm::change(1, 5, 60, "second", ago(1)));
            records.insert_change(Alarm::change(1, 5, 60, "first", ago(2)));
            records.insert_change(Alarm::change(2, 5, 60, "nobody", ago(1)));
        }
        assert!(apply_changes(&ctx));
        let records = ctx.registry.read();
        assert_eq!(records.get(seq).map(|alarm| alarm.message.as_str()), Some("second"));
        assert!(records.changes().is_empty());
    }

    #[test]
    fn unassigned_alarm_just_changes_group() {
        let (ctx, _rx) = context();
        let seq = insert(&ctx, Alarm::start(3, 1, 2, 60, "pending", ago(1)));
        ctx.registry
            .write()
            .insert_change(Alarm::change(3, 2, 60, "pending", ago(0)));
        assert!(apply_changes(&ctx));
        let records = ctx.registry.read();
        let alarm = records.get(seq).expect("alarm");
        assert_eq!(alarm.group_id, 2);
        assert!(!alarm.status.contains(Status::MOVED));
    }

    fn change_group(ctx: &Arc<Context>, group: u32) {
        ctx.registry
            .write()
            .insert_change(Alarm::change(1, group, 60, "hi", ago(0)));
        assert!(apply_changes(ctx));
    }

    fn holders(ctx: &Context, seq: u64) -> Vec<(u32, usize)> {
        ctx.board
            .threads()
            .iter()
            .map(|thread| {
                let held = thread.slots().iter().filter(|slot| **slot == Some(seq)).count();
                (thread.group_id(), held)
            })
            .filter(|(_, held)| *held > 0)
            .collect()
    }

    #[test]
    fn moving_back_and_forth_leaves_one_slot_per_group() {
        let (ctx, _rx) = context();
        let seq = insert(&ctx, Alarm::start(1, 5, 2, 60, "hi", ago(1)));
        assert!(assign_next(&ctx));

        change_group(&ctx, 7);
        assert!(assign_next(&ctx));
        change_group(&ctx, 5);
        // still held by the group 5 thread, nothing to reassign
        assert!(!assign_next(&ctx));

        assert_eq!(holders(&ctx, seq), [(5, 1), (7, 1)]);
        let records = ctx.registry.read();
        let alarm = records.get(seq).expect("alarm");
        assert_eq!(alarm.group_id, 5);
        assert!(alarm.assigned);
        assert!(!alarm.status.contains(Status::MOVED));
    }

    #[test]
    fn moving_back_before_reassignment_keeps_the_old_thread() {
        let (ctx, _rx) = context();
        let seq = insert(&ctx, Alarm::start(1, 5, 2, 60, "hi", ago(1)));
        assert!(assign_next(&ctx));

        change_group(&ctx, 7);
        change_group(&ctx, 5);
        assert!(!assign_next(&ctx));

        assert_eq!(holders(&ctx, seq), [(5, 1)]);
        assert_eq!(ctx.board.thread_count(), 1);
        assert!(ctx.registry.read().get(seq).is_some_and(|alarm| alarm.assigned));
    }
}
