use std::sync::Arc;

use chrono::Local;

use crate::{
    alarm::{RequestKind, Status},
    Context,
};

pub fn run(ctx: &Arc<Context>) {
    super::serve(ctx, &ctx.signals.cancel, "cancel", cancel_next);
}

/// Consumes one cancel request. An alarm owned by a display thread is flagged
/// `REMOVE` and retired by that thread on its next turn, one that never got a
/// display thread is unlinked right away.
pub fn cancel_next(ctx: &Arc<Context>) -> bool {
    let now = Local::now().timestamp();
    let line = {
        let mut records = ctx.registry.write();
        let Some((seq, alarm_id)) = records
            .latest_request(&[RequestKind::Cancel])
            .map(|request| (request.seq, request.alarm_id))
        else {
            return false;
        };
        records.remove(seq);

        match records.find_live_mut(alarm_id) {
            Some(alarm) if alarm.assigned => {
                alarm.status.insert(Status::REMOVE);
                format!("Alarm({alarm_id}) Cancelled at {now}: {alarm}")
            }
            Some(alarm) => {
                let seq = alarm.seq;
                let line = format!("Alarm({alarm_id}) Cancelled at {now}: {alarm}");
                records.remove(seq);
                line
            }
            None => {
                log::warn!("cancel for unknown alarm {alarm_id}");
                format!("Invalid Cancel Alarm Request({alarm_id}) at {now}")
            }
        }
    };
    ctx.emit(line);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alarm::Alarm,
        workers::test_support::{ago, context, insert},
    };

    #[test]
    fn assigned_alarm_is_flagged_for_its_display_thread() {
        let (ctx, rx) = context();
        let mut alarm = Alarm::start(1, 5, 2, 60, "m", ago(10));
        alarm.status = Status::ACTIVE;
        alarm.assigned = true;
        let seq = insert(&ctx, alarm);
        insert(&ctx, Alarm::targeted(RequestKind::Cancel, 1, ago(1)));

        assert!(cancel_next(&ctx));
        assert!(!cancel_next(&ctx));
        let records = ctx.registry.read();
        assert_eq!(records.alarms().len(), 1);
        assert!(records.get(seq).is_some_and(|alarm| alarm.status.contains(Status::REMOVE)));
        assert!(records.find_live(1).is_none());
        assert!(rx.try_recv().expect("diagnostic").starts_with("Alarm(1) Cancelled at"));
    }

    #[test]
    fn unassigned_alarm_is_unlinked() {
        let (ctx, _rx) = context();
        insert(&ctx, Alarm::start(1, 5, 2, 60, "m", ago(10)));
        insert(&ctx, Alarm::targeted(RequestKind::Cancel, 1, ago(1)));
        assert!(cancel_next(&ctx));
        assert!(ctx.registry.read().alarms().is_empty());
    }

    #[test]
    fn unknown_alarm_is_reported() {
        let (ctx, rx) = context();
        insert(&ctx, Alarm::targeted(RequestKind::Cancel, 42, ago(1)));
        assert!(cancel_next(&ctx));
        assert!(ctx.registry.read().alarms().is_empty());
        assert!(rx
            .try_recv()
            .expect("diagnostic")
            .starts_with("Invalid Cancel Alarm Request(42)"));
    }
}
