//! Activates new start requests and hands them to a display thread of their
//! group. Alarms moved by a change come back through here too, so they get a
//! display thread of the new group.

use std::sync::Arc;

use chrono::Local;

use crate::{
    alarm::Status,
    display::{self, Assignment},
    fatal, Context,
};

pub fn run(ctx: &Arc<Context>) {
    super::serve(ctx, &ctx.signals.start, "start", assign_next);
}

/// Handles the most recently arrived unassigned start record. Returns false
/// when there was none.
pub fn assign_next(ctx: &Arc<Context>) -> bool {
    let (seq, alarm_id, group_id, described) = {
        let mut records = ctx.registry.write();
        let Some(next) = records.latest_unassigned() else {
            return false;
        };
        let (seq, alarm_id) = (next.seq, next.alarm_id);
        let duplicate = records
            .alarms()
            .iter()
            .any(|other| other.seq != seq && other.alarm_id == alarm_id && other.is_displayable());
        if duplicate {
            if let Some(discarded) = records.remove(seq) {
                drop(records);
                log::warn!("alarm {alarm_id} already exists, start request discarded");
                ctx.emit(format!(
                    "Duplicate Start_Alarm({alarm_id}) Request Discarded at {}: {discarded}",
                    Local::now().timestamp()
                ));
            }
            return true;
        }

        let Some(alarm) = records.get_mut(seq) else {
            return false;
        };
        alarm.assigned = true;
        if !alarm.status.intersects(Status::ACTIVE | Status::SUSPENDED) {
            alarm.status.insert(Status::ACTIVE);
        }
        (seq, alarm_id, alarm.group_id, alarm.to_string())
    };

    // the board is locked inside assign, never while holding the registry
    let assignment = match display::assign(ctx, seq, group_id) {
        Ok(assignment) => assignment,
        Err(e) => fatal(ctx, &e),
    };
    let now = Local::now().timestamp();
    if let Assignment::Created(id) = assignment {
        ctx.emit(format!(
            "New Display Alarm Thread {id} Created for Group({group_id}) at {now}"
        ));
    }
    ctx.emit(format!(
        "Alarm({alarm_id}) Assigned to Display Thread {} at {now}: {described}",
        assignment.display_id()
    ));
    true
}
