//! Suspend and reactivate requests.
//!
//! Each wake looks at the most recent request only. Older pending requests
//! for the same alarm are dropped unapplied, so a burst of suspend and
//! reactivate requests settles on whatever was asked last.

use std::sync::Arc;

use chrono::Local;

use crate::{
    alarm::{RequestKind, Status},
    Context,
};

const KINDS: [RequestKind; 2] = [RequestKind::Suspend, RequestKind::Reactivate];

pub fn run(ctx: &Arc<Context>) {
    super::serve(ctx, &ctx.signals.suspend_reactivate, "suspend/reactivate", apply_latest);
}

/// Returns false when no request was pending.
pub fn apply_latest(ctx: &Arc<Context>) -> bool {
    let now = Local::now().timestamp();
    let line = {
        let mut records = ctx.registry.write();
        let Some(request) = records.latest_request(&KINDS).cloned() else {
            return false;
        };
        let (kind, alarm_id) = (request.kind, request.alarm_id);

        let superseded: Vec<u64> = records
            .alarms()
            .iter()
            .filter(|other| KINDS.contains(&other.kind) && other.alarm_id == alarm_id)
            .map(|other| other.seq)
            .collect();
        for seq in superseded {
            records.remove(seq);
        }

        let target = records.target_of(&request);
        match target.and_then(|seq| records.get_mut(seq)) {
            None => {
                log::warn!("{kind} for unknown alarm {alarm_id}");
                format!("{kind} Request({alarm_id}) Discarded at {now}: No Such Alarm")
            }
            Some(alarm) => {
                let (from, to, verb) = match kind {
                    RequestKind::Suspend => (Status::ACTIVE, Status::SUSPENDED, "Suspended"),
                    _ => (Status::SUSPENDED, Status::ACTIVE, "Reactivated"),
                };
                if alarm.status.contains(from) {
                    alarm.status.remove(from);
                    alarm.status.insert(to);
                    format!("Alarm({alarm_id}) {verb} at {now}: {alarm}")
                } else {
                    log::debug!("{kind} for alarm {alarm_id} is a no-op");
                    format!(
                        "{kind} Request({alarm_id}) Discarded at {now}: Alarm Is {}",
                        alarm.status.describe()
                    )
                }
            }
        }
    };
    ctx.emit(line);
    true
}
