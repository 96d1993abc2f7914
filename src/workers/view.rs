use std::sync::Arc;

use chrono::Local;

use crate::{alarm::RequestKind, Context};

pub fn run(ctx: &Arc<Context>) {
    super::serve(ctx, &ctx.signals.view, "view", view_next);
}

/// Consumes one view request and lists every live alarm that arrived before
/// the listing started.
pub fn view_next(ctx: &Arc<Context>) -> bool {
    {
        let mut records = ctx.registry.write();
        let Some(seq) = records
            .latest_request(&[RequestKind::View])
            .map(|request| request.seq)
        else {
            return false;
        };
        records.remove(seq);
    }

    let lines = {
        let records = ctx.registry.read();
        let cutoff = Local::now();
        let mut lines = vec![format!("View Alarms at {}:", cutoff.timestamp())];
        for (n, alarm) in records.live_before(cutoff).enumerate() {
            let owner = ctx
                .board
                .owner_of(alarm.seq)
                .map_or_else(|| "None".to_string(), |id| id.to_string());
            lines.push(format!(
                "{}. Alarm({}): {alarm} Status: {} Display Thread {owner}",
                n + 1,
                alarm.alarm_id,
                alarm.status.describe()
            ));
        }
        lines
    };
    for line in lines {
        ctx.emit(line);
    }
    true
}
