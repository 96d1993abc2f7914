//! The queue consumer: moves parsed requests from the bounded queue into the
//! registry and wakes the worker responsible for them.

use std::sync::Arc;

use chrono::Local;

use crate::{
    alarm::{Alarm, RequestKind},
    buffer::BoundedQueue,
    Context,
};

pub fn run(ctx: &Arc<Context>, queue: &BoundedQueue<Alarm>) {
    log::debug!("consumer waiting for requests");
    loop {
        let (request, slot) = queue.dequeue();
        dispatch(ctx, request, slot);
    }
}

/// Links one request into the registry. Never fails, the lists are unbounded.
pub fn dispatch(ctx: &Context, request: Alarm, slot: usize) {
    let kind = request.kind;
    ctx.emit(format!(
        "Consumer Thread has Retrieved {kind} Request({}) at {}: {} from Circular_Buffer Index: {slot}",
        request.alarm_id,
        Local::now().timestamp(),
        request.received_at.timestamp(),
    ));
    let inserted = insertion_line(&request);

    {
        let mut records = ctx.registry.write();
        if kind == RequestKind::Change {
            records.insert_change(request);
        } else {
            records.insert_alarm(request);
        }
    }

    ctx.emit(inserted);
    ctx.signals.for_kind(kind).notify();
}

fn insertion_line(request: &Alarm) -> String {
    let received = request.received_at.timestamp();
    match request.kind {
        RequestKind::Start => format!(
            "Start_Alarm({}) Inserted by Consumer Thread Into Alarm List: {request}",
            request.alarm_id
        ),
        RequestKind::Change => format!(
            "Change_Alarm({}) Inserted by Consumer Thread into Separate Change Alarm Request List: Group({}) {received} {} {}",
            request.alarm_id, request.group_id, request.duration, request.message
        ),
        RequestKind::View => {
            format!("View_Alarms Request Inserted by Consumer Thread Into Alarm List: {received}")
        }
        kind @ (RequestKind::Cancel | RequestKind::Suspend | RequestKind::Reactivate) => format!(
            "{kind}({}) Inserted by Consumer Thread Into Alarm List: {received}",
            request.alarm_id
        ),
    }
}
