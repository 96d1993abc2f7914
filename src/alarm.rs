use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use bitflags::bitflags;
use chrono::{DateTime, Local, TimeDelta};

/// identifier chosen by the operator for an alarm
pub type AlarmId = u32;
/// display multiplexing key
pub type GroupId = u32;

/// messages are bounded, one byte is reserved like a C string terminator
pub const MAX_MESSAGE_LEN: usize = 128;

/// the kind of request that created a record.
/// kept on the record even after the request was absorbed into state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Start,
    Change,
    Cancel,
    Suspend,
    Reactivate,
    View,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "Start_Alarm",
            Self::Change => "Change_Alarm",
            Self::Cancel => "Cancel_Alarm",
            Self::Suspend => "Suspend_Alarm",
            Self::Reactivate => "Reactivate_Alarm",
            Self::View => "View_Alarms",
        })
    }
}

bitflags! {
    /// `MOVED` and `REMOVE` are signals for the display layer,
    /// they are not states an alarm rests in
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u8 {
        const ACTIVE = 1;
        const SUSPENDED = 1 << 1;
        const MOVED = 1 << 2;
        const REMOVE = 1 << 3;
    }
}

impl Status {
    /// the state an operator would call it
    #[must_use]
    pub fn describe(self) -> &'static str {
        if self.contains(Self::REMOVE) {
            "Cancelled"
        } else if self.contains(Self::SUSPENDED) {
            "Suspended"
        } else if self.contains(Self::ACTIVE) {
            "Active"
        } else {
            "Pending"
        }
    }
}

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

/// hands out a process wide unique sequence number for a request
pub fn next_seq() -> u64 {
    NEXT_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// represents one alarm record (or the request that will become part of one)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    /// unique per request, used to unlink a specific record
    pub seq: u64,
    pub alarm_id: AlarmId,
    pub group_id: GroupId,
    pub kind: RequestKind,
    pub status: Status,
    pub received_at: DateTime<Local>,
    /// seconds until expiry, relative to `received_at`
    pub duration: u32,
    pub expires_at: DateTime<Local>,
    /// seconds between periodic prints
    pub interval: u32,
    pub message: String,
    /// set once the start worker handed the alarm to a display thread.
    /// cleared again when the alarm moves to another group
    pub assigned: bool,
}

impl Alarm {
    fn blank(kind: RequestKind, alarm_id: AlarmId, received_at: DateTime<Local>) -> Self {
        Self {
            seq: next_seq(),
            alarm_id,
            group_id: 0,
            kind,
            status: Status::empty(),
            received_at,
            duration: 0,
            expires_at: received_at,
            interval: 0,
            message: String::new(),
            assigned: false,
        }
    }

    #[must_use]
    pub fn start(
        alarm_id: AlarmId,
        group_id: GroupId,
        interval: u32,
        duration: u32,
        message: &str,
        received_at: DateTime<Local>,
    ) -> Self {
        Self {
            group_id,
            interval,
            duration,
            expires_at: received_at + TimeDelta::seconds(i64::from(duration)),
            message: truncate_message(message),
            ..Self::blank(RequestKind::Start, alarm_id, received_at)
        }
    }

    /// the interval of a change request is left at 0, changes never touch it
    #[must_use]
    pub fn change(
        alarm_id: AlarmId,
        group_id: GroupId,
        duration: u32,
        message: &str,
        received_at: DateTime<Local>,
    ) -> Self {
        Self {
            group_id,
            duration,
            expires_at: received_at + TimeDelta::seconds(i64::from(duration)),
            message: truncate_message(message),
            ..Self::blank(RequestKind::Change, alarm_id, received_at)
        }
    }

    /// cancel, suspend and reactivate only carry the target id
    #[must_use]
    pub fn targeted(kind: RequestKind, alarm_id: AlarmId, received_at: DateTime<Local>) -> Self {
        Self::blank(kind, alarm_id, received_at)
    }

    #[must_use]
    pub fn view(received_at: DateTime<Local>) -> Self {
        Self::blank(RequestKind::View, 0, received_at)
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Local>) -> bool {
        self.expires_at <= now
    }

    /// a start record that has not been cancelled or retired
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.kind == RequestKind::Start && !self.status.contains(Status::REMOVE)
    }

    /// counts towards the set of groups taking part in round-robin display
    #[must_use]
    pub fn is_displayable(&self) -> bool {
        self.is_live() && self.status.intersects(Status::ACTIVE | Status::SUSPENDED)
    }
}

/// `Group(5) 1700000000 2 10 hello`
impl fmt::Display for Alarm {
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

#[must_use]
pub fn truncate_message(message: &str) -> String {
    message.chars().take(MAX_MESSAGE_LEN - 1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_computes_expiry_from_arrival() {
        let now = Local::now();
        let alarm = Alarm::start(1, 5, 2, 10, "hello", now);
        assert_eq!(alarm.expires_at - now, TimeDelta::seconds(10));
        assert!(!alarm.is_expired(now));
        assert!(alarm.is_expired(now + TimeDelta::seconds(10)));
        assert_eq!(alarm.status, Status::empty());
        assert!(!alarm.assigned);
    }

    #[test]
    fn sequence_numbers_are_unique() {
        let now = Local::now();
        let a = Alarm::view(now);
        let b = Alarm::view(now);
        assert_ne!(a.seq, b.seq);
    }

    #[test]
    fn long_messages_are_truncated() {
        let long = "x".repeat(400);
        let alarm = Alarm::change(1, 1, 1, &long, Local::now());
        assert_eq!(alarm.message.chars().count(), MAX_MESSAGE_LEN - 1);
    }

    #[test]
    fn liveness_follows_kind_and_remove_flag() {
        let now = Local::now();
        let mut alarm = Alarm::start(1, 1, 1, 5, "m", now);
        assert!(alarm.is_live());
        assert!(!alarm.is_displayable());
        alarm.status = Status::ACTIVE;
        assert!(alarm.is_displayable());
        alarm.status |= Status::REMOVE;
        assert!(!alarm.is_live());
        assert!(!Alarm::targeted(RequestKind::Cancel, 1, now).is_live());
    }

    #[test]
    fn kinds_render_as_command_names() {
        assert_eq!(RequestKind::Reactivate.to_string(), "Reactivate_Alarm");
        assert_eq!(RequestKind::View.to_string(), "View_Alarms");
    }

    #[test]
    fn cancellation_outranks_other_states() {
        assert_eq!(Status::empty().describe(), "Pending");
        assert_eq!(Status::ACTIVE.describe(), "Active");
        assert_eq!((Status::ACTIVE | Status::MOVED).describe(), "Active");
        assert_eq!(Status::SUSPENDED.describe(), "Suspended");
        assert_eq!((Status::SUSPENDED | Status::REMOVE).describe(), "Cancelled");
    }
}
