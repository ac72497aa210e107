use serde::{Deserialize, Serialize};

use crate::domain::{AlarmHandle, LocaleId};

/// Structural change of a localized alarm collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MembershipEvent {
    Added(AlarmHandle),
    Removed(AlarmHandle),
}

/// Structural change of the retained-alarms root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RetainedAlarmsEvent {
    LocaleCreated(LocaleId),
}

/// Externally readable view of the rotation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayed: Option<AlarmHandle>,
    pub index: i64,
    pub alarm_count: usize,
}

impl BannerSnapshot {
    pub const EMPTY: BannerSnapshot = BannerSnapshot {
        displayed: None,
        index: -1,
        alarm_count: 0,
    };
}

impl Default for BannerSnapshot {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_omits_displayed_alarm() {
        let json = serde_json::to_value(BannerSnapshot::EMPTY).expect("json");
        assert_eq!(json, serde_json::json!({ "index": -1, "alarm_count": 0 }));
    }

    #[test]
    fn membership_event_uses_tagged_layout() {
        let json = serde_json::to_value(MembershipEvent::Removed(AlarmHandle(7))).expect("json");
        assert_eq!(json, serde_json::json!({ "type": "removed", "payload": 7 }));
    }
}
