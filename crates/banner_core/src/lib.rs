//! Rotating alarm banner: cycles through the active alarms of the session
//! locale on a timer and on user command.

pub mod alarm_watcher;
pub mod controller;
pub mod locale_watcher;
pub mod scheduler;

pub use alarm_watcher::{AlarmSetWatcher, MembershipSink};
pub use controller::{step_index, BannerController, RotationState};
pub use locale_watcher::LocaleSwitchWatcher;
pub use scheduler::{effective_interval_millis, RotationScheduler, RotationTarget, TickToken};
