pub mod cron;
pub mod scheduler;

pub use scheduler::{SchedulerCore, SchedulerStatus, UserSettingsView};
