//! Core domain model for the scheduling service
//!
//! This module defines the entity graph the rest of the system operates on:
//!
//! - [`employee`] - Employees, roles, availability
//! - [`department`] - Department tree
//! - [`shift`] - Work intervals with staffing requirements
//! - [`schedule`] - Weekly schedule containers
//! - [`assignment`] - Employee-to-shift bindings and their state machine
//! - [`rule`] - Typed scheduling rules derived from natural language
//! - [`notification`] - User-facing notifications
//! - [`history`] - Append-only audit entries
//!
//! A `Schedule` owns its assignments; `Employee` and `Shift` are referenced
//! and never cascaded across.

pub mod assignment;
pub mod department;
pub mod employee;
pub mod history;
pub mod notification;
pub mod rule;
pub mod schedule;
pub mod shift;
pub mod time;

pub use assignment::{AssignmentStatus, ScheduleAssignment};
pub use department::{Department, DepartmentNode};
pub use employee::{Availability, DayAvailability, Employee, Role};
pub use history::{HistoryEntry, HistoryKind};
pub use notification::{Notification, NotificationAction, NotificationPriority};
pub use rule::{Rule, RulePayload, RuleScope, RuleType};
pub use schedule::{Schedule, ScheduleStatus};
pub use shift::{Shift, ShiftType};
pub use time::TimeWindow;
