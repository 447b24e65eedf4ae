//! Request handlers, grouped by resource

pub mod assignments;
pub mod auth;
pub mod departments;
pub mod employees;
pub mod generate;
pub mod notifications;
pub mod rules;
pub mod schedules;
pub mod shifts;
pub mod system;
