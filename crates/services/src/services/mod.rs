pub mod component_registration;
pub mod config;
pub mod daily_sweep;
pub mod database_validator;
pub mod notification;
pub mod recurrence;
pub mod recurrence_scheduler;
pub mod registration_generator;
pub mod template_matcher;
