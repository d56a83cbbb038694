pub mod home_component;
pub mod recurrence;
pub mod recurring_task_instance;
pub mod task;
pub mod task_registration;
pub mod task_template;
