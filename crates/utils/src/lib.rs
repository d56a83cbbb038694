pub mod calendar;
pub mod logging;
