pub mod calendar;
pub mod config;
pub mod notify;
pub mod task;
