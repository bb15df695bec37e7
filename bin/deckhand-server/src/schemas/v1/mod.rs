pub mod agent;
pub mod application;
pub mod task;
