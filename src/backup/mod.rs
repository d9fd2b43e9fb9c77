pub mod compression;
pub mod job;
pub mod runner;
pub mod scheduler;

pub use scheduler::Scheduler;
