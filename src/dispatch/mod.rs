// Job execution and dispatch

pub mod executor;
pub mod report;
pub mod scheduler;

pub use executor::*;
pub use report::*;
pub use scheduler::*;
