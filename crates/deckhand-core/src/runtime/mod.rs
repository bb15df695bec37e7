pub mod aggregate;
pub mod backend;
pub mod orchestrator;
pub mod prober;
pub mod storage;
