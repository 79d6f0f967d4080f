pub mod advance;
pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod occurrence;
pub mod preview;
pub mod series;
pub mod storage;
pub mod task_api;
