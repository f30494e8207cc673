pub mod configure;
pub mod download;
pub mod error;
pub mod logger;
pub mod orchestrator;
pub mod page;
pub mod poller;
pub mod queue;
pub mod settings;
pub mod sleep;
pub mod snapshot;
pub mod submit;
pub mod types;
