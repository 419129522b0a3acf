pub mod agent;
pub mod config;
pub mod logging;
pub mod orgo;
pub mod workflow;

pub use agent::{Agent, AgentConfig, AgentError, Computer, ProgressEvent, RunSummary, TaskRequest};
pub use config::{ConfigError, ServiceLogin, Settings};
pub use orgo::{resolve_session, OrgoClient, OrgoComputer, OrgoConfig, SessionPlan};
pub use workflow::{build_prompt, WorkflowParams};
