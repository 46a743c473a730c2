pub mod orchestrator;
pub mod response;
pub mod trace;

pub use orchestrator::Orchestrator;
pub use response::{AgentResponse, OrchestrateRequest};
pub use trace::{AgentStep, StepStatus, Trace};
