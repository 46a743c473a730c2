//! Request trace steps.
//!
//! An append-only log of the work performed while handling one request,
//! returned to the caller for observability. Trace contents never feed
//! back into control decisions.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStep {
    pub agent: String,
    pub action: String,
    pub status: StepStatus,
    /// Epoch milliseconds.
    pub start_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Collects AgentSteps for one request lifecycle.
#[derive(Debug, Default)]
pub struct Trace {
    steps: Vec<AgentStep>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a step, returning its index for later completion.
    pub fn begin(&mut self, agent: &str, action: impl Into<String>) -> usize {
        self.steps.push(AgentStep {
            agent: agent.to_string(),
            action: action.into(),
            status: StepStatus::Running,
            start_time: Utc::now().timestamp_millis(),
            end_time: None,
            details: None,
            data: None,
        });
        self.steps.len() - 1
    }

    pub fn complete(&mut self, index: usize, details: impl Into<String>) {
        self.finish(index, StepStatus::Completed, details.into(), None);
    }

    pub fn complete_with_data(&mut self, index: usize, details: impl Into<String>, data: Value) {
        self.finish(index, StepStatus::Completed, details.into(), Some(data));
    }

    pub fn fail(&mut self, index: usize, details: impl Into<String>) {
        self.finish(index, StepStatus::Error, details.into(), None);
    }

    /// Record an instantaneous step that is already complete.
    pub fn push_completed(&mut self, agent: &str, action: impl Into<String>, details: impl Into<String>) {
        let now = Utc::now().timestamp_millis();
        self.steps.push(AgentStep {
            agent: agent.to_string(),
            action: action.into(),
            status: StepStatus::Completed,
            start_time: now,
            end_time: Some(now),
            details: Some(details.into()),
            data: None,
        });
    }

    fn finish(&mut self, index: usize, status: StepStatus, details: String, data: Option<Value>) {
        if let Some(step) = self.steps.get_mut(index) {
            step.status = status;
            step.end_time = Some(Utc::now().timestamp_millis());
            step.details = Some(details);
            if data.is_some() {
                step.data = data;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[AgentStep] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<AgentStep> {
        self.steps
    }
}
