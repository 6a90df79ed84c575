use serde::{Deserialize, Serialize};

use crate::workflow::conditions::Condition;

/// A named, versioned admissions process definition for one application
/// type. At most one workflow per type is active at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: i64,
    pub name: String,
    pub application_type: String,
    pub is_active: bool,
    pub created_by: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Event-name/audience pair dispatched when an application enters a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTrigger {
    pub event: String,
    pub audience: String,
}

/// A node in the workflow graph. `sequence` is display order only;
/// reachability is defined entirely by transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStage {
    pub id: i64,
    pub workflow_id: i64,
    pub name: String,
    pub sequence: i64,
    pub required_documents: Vec<String>,
    pub required_actions: Vec<String>,
    pub notification_triggers: Vec<NotificationTrigger>,
    pub assigned_role: String,
}

/// A directed, conditioned edge between two stages of the same workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTransition {
    pub id: i64,
    pub workflow_id: i64,
    pub source_stage_id: i64,
    pub target_stage_id: i64,
    pub name: String,
    pub conditions: Vec<Condition>,
    pub required_permissions: Vec<String>,
    pub is_automatic: bool,
    pub is_revision: bool,
}

impl WorkflowTransition {
    pub fn is_self_loop(&self) -> bool {
        self.source_stage_id == self.target_stage_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStage {
    pub name: String,
    pub sequence: i64,
    #[serde(default)]
    pub required_documents: Vec<String>,
    #[serde(default)]
    pub required_actions: Vec<String>,
    #[serde(default)]
    pub notification_triggers: Vec<NotificationTrigger>,
    #[serde(default)]
    pub assigned_role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransition {
    pub source_stage_id: i64,
    pub target_stage_id: i64,
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub required_permissions: Vec<String>,
    #[serde(default)]
    pub is_automatic: bool,
    #[serde(default)]
    pub is_revision: bool,
}

/// Fully decoded definition graph for one workflow, re-read fresh for
/// every engine call.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowGraph {
    pub workflow: Workflow,
    pub stages: Vec<WorkflowStage>,
    pub transitions: Vec<WorkflowTransition>,
}

impl WorkflowGraph {
    pub fn stage(&self, stage_id: i64) -> Option<&WorkflowStage> {
        self.stages.iter().find(|s| s.id == stage_id)
    }

    /// Outgoing transitions of a stage, in ascending id order. The id
    /// order is the documented tie-break for automatic evaluation.
    pub fn outgoing(&self, stage_id: i64) -> Vec<&WorkflowTransition> {
        let mut out: Vec<&WorkflowTransition> = self
            .transitions
            .iter()
            .filter(|t| t.source_stage_id == stage_id)
            .collect();
        out.sort_by_key(|t| t.id);
        out
    }

    /// Incoming transitions, ignoring revision self-loops so a re-entry
    /// edge does not disqualify a stage from being the entry stage.
    pub fn incoming(&self, stage_id: i64) -> Vec<&WorkflowTransition> {
        self.transitions
            .iter()
            .filter(|t| t.target_stage_id == stage_id && !(t.is_revision && t.is_self_loop()))
            .collect()
    }

    /// A stage with no outgoing transitions is terminal.
    pub fn is_terminal(&self, stage_id: i64) -> bool {
        self.outgoing(stage_id).is_empty()
    }

    /// Stages with no (non-revision) incoming transitions. A valid graph
    /// has exactly one; the validator enforces that.
    pub fn entry_candidates(&self) -> Vec<&WorkflowStage> {
        self.stages
            .iter()
            .filter(|s| self.incoming(s.id).is_empty())
            .collect()
    }
}

/// Transition info offered to callers of available_transitions.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionSummary {
    pub id: i64,
    pub name: String,
    pub target_stage_id: i64,
    pub target_stage_name: String,
    pub is_automatic: bool,
    pub is_revision: bool,
    pub required_permissions: Vec<String>,
}
