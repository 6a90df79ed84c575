//! Structural validation of workflow graphs.
//!
//! Runs before activation; activation is refused while any problem
//! remains. Problems are collected into a list rather than failing on the
//! first one, so the builder UI can show everything at once.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::models::workflow::WorkflowGraph;

#[derive(Debug, Clone, Serialize)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition_id: Option<i64>,
}

impl ValidationError {
    fn graph(code: &'static str, message: String) -> Self {
        ValidationError { code, message, stage_id: None, transition_id: None }
    }

    fn stage(code: &'static str, message: String, stage_id: i64) -> Self {
        ValidationError { code, message, stage_id: Some(stage_id), transition_id: None }
    }

    fn transition(code: &'static str, message: String, transition_id: i64) -> Self {
        ValidationError { code, message, stage_id: None, transition_id: Some(transition_id) }
    }
}

/// Validate a workflow graph. Returns an empty list when the graph is
/// structurally sound.
pub fn validate(graph: &WorkflowGraph, known_permissions: &HashSet<String>) -> Vec<ValidationError> {
    let mut problems = Vec::new();

    if graph.stages.is_empty() {
        problems.push(ValidationError::graph(
            "empty_workflow",
            "Workflow has no stages".to_string(),
        ));
        return problems;
    }

    // Transition endpoints must be stages of this workflow.
    let stage_ids: HashSet<i64> = graph.stages.iter().map(|s| s.id).collect();
    for t in &graph.transitions {
        if !stage_ids.contains(&t.source_stage_id) || !stage_ids.contains(&t.target_stage_id) {
            problems.push(ValidationError::transition(
                "dangling_endpoint",
                format!("Transition '{}' references a stage outside this workflow", t.name),
                t.id,
            ));
        }
    }

    // Exactly one entry stage (no incoming transitions, revision
    // self-loops excluded). Extra candidates are orphans: nothing leads
    // to them.
    let entries = graph.entry_candidates();
    match entries.len() {
        0 => problems.push(ValidationError::graph(
            "no_entry_stage",
            "No entry stage: every stage has incoming transitions".to_string(),
        )),
        1 => {}
        _ => {
            for stage in &entries[1..] {
                problems.push(ValidationError::stage(
                    "orphan_stage",
                    format!("Stage '{}' has no incoming transitions", stage.name),
                    stage.id,
                ));
            }
        }
    }

    // Reachability from the entry stage.
    if let Some(entry) = entries.first() {
        let mut seen: HashSet<i64> = HashSet::new();
        let mut queue = VecDeque::from([entry.id]);
        while let Some(stage_id) = queue.pop_front() {
            if !seen.insert(stage_id) {
                continue;
            }
            for t in graph.outgoing(stage_id) {
                if stage_ids.contains(&t.target_stage_id) {
                    queue.push_back(t.target_stage_id);
                }
            }
        }

        for stage in &graph.stages {
            if !seen.contains(&stage.id) {
                problems.push(ValidationError::stage(
                    "unreachable_stage",
                    format!("Stage '{}' is not reachable from the entry stage", stage.name),
                    stage.id,
                ));
            }
        }

        let terminal_reachable = seen.iter().any(|&id| graph.is_terminal(id));
        if !terminal_reachable {
            problems.push(ValidationError::graph(
                "no_terminal_reachable",
                "No terminal stage is reachable from the entry stage".to_string(),
            ));
        }
    }

    // Duplicate transition names from the same source.
    let mut names_seen: HashSet<(i64, &str)> = HashSet::new();
    for t in &graph.transitions {
        if !names_seen.insert((t.source_stage_id, t.name.as_str())) {
            problems.push(ValidationError::transition(
                "duplicate_transition_name",
                format!("Duplicate transition name '{}' from the same stage", t.name),
                t.id,
            ));
        }
    }

    for t in &graph.transitions {
        // Self-loops only as explicit revision transitions.
        if t.is_self_loop() && !t.is_revision {
            problems.push(ValidationError::transition(
                "self_loop",
                format!("Transition '{}' targets its own source without the revision flag", t.name),
                t.id,
            ));
        }

        // Automatic transitions are never actor-gated.
        if t.is_automatic && !t.required_permissions.is_empty() {
            problems.push(ValidationError::transition(
                "automatic_with_permissions",
                format!("Automatic transition '{}' must not require permissions", t.name),
                t.id,
            ));
        }

        for code in &t.required_permissions {
            if !known_permissions.contains(code) {
                problems.push(ValidationError::transition(
                    "unknown_permission",
                    format!("Transition '{}' requires unknown permission '{}'", t.name, code),
                    t.id,
                ));
            }
        }
    }

    problems
}
