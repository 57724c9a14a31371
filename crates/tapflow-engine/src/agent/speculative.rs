//! C9: `SpeculativeExecutor` — proposes likely next actions from historical
//! workflows that resemble the current one, without ever writing to memory
//! (§4.8). Read-only: this module never mutates an `ActionMemory`.

use rand::Rng;
use std::collections::HashSet;

use tapflow_core::memory::Workflow;
use tapflow_core::ui_element::UiElement;

const SIMILARITY_THRESHOLD: f64 = 0.7;
const CONFIDENCE_THRESHOLD: f64 = 0.6;
const MAX_CANDIDATES: usize = 2;

/// One speculative candidate, labeled by its rank past the current planning
/// position (`p+1` is `"B<j>"`, `p+2` is `"C<j>"`, §4.8).
#[derive(Debug, Clone)]
pub struct SpeculativeCandidate {
    pub label: String,
    pub description: String,
    pub confidence: f64,
}

/// Jaccard-like similarity over the non-empty content attributes of two
/// element sets: `|A ∩ B| / |A ∪ B|` on `identity_key()`s (§4.8).
pub fn similarity(a: &[UiElement], b: &[UiElement]) -> f64 {
    let set_a: HashSet<String> = a.iter().map(UiElement::identity_key).filter(|k| !k.is_empty()).collect();
    let set_b: HashSet<String> = b.iter().map(UiElement::identity_key).filter(|k| !k.is_empty()).collect();

    if set_a.is_empty() && set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 { 0.0 } else { intersection as f64 / union as f64 }
}

/// §4.8's confidence formula: starts near-certain on the first step,
/// decays as the candidate moves further out, bonused if the historical
/// transition it's drawn from itself succeeded, and jittered by a small
/// uniform term to avoid tied rankings. Clamped to `[0, 1]`.
pub fn candidate_confidence(step_offset: usize, historical_success: bool, rng: &mut impl Rng) -> f64 {
    let base = 0.8 - 0.1 * (step_offset as f64 - 1.0);
    let success_term = if historical_success { 0.1 } else { -0.2 };
    let jitter = rng.gen_range(-0.05..=0.05);
    (base + success_term + jitter).clamp(0.0, 1.0)
}

fn candidate_label(step_offset: usize, j: usize) -> String {
    let letter = match step_offset {
        1 => 'B',
        2 => 'C',
        _ => 'D',
    };
    format!("{letter}{j}")
}

/// Find the best-matching historical workflow for `current_app`'s current
/// screen, and propose up to `MAX_CANDIDATES` upcoming actions from it
/// (§4.8). For every transition `t_i` in every candidate workflow, `t_i`'s
/// `fromNodeId` is resolved via `node_elements` back to that node's
/// `elements_info`, and compared against `current_elements`; the single
/// globally best-matching position wins (§4.8 steps 1-3). Never mutates
/// anything the caller passes in; `node_elements` is a read-only lookup
/// (e.g. `ActionMemory::node_elements`).
pub fn speculate<'a>(
    workflows: &[&'a Workflow],
    current_app: &str,
    current_elements: &[UiElement],
    node_elements: impl Fn(uuid::Uuid) -> Option<&'a [UiElement]>,
    rng: &mut impl Rng,
) -> Vec<SpeculativeCandidate> {
    let _ = current_app; // workflows are pre-filtered to the current app by the caller.

    let Some((workflow, position)) = best_match(workflows, current_elements, &node_elements) else {
        return Vec::new();
    };

    let mut candidates = Vec::new();
    for (j, offset) in (1..=MAX_CANDIDATES).enumerate() {
        let idx = position + offset;
        let Some(transition) = workflow.path.get(idx) else { break };
        let confidence = candidate_confidence(offset, transition.success, rng);
        if confidence < CONFIDENCE_THRESHOLD {
            continue;
        }
        candidates.push(SpeculativeCandidate {
            label: candidate_label(offset, j + 1),
            description: transition.action.description.clone(),
            confidence,
        });
    }
    candidates
}

/// Scan every transition of every candidate workflow and keep the single
/// best-matching `(workflow, path index)` pair exceeding `SIMILARITY_THRESHOLD`
/// (§4.8 step 3: "keep the single globally best match").
fn best_match<'a, 'w>(
    workflows: &[&'w Workflow],
    current_elements: &[UiElement],
    node_elements: &impl Fn(uuid::Uuid) -> Option<&'a [UiElement]>,
) -> Option<(&'w Workflow, usize)> {
    workflows
        .iter()
        .flat_map(|w| w.path.iter().enumerate().map(move |(i, t)| (*w, i, t.from)))
        .filter_map(|(w, i, from_node)| {
            let elements = node_elements(from_node)?;
            Some((w, i, similarity(current_elements, elements)))
        })
        .filter(|(_, _, sim)| *sim >= SIMILARITY_THRESHOLD)
        .max_by(|(_, _, a), (_, _, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(w, i, _)| (w, i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use tapflow_core::embed::HashingEmbedder;
    use tapflow_core::memory::{WorkAction, WorkflowRecorder};
    use tapflow_core::ui_element::{Bbox, ToggleState};
    use uuid::Uuid;

    fn elem(id: &str) -> UiElement {
        UiElement {
            elem_id: id.to_string(),
            bbox: Bbox { x1: 0, y1: 0, x2: 10, y2: 10 },
            class_path: "android.widget.Button".to_string(),
            checked: ToggleState::Enabled,
            focused: ToggleState::Disabled,
            resource_id: None,
            content_desc: None,
            text: Some(id.to_string()),
        }
    }

    #[test]
    fn similarity_is_one_for_identical_element_sets() {
        let a = vec![elem("x"), elem("y")];
        assert_eq!(similarity(&a, &a), 1.0);
    }

    #[test]
    fn similarity_is_zero_for_disjoint_element_sets() {
        let a = vec![elem("x")];
        let b = vec![elem("y")];
        assert_eq!(similarity(&a, &b), 0.0);
    }

    #[test]
    fn confidence_decays_with_step_offset() {
        let mut rng = StdRng::seed_from_u64(1);
        let near = candidate_confidence(1, true, &mut rng);
        let far = candidate_confidence(2, true, &mut rng);
        assert!(near >= far - 0.2);
    }

    #[test]
    fn confidence_is_always_in_unit_range() {
        let mut rng = StdRng::seed_from_u64(42);
        for offset in 1..5 {
            let c = candidate_confidence(offset, false, &mut rng);
            assert!((0.0..=1.0).contains(&c));
        }
    }

    #[test]
    fn speculate_returns_empty_when_no_workflow_matches() {
        let mut rng = StdRng::seed_from_u64(7);
        let candidates = speculate(&[], "com.example.app", &[], |_| None, &mut rng);
        assert!(candidates.is_empty());
    }

    #[test]
    fn speculate_caps_candidates_at_two_and_matches_on_node_elements() {
        let embedder = HashingEmbedder::default();
        let mut recorder = WorkflowRecorder::new("order food", None, &embedder);
        let mut nodes: HashMap<Uuid, Vec<UiElement>> = HashMap::new();

        let n0 = Uuid::new_v4();
        recorder.on_new_node(n0).unwrap();
        nodes.insert(n0, vec![elem("btn_0")]);
        for i in 0..4 {
            let next = Uuid::new_v4();
            recorder
                .on_action_executed(next, WorkAction::tap(format!("btn_{i}"), "tap"), true)
                .unwrap();
            recorder.on_new_node(next).unwrap_or(());
            nodes.insert(next, vec![elem(&format!("btn_{}", i + 1))]);
        }
        let workflow = recorder.into_workflow();
        let current_elements = vec![elem("btn_0")];
        let mut rng = StdRng::seed_from_u64(3);
        let candidates = speculate(
            &[&workflow],
            "com.example.app",
            &current_elements,
            |id| nodes.get(&id).map(|v| v.as_slice()),
            &mut rng,
        );
        assert!(!candidates.is_empty());
        assert!(candidates.len() <= MAX_CANDIDATES);
    }

    #[test]
    fn speculate_ignores_nodes_the_lookup_cannot_resolve() {
        let mut rng = StdRng::seed_from_u64(11);
        let embedder = HashingEmbedder::default();
        let mut recorder = WorkflowRecorder::new("order food", None, &embedder);
        let n0 = Uuid::new_v4();
        let n1 = Uuid::new_v4();
        recorder.on_new_node(n0).unwrap();
        recorder.on_action_executed(n1, WorkAction::tap("btn_0", "tap"), true).unwrap();
        let workflow = recorder.into_workflow();

        let candidates = speculate(&[&workflow], "com.example.app", &[elem("btn_0")], |_| None, &mut rng);
        assert!(candidates.is_empty());
    }
}
