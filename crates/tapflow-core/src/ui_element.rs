//! C2: the normalized, stable-identity UI element model, and the identity
//! algorithm that §4.1 calls `UiExtractor`.
//!
//! The actual screen-XML parsing is an external capability (out of scope,
//! §1) — `DeviceController::screenshot` is expected to hand back an
//! already-parsed tree (`RawUiNode`). What lives here is the *deterministic
//! projection* from that tree to the identity-bearing `UiElement` list: the
//! actionability filter, the clickable/focusable co-location dedup, and the
//! `elem_id`/`classPath` composite computation.

use serde::{Deserialize, Serialize};

/// Binary enabled/disabled state, used for both `checked` and `focused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleState {
    Enabled,
    Disabled,
}

impl ToggleState {
    fn from_bool(b: bool) -> Self {
        if b { Self::Enabled } else { Self::Disabled }
    }
}

/// A rectangular pixel bound, inclusive on both corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bbox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Bbox {
    pub fn center(&self) -> (i32, i32) {
        ((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    fn distance_to(&self, other: &Bbox) -> f64 {
        let (cx1, cy1) = self.center();
        let (cx2, cy2) = other.center();
        (((cx1 - cx2).pow(2) + (cy1 - cy2).pow(2)) as f64).sqrt()
    }
}

/// An already-parsed node from the platform's UI tree, as handed back by the
/// `DeviceController`/`UiExtractor` external capability. Opaque to the agent
/// beyond the attributes needed for the identity algorithm.
#[derive(Debug, Clone, Default)]
pub struct RawUiNode {
    pub class_name: String,
    pub bounds: Bbox,
    pub resource_id: Option<String>,
    pub content_desc: Option<String>,
    pub text: Option<String>,
    pub clickable: bool,
    pub long_clickable: bool,
    pub scrollable: bool,
    pub focusable: bool,
    pub enabled: bool,
    pub visible: bool,
    pub children: Vec<RawUiNode>,
}

impl RawUiNode {
    fn is_actionable(&self) -> bool {
        self.enabled
            && self.visible
            && (self.clickable || self.long_clickable || self.scrollable || self.focusable)
    }

    fn is_clickable_class(&self) -> bool {
        self.clickable || self.long_clickable || self.scrollable
    }

    fn semantic_attrs(&self) -> Option<String> {
        let parts: Vec<&str> = [
            self.resource_id.as_deref(),
            self.text.as_deref(),
            self.content_desc.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }

    /// Find the first descendant (pre-order) carrying semantic attrs, for
    /// the target-node-only inheritance fallback in `elem_id`.
    fn first_semantic_descendant(&self) -> Option<String> {
        for child in &self.children {
            if let Some(s) = child.semantic_attrs() {
                return Some(s);
            }
            if let Some(s) = child.first_semantic_descendant() {
                return Some(s);
            }
        }
        None
    }

    fn own_identity_segment(&self, allow_descendant_fallback: bool) -> String {
        if let Some(attrs) = self.semantic_attrs() {
            return attrs;
        }
        if allow_descendant_fallback {
            if let Some(inherited) = self.first_semantic_descendant() {
                return inherited;
            }
        }
        format!("{}_{}x{}", self.class_name, self.bounds.width(), self.bounds.height())
    }
}

/// A normalized, stably-identified interactive screen element (§3 UiElement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiElement {
    pub elem_id: String,
    pub bbox: Bbox,
    pub class_path: String,
    pub checked: ToggleState,
    pub focused: ToggleState,
    pub resource_id: Option<String>,
    pub content_desc: Option<String>,
    pub text: Option<String>,
}

impl UiElement {
    pub fn center(&self) -> (i32, i32) {
        self.bbox.center()
    }

    /// The identity-projection used for `WorkNode::elements_info` (§3): the
    /// graph key is `classPath + semantic attrs`, never bbox or center.
    pub fn identity_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.class_path,
            self.resource_id.as_deref().unwrap_or(""),
            self.content_desc.as_deref().unwrap_or(""),
            self.text.as_deref().unwrap_or("")
        )
    }
}

/// Extract the ordered, stably-identified interactive elements from a
/// parsed screen tree. Pure: identical trees yield identical output (§8
/// "`extractElements(s)` is a function").
pub fn extract_elements(root: &RawUiNode) -> Vec<UiElement> {
    let mut candidates = Vec::new();
    collect_candidates(root, &[], &mut candidates);
    dedup_colocated(candidates)
}

fn collect_candidates<'a>(
    node: &'a RawUiNode,
    ancestors: &[&'a RawUiNode],
    out: &mut Vec<UiElement>,
) {
    if node.is_actionable() {
        out.push(build_element(node, ancestors));
    }

    let mut next_ancestors = ancestors.to_vec();
    next_ancestors.push(node);
    for child in &node.children {
        collect_candidates(child, &next_ancestors, out);
    }
}

fn build_element(node: &RawUiNode, ancestors: &[&RawUiNode]) -> UiElement {
    // classPath: each ancestor contributes its own identity segment (no
    // descendant fallback); the node itself is the final step and may
    // inherit from a descendant since it is the emitted target.
    let mut path_segments: Vec<String> = ancestors
        .iter()
        .map(|a| a.own_identity_segment(false))
        .collect();
    path_segments.push(node.own_identity_segment(true));
    let class_path = path_segments.join(">");

    // elem_id: the node's own composite, prefixed by the parent's composite
    // if the parent itself carries one.
    let own = node.own_identity_segment(true);
    let elem_id = match ancestors.last() {
        Some(parent) => match parent.semantic_attrs() {
            Some(parent_attrs) => format!("{}>{}", parent_attrs, own),
            None => own,
        },
        None => own,
    };

    UiElement {
        elem_id,
        bbox: node.bounds,
        class_path,
        checked: ToggleState::from_bool(node.clickable && node.enabled),
        focused: ToggleState::from_bool(node.focusable),
        resource_id: node.resource_id.clone(),
        content_desc: node.content_desc.clone(),
        text: node.text.clone(),
    }
}

const COLOCATION_DISTANCE_PX: f64 = 30.0;

fn dedup_colocated(candidates: Vec<UiElement>) -> Vec<UiElement> {
    let clickable_like: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, e)| e.checked == ToggleState::Enabled)
        .map(|(i, _)| i)
        .collect();

    candidates
        .iter()
        .enumerate()
        .filter(|(i, e)| {
            if e.checked == ToggleState::Enabled {
                return true;
            }
            // focusable-only candidate: drop if a clickable-like candidate
            // sits within the colocation distance with the same semantic
            // identity.
            !clickable_like.iter().any(|&j| {
                let other = &candidates[j];
                j != *i
                    && e.bbox.distance_to(&other.bbox) <= COLOCATION_DISTANCE_PX
                    && e.resource_id == other.resource_id
                    && e.content_desc == other.content_desc
                    && e.text == other.text
            })
        })
        .map(|(_, e)| e.clone())
        .collect()
}
