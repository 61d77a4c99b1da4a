//! Party assignment.
//!
//! A box references a party by name only. The registry holding the shared
//! party configuration lives separately, so a box may point at a name the
//! registry no longer knows; such references are dangling and render as
//! unassigned without anything being deleted.

use crate::scene::{Scene, SceneBox};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How members of a party take the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakingMode {
    #[default]
    Sequential,
    Random,
    Simultaneous,
}

/// A named group identity with shared behavioural configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub speaking_mode: SpeakingMode,
    #[serde(default)]
    pub has_representative: bool,
    #[serde(default)]
    pub enable_backchannel: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub representative_speaker: Option<String>,
    #[serde(default)]
    pub participant_ids: Vec<String>,
}

impl Party {
    /// Configuration used when neither the box nor the registry knows the
    /// party.
    pub fn from_template(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: default_description(name),
            speaking_mode: SpeakingMode::default(),
            has_representative: false,
            enable_backchannel: false,
            representative_speaker: None,
            participant_ids: Vec::new(),
        }
    }
}

/// Default description for a party with no configuration of its own.
pub fn default_description(name: &str) -> String {
    format!(
        "Members of {} share a common position and speak on its behalf.",
        name
    )
}

/// Registry of known parties, keyed by unique name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyRegistry {
    parties: BTreeMap<String, Party>,
}

impl PartyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Party> {
        self.parties.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parties.contains_key(name)
    }

    /// Inserts or replaces a party, keyed by its name.
    pub fn upsert(&mut self, party: Party) {
        self.parties.insert(party.name.clone(), party);
    }

    /// Removes a party. Boxes referencing it are left untouched.
    pub fn remove(&mut self, name: &str) -> Option<Party> {
        self.parties.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parties.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Party> {
        self.parties.values()
    }

    pub fn len(&self) -> usize {
        self.parties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parties.is_empty()
    }
}

/// Resolves the configuration a box should carry for `party_name`.
///
/// Priority: the box's own snapshot (when it belongs to the same party),
/// then the registry entry, then the default template. Pure: nothing is
/// written.
pub fn resolve_party_config(
    scene_box: &SceneBox,
    registry: &PartyRegistry,
    party_name: &str,
) -> Party {
    if let Some(existing) = scene_box
        .party_config
        .as_ref()
        .filter(|config| config.name == party_name)
    {
        return existing.clone();
    }
    if let Some(entry) = registry.get(party_name) {
        return entry.clone();
    }
    let mut party = Party::from_template(party_name);
    party.participant_ids = scene_box
        .elements
        .iter()
        .filter_map(|e| e.avatar_data().map(|a| a.id.clone()))
        .collect();
    party
}

/// Assigns (or with `None`/empty, clears) the party of a box.
///
/// Assigning a name the registry does not know inserts it. Clearing removes
/// the configuration snapshot entirely.
pub fn assign_party(scene_box: &mut SceneBox, party_name: Option<&str>, registry: &mut PartyRegistry) {
    match party_name.filter(|name| !name.is_empty()) {
        Some(name) => {
            let config = resolve_party_config(scene_box, registry, name);
            if !registry.contains(name) {
                tracing::debug!("[Party] Registering new party: {}", name);
                registry.upsert(config.clone());
            }
            scene_box.party = Some(name.to_string());
            scene_box.party_config = Some(config);
        }
        None => {
            scene_box.party = None;
            scene_box.party_config = None;
        }
    }
}

/// Boxes of a scene grouped by the party they reference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartyGrouping {
    /// Party name to box ids, in scene order
    pub parties: BTreeMap<String, Vec<String>>,
    /// Boxes with no (or an empty) party reference
    pub unassigned: Vec<String>,
}

/// Derives the grouping-by-party view purely from `box.party`.
pub fn group_by_party(boxes: &[SceneBox]) -> PartyGrouping {
    let mut grouping = PartyGrouping::default();
    for scene_box in boxes {
        match scene_box.party_name() {
            Some(name) => grouping
                .parties
                .entry(name.to_string())
                .or_default()
                .push(scene_box.id.clone()),
            None => grouping.unassigned.push(scene_box.id.clone()),
        }
    }
    grouping
}

/// Party names referenced by boxes of `scene` that the registry lacks.
pub fn dangling_references(scene: &Scene, registry: &PartyRegistry) -> Vec<String> {
    let mut names: Vec<String> = scene
        .boxes
        .iter()
        .filter_map(|b| b.party_name())
        .filter(|name| !registry.contains(name))
        .map(str::to_string)
        .collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Rect;
    use crate::scene::{AvatarData, Element};

    fn avatar_box() -> SceneBox {
        let mut scene_box = SceneBox::new(Rect::new(0.0, 0.0, 30.0, 30.0));
        scene_box.elements = vec![Element::avatar(AvatarData::new("p-1", "Mai"))];
        scene_box
    }

    #[test]
    fn test_assign_new_party_registers_template() {
        let mut registry = PartyRegistry::new();
        let mut scene_box = avatar_box();

        assign_party(&mut scene_box, Some("Blue"), &mut registry);

        assert_eq!(scene_box.party.as_deref(), Some("Blue"));
        let config = scene_box.party_config.as_ref().unwrap();
        assert_eq!(config.description, default_description("Blue"));
        assert_eq!(config.participant_ids, vec!["p-1".to_string()]);
        assert!(registry.contains("Blue"));
    }

    #[test]
    fn test_registry_entry_wins_over_template() {
        let mut registry = PartyRegistry::new();
        let mut red = Party::from_template("Red");
        red.description = "The opposition".to_string();
        red.enable_backchannel = true;
        registry.upsert(red.clone());

        let mut scene_box = avatar_box();
        assign_party(&mut scene_box, Some("Red"), &mut registry);
        assert_eq!(scene_box.party_config, Some(red));
    }

    #[test]
    fn test_box_snapshot_wins_over_registry() {
        let mut registry = PartyRegistry::new();
        registry.upsert(Party::from_template("Red"));

        let mut scene_box = avatar_box();
        let mut custom = Party::from_template("Red");
        custom.description = "Edited on this box".to_string();
        scene_box.party_config = Some(custom.clone());

        let resolved = resolve_party_config(&scene_box, &registry, "Red");
        assert_eq!(resolved, custom);
        // A snapshot for another party does not apply.
        let resolved = resolve_party_config(&scene_box, &registry, "Green");
        assert_eq!(resolved.description, default_description("Green"));
    }

    #[test]
    fn test_resolve_is_side_effect_free() {
        let registry = PartyRegistry::new();
        let scene_box = avatar_box();
        let first = resolve_party_config(&scene_box, &registry, "Blue");
        let second = resolve_party_config(&scene_box, &registry, "Blue");
        assert_eq!(first, second);
        assert!(registry.is_empty());
        assert!(scene_box.party_config.is_none());
    }

    #[test]
    fn test_clear_removes_config_entirely() {
        let mut registry = PartyRegistry::new();
        let mut scene_box = avatar_box();
        assign_party(&mut scene_box, Some("Blue"), &mut registry);
        assign_party(&mut scene_box, None, &mut registry);
        assert!(scene_box.party.is_none());
        assert!(scene_box.party_config.is_none());

        let json = serde_json::to_value(&scene_box).unwrap();
        assert!(json.get("partyConfig").is_none());
        // The registry keeps the party for other boxes.
        assert!(registry.contains("Blue"));
    }

    #[test]
    fn test_empty_name_clears() {
        let mut registry = PartyRegistry::new();
        let mut scene_box = avatar_box();
        assign_party(&mut scene_box, Some("Blue"), &mut registry);
        assign_party(&mut scene_box, Some(""), &mut registry);
        assert!(scene_box.party_config.is_none());
    }

    #[test]
    fn test_grouping_treats_empty_as_unassigned() {
        let mut a = avatar_box();
        a.party = Some("Blue".to_string());
        let mut b = avatar_box();
        b.party = Some(String::new());
        let c = avatar_box();

        let grouping = group_by_party(&[a.clone(), b.clone(), c.clone()]);
        assert_eq!(grouping.parties.get("Blue"), Some(&vec![a.id.clone()]));
        assert_eq!(grouping.unassigned, vec![b.id, c.id]);
    }

    #[test]
    fn test_removed_party_leaves_dangling_reference() {
        let mut registry = PartyRegistry::new();
        let mut scene = crate::scene::Scene::new("Debate");
        let mut scene_box = avatar_box();
        assign_party(&mut scene_box, Some("Blue"), &mut registry);
        scene.boxes.push(scene_box);

        registry.remove("Blue");

        assert_eq!(scene.boxes[0].party.as_deref(), Some("Blue"));
        assert_eq!(dangling_references(&scene, &registry), vec!["Blue".to_string()]);
    }
}
