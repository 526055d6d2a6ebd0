use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::country_data::CountryRecord;
use crate::document::NodeId;

/// Stable address of a [`GeoNode`] inside an [`Atlas`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeoKey(usize);

impl GeoKey {
    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Country,
    Province,
    Subprovince,
    Label,
}

/// National outline of a country. A grouped border keeps its drawable parts.
#[derive(Debug, Clone, PartialEq)]
pub struct Border {
    pub element: NodeId,
    pub parts: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Country {
    pub code: String,
    pub element: NodeId,
    pub record: Option<CountryRecord>,
    pub border: Option<Border>,
    pub provinces: Vec<GeoKey>,
    /// Circle markers standing in for microstates.
    pub markers: Vec<NodeId>,
    pub label: Option<GeoKey>,
    /// Countries drawn as a single shape (no provinces) take their own fill.
    pub update_color: Option<String>,
}

impl Country {
    pub fn name(&self) -> &str {
        self.record
            .as_ref()
            .map(|record| record.name.as_str())
            .unwrap_or(&self.code)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Province {
    pub id: String,
    pub element: NodeId,
    pub country: GeoKey,
    /// `Some` when the province is a group of subprovinces.
    pub subprovinces: Option<Vec<GeoKey>>,
    pub update_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subprovince {
    pub id: String,
    pub element: NodeId,
    pub country: GeoKey,
    pub province: GeoKey,
    pub update_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub code: String,
    pub element: NodeId,
    pub text: String,
    pub microstate: bool,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeoNode {
    Country(Country),
    Province(Province),
    Subprovince(Subprovince),
    Label(Label),
}

impl GeoNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Country(_) => NodeKind::Country,
            Self::Province(_) => NodeKind::Province,
            Self::Subprovince(_) => NodeKind::Subprovince,
            Self::Label(_) => NodeKind::Label,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Country(c) => &c.code,
            Self::Province(p) => &p.id,
            Self::Subprovince(s) => &s.id,
            Self::Label(l) => &l.code,
        }
    }

    pub fn element(&self) -> NodeId {
        match self {
            Self::Country(c) => c.element,
            Self::Province(p) => p.element,
            Self::Subprovince(s) => s.element,
            Self::Label(l) => l.element,
        }
    }

    pub fn update_color(&self) -> Option<&str> {
        match self {
            Self::Country(c) => c.update_color.as_deref(),
            Self::Province(p) => p.update_color.as_deref(),
            Self::Subprovince(s) => s.update_color.as_deref(),
            Self::Label(_) => None,
        }
    }

    fn update_color_mut(&mut self) -> Option<&mut Option<String>> {
        match self {
            Self::Country(c) => Some(&mut c.update_color),
            Self::Province(p) => Some(&mut p.update_color),
            Self::Subprovince(s) => Some(&mut s.update_color),
            Self::Label(_) => None,
        }
    }
}

/// What a document element belongs to, for routing pointer events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hit {
    /// A province, subprovince, or a country drawn as one shape.
    Area(GeoKey),
    Border { country: GeoKey },
    Marker { country: GeoKey, element: NodeId },
    Label(GeoKey),
}

/// `groupKey -> subgroup -> code -> country`.
pub type CountryGroups = BTreeMap<String, BTreeMap<String, BTreeMap<String, GeoKey>>>;

/// Arena of every [`GeoNode`] plus the lookup indices built over it.
#[derive(Debug, Clone, Default)]
pub struct Atlas {
    nodes: Vec<GeoNode>,
    pub countries: BTreeMap<String, GeoKey>,
    pub country_labels: BTreeMap<String, GeoKey>,
    pub country_groups: CountryGroups,
    pub world: Option<NodeId>,
    pub ocean: Option<NodeId>,
    pub label_layer: Option<NodeId>,
    /// Overlay group for caller-drawn shapes.
    pub shapes: Option<NodeId>,
    elements: HashMap<NodeId, Hit>,
}

impl Atlas {
    pub fn push(&mut self, node: GeoNode) -> GeoKey {
        let key = GeoKey(self.nodes.len());
        self.nodes.push(node);
        key
    }

    pub fn register_element(&mut self, element: NodeId, hit: Hit) {
        self.elements.insert(element, hit);
    }

    pub fn unregister_element(&mut self, element: NodeId) {
        self.elements.remove(&element);
    }

    pub fn hit(&self, element: NodeId) -> Option<Hit> {
        self.elements.get(&element).copied()
    }

    pub fn get(&self, key: GeoKey) -> Option<&GeoNode> {
        self.nodes.get(key.0)
    }

    pub fn get_mut(&mut self, key: GeoKey) -> Option<&mut GeoNode> {
        self.nodes.get_mut(key.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn country(&self, key: GeoKey) -> Option<&Country> {
        match self.get(key)? {
            GeoNode::Country(country) => Some(country),
            _ => None,
        }
    }

    pub fn country_mut(&mut self, key: GeoKey) -> Option<&mut Country> {
        match self.get_mut(key)? {
            GeoNode::Country(country) => Some(country),
            _ => None,
        }
    }

    pub fn province(&self, key: GeoKey) -> Option<&Province> {
        match self.get(key)? {
            GeoNode::Province(province) => Some(province),
            _ => None,
        }
    }

    pub fn label(&self, key: GeoKey) -> Option<&Label> {
        match self.get(key)? {
            GeoNode::Label(label) => Some(label),
            _ => None,
        }
    }

    pub fn label_mut(&mut self, key: GeoKey) -> Option<&mut Label> {
        match self.get_mut(key)? {
            GeoNode::Label(label) => Some(label),
            _ => None,
        }
    }

    pub fn country_by_code(&self, code: &str) -> Option<&Country> {
        self.countries.get(code).and_then(|key| self.country(*key))
    }

    /// Owning country. A country owns itself, so border and province logic
    /// can treat both uniformly.
    pub fn owner(&self, key: GeoKey) -> Option<GeoKey> {
        match self.get(key)? {
            GeoNode::Country(_) => Some(key),
            GeoNode::Province(p) => Some(p.country),
            GeoNode::Subprovince(s) => Some(s.country),
            GeoNode::Label(l) => self.countries.get(&l.code).copied(),
        }
    }

    pub fn parent_province(&self, key: GeoKey) -> Option<GeoKey> {
        match self.get(key)? {
            GeoNode::Subprovince(s) => Some(s.province),
            _ => None,
        }
    }

    /// Resolve a bare identifier: countries first, then a scan of every
    /// country's province list.
    pub fn find(&self, id: &str) -> Option<GeoKey> {
        if let Some(key) = self.countries.get(id) {
            return Some(*key);
        }
        self.countries
            .values()
            .filter_map(|key| self.country(*key))
            .flat_map(|country| country.provinces.iter().copied())
            .find(|key| self.get(*key).is_some_and(|node| node.id() == id))
    }

    /// Every fillable node a state change on `key` reaches, in paint order.
    pub fn areas(&self, key: GeoKey) -> Vec<GeoKey> {
        let mut out = Vec::new();
        match self.get(key) {
            Some(GeoNode::Country(country)) => {
                if country.provinces.is_empty() {
                    if self.is_single_shape(country) {
                        out.push(key);
                    }
                } else {
                    for province in &country.provinces {
                        self.push_province_areas(*province, &mut out);
                    }
                }
            }
            Some(GeoNode::Province(_)) => self.push_province_areas(key, &mut out),
            Some(GeoNode::Subprovince(_)) => out.push(key),
            Some(GeoNode::Label(_)) | None => {}
        }
        out
    }

    fn push_province_areas(&self, key: GeoKey, out: &mut Vec<GeoKey>) {
        out.push(key);
        if let Some(GeoNode::Province(province)) = self.get(key)
            && let Some(subprovinces) = &province.subprovinces
        {
            out.extend(subprovinces.iter().copied());
        }
    }

    fn is_single_shape(&self, country: &Country) -> bool {
        matches!(self.hit(country.element), Some(Hit::Area(_)))
    }

    /// Targets that take a fill from an update keyed by `key`: a flat province
    /// (or single-shape country) itself, otherwise everything beneath it.
    pub fn update_targets(&self, key: GeoKey) -> Vec<GeoKey> {
        match self.get(key) {
            Some(GeoNode::Country(country)) if country.provinces.is_empty() => {
                if self.is_single_shape(country) {
                    vec![key]
                } else {
                    Vec::new()
                }
            }
            Some(GeoNode::Province(province)) => match &province.subprovinces {
                Some(subprovinces) => subprovinces.clone(),
                None => vec![key],
            },
            Some(GeoNode::Label(_)) | None => Vec::new(),
            Some(_) => self.areas(key),
        }
    }

    pub fn set_update_color(&mut self, key: GeoKey, color: Option<String>) {
        if let Some(slot) = self.get_mut(key).and_then(GeoNode::update_color_mut) {
            *slot = color;
        }
    }

    /// Every node carrying an update color override.
    pub fn colored(&self) -> Vec<GeoKey> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.update_color().is_some())
            .map(|(index, _)| GeoKey(index))
            .collect()
    }

    /// Drop a country and its label from every index.
    pub fn forget_country(&mut self, code: &str) -> Option<GeoKey> {
        let key = self.countries.remove(code)?;
        if let Some(label) = self.country_labels.remove(code)
            && let Some(element) = self.label(label).map(|l| l.element)
        {
            self.unregister_element(element);
        }
        for groups in self.country_groups.values_mut() {
            for members in groups.values_mut() {
                members.remove(code);
            }
        }
        let elements: Vec<NodeId> = self
            .elements
            .iter()
            .filter(|(_, hit)| self.hit_country(**hit) == Some(key))
            .map(|(element, _)| *element)
            .collect();
        for element in elements {
            self.unregister_element(element);
        }
        Some(key)
    }

    fn hit_country(&self, hit: Hit) -> Option<GeoKey> {
        match hit {
            Hit::Area(key) | Hit::Label(key) => self.owner(key),
            Hit::Border { country } | Hit::Marker { country, .. } => Some(country),
        }
    }

    pub fn iter_countries(&self) -> impl Iterator<Item = (&str, &Country)> {
        self.countries
            .iter()
            .filter_map(|(code, key)| self.country(*key).map(|c| (code.as_str(), c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Atlas, GeoKey, GeoKey, GeoKey, GeoKey) {
        let mut atlas = Atlas::default();
        let de = atlas.push(GeoNode::Country(Country {
            code: "DE".to_string(),
            element: NodeId::from_index(1),
            record: None,
            border: None,
            provinces: Vec::new(),
            markers: Vec::new(),
            label: None,
            update_color: None,
        }));
        let by = atlas.push(GeoNode::Province(Province {
            id: "DE-BY".to_string(),
            element: NodeId::from_index(2),
            country: de,
            subprovinces: None,
            update_color: None,
        }));
        let nw = atlas.push(GeoNode::Province(Province {
            id: "DE-NW".to_string(),
            element: NodeId::from_index(3),
            country: de,
            subprovinces: Some(Vec::new()),
            update_color: None,
        }));
        let koeln = atlas.push(GeoNode::Subprovince(Subprovince {
            id: "DE-NW-K".to_string(),
            element: NodeId::from_index(4),
            country: de,
            province: nw,
            update_color: None,
        }));
        if let Some(GeoNode::Province(p)) = atlas.get_mut(nw) {
            p.subprovinces = Some(vec![koeln]);
        }
        if let Some(c) = atlas.country_mut(de) {
            c.provinces = vec![by, nw];
        }
        atlas.countries.insert("DE".to_string(), de);
        (atlas, de, by, nw, koeln)
    }

    #[test]
    fn owner_is_self_for_countries() {
        let (atlas, de, by, _, koeln) = sample();
        assert_eq!(atlas.owner(de), Some(de));
        assert_eq!(atlas.owner(by), Some(de));
        assert_eq!(atlas.owner(koeln), Some(de));
    }

    #[test]
    fn find_falls_back_to_provinces() {
        let (atlas, de, by, nw, _) = sample();
        assert_eq!(atlas.find("DE"), Some(de));
        assert_eq!(atlas.find("DE-BY"), Some(by));
        assert_eq!(atlas.find("DE-NW"), Some(nw));
        assert_eq!(atlas.find("DE-NW-K"), None);
        assert_eq!(atlas.find("de"), None);
    }

    #[test]
    fn areas_cascade_to_subprovinces() {
        let (atlas, de, by, nw, koeln) = sample();
        assert_eq!(atlas.areas(de), vec![by, nw, koeln]);
        assert_eq!(atlas.areas(nw), vec![nw, koeln]);
        assert_eq!(atlas.update_targets(nw), vec![koeln]);
        assert_eq!(atlas.update_targets(by), vec![by]);
        assert_eq!(atlas.update_targets(de), vec![by, nw, koeln]);
    }

    #[test]
    fn update_color_round_trip() {
        let (mut atlas, _, by, _, koeln) = sample();
        atlas.set_update_color(by, Some("#ff0000".to_string()));
        atlas.set_update_color(koeln, Some("#00ff00".to_string()));
        assert_eq!(atlas.colored(), vec![by, koeln]);
        atlas.set_update_color(by, None);
        assert_eq!(atlas.colored(), vec![koeln]);
    }
}
