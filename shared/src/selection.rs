use crate::document::NodeId;
use crate::geo::{Atlas, GeoKey, GeoNode};
use crate::style::PaintState;

/// A surface a transition repaints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintTarget {
    Area(GeoKey),
    /// The national outline of the given country.
    Border(GeoKey),
    Marker { country: GeoKey, element: NodeId },
    Label(GeoKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paint {
    pub target: PaintTarget,
    pub state: PaintState,
}

/// Repaints produced by one transition, in application order. Hosts apply
/// them after the transition so the palette guard sees the final selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub paints: Vec<Paint>,
}

impl Transition {
    fn push_all(&mut self, targets: Vec<PaintTarget>, state: PaintState) {
        self.paints
            .extend(targets.into_iter().map(|target| Paint { target, state }));
    }
}

/// Global hover/selection state. At most one node is selected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    selected: Option<GeoKey>,
    hovered: Option<GeoKey>,
}

impl SelectionState {
    pub fn selected(&self) -> Option<GeoKey> {
        self.selected
    }

    pub fn hovered(&self) -> Option<GeoKey> {
        self.hovered
    }

    /// True when `target` is the selected node or lies beneath it.
    pub fn covers(&self, atlas: &Atlas, target: PaintTarget) -> bool {
        let Some(selected) = self.selected else {
            return false;
        };
        match target {
            PaintTarget::Area(key) => {
                key == selected
                    || atlas.owner(key) == Some(selected)
                    || atlas.parent_province(key) == Some(selected)
            }
            PaintTarget::Border(country) | PaintTarget::Marker { country, .. } => {
                country == selected
            }
            PaintTarget::Label(label) => atlas.owner(label) == Some(selected),
        }
    }

    pub fn enter(&mut self, atlas: &Atlas, target: GeoKey) -> Transition {
        self.hovered = Some(target);
        let mut transition = Transition::default();
        transition.push_all(cascade(atlas, target), PaintState::Over);
        transition
    }

    pub fn leave(&mut self, atlas: &Atlas, target: GeoKey) -> Transition {
        if self.hovered == Some(target) {
            self.hovered = None;
        }
        let mut transition = Transition::default();
        transition.push_all(cascade(atlas, target), PaintState::Out);
        transition
    }

    /// Select `target`, or deselect it when it already is the selection.
    pub fn activate(&mut self, atlas: &Atlas, target: GeoKey) -> Transition {
        let mut transition = Transition::default();
        if self.selected == Some(target) {
            self.selected = None;
            transition.push_all(cascade(atlas, target), PaintState::Out);
            return transition;
        }
        if let Some(old) = self.selected.replace(target) {
            transition.push_all(cascade(atlas, old), PaintState::Out);
        }
        transition.push_all(cascade(atlas, target), PaintState::Click);
        transition
    }
}

/// Every surface a state change on `key` reaches: a country's areas, border
/// and label; a province's own areas.
pub fn cascade(atlas: &Atlas, key: GeoKey) -> Vec<PaintTarget> {
    let mut targets: Vec<PaintTarget> = atlas
        .areas(key)
        .into_iter()
        .map(PaintTarget::Area)
        .collect();
    if let Some(GeoNode::Country(country)) = atlas.get(key) {
        if country.border.is_some() {
            targets.push(PaintTarget::Border(key));
        }
        if let Some(label) = country.label {
            targets.push(PaintTarget::Label(label));
        }
    }
    targets
}
