use serde::{Deserialize, Serialize};

use crate::config::MapOptions;
use crate::document::{MapDocument, NodeId};

/// Interaction state a surface is painted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaintState {
    Out,
    Over,
    Click,
}

/// Either a palette state or a literal fill from data-driven coloring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintEvent<'a> {
    State(PaintState),
    Color(&'a str),
}

impl<'a> PaintEvent<'a> {
    /// `"out"`, `"over"`, `"click"`, or a color literal.
    pub fn parse(raw: &'a str) -> Option<Self> {
        match raw {
            "out" => Some(Self::State(PaintState::Out)),
            "over" => Some(Self::State(PaintState::Over)),
            "click" => Some(Self::State(PaintState::Click)),
            _ if is_color(raw) => Some(Self::Color(raw)),
            _ => None,
        }
    }
}

/// Color literals accepted for direct fills: `#rrggbb`, `rgb(..)`, `rgba(..)`.
pub fn is_color(raw: &str) -> bool {
    raw.starts_with('#') || raw.starts_with("rgb")
}

/// What kind of surface is being painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface<'a> {
    /// `World` and `Ocean`; never restyled here.
    Background,
    /// A country's national outline: stroke only.
    Border,
    /// A province, subprovince, single-shape country or marker.
    Area { update_color: Option<&'a str> },
}

/// Attribute writes produced by [`resolve`]. `None` leaves an attribute alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StylePatch {
    pub fill: Option<String>,
    pub stroke: Option<String>,
    pub stroke_width: Option<String>,
}

impl StylePatch {
    pub fn is_empty(&self) -> bool {
        self.fill.is_none() && self.stroke.is_none() && self.stroke_width.is_none()
    }

    pub fn apply(&self, doc: &mut MapDocument, node: NodeId) {
        if let Some(fill) = &self.fill {
            doc.set_attribute(node, "fill", fill);
        }
        if let Some(stroke) = &self.stroke {
            doc.set_attribute(node, "stroke", stroke);
        }
        if let Some(width) = &self.stroke_width {
            doc.set_attribute(node, "stroke-width", width);
        }
    }
}

/// Map a surface and paint event to concrete attributes.
///
/// `within_selection` is true when the surface belongs to the selected node;
/// ambient `out`/`over` churn then leaves its `click` look in place. Literal
/// colors and `click` always apply.
pub fn resolve(
    surface: Surface<'_>,
    event: PaintEvent<'_>,
    within_selection: bool,
    options: &MapOptions,
) -> StylePatch {
    let state = match event {
        PaintEvent::Color(color) => {
            return match surface {
                Surface::Background => StylePatch::default(),
                _ => StylePatch {
                    fill: Some(color.to_string()),
                    ..StylePatch::default()
                },
            };
        }
        PaintEvent::State(state) => state,
    };
    if within_selection && state != PaintState::Click {
        return StylePatch::default();
    }
    match surface {
        Surface::Background => StylePatch::default(),
        Surface::Border => StylePatch {
            fill: None,
            stroke: Some(options.country_stroke.get(state).to_string()),
            stroke_width: Some(options.country_stroke_width.get(state).to_string()),
        },
        Surface::Area { update_color } => StylePatch {
            fill: Some(
                update_color
                    .unwrap_or_else(|| options.province_fill.get(state))
                    .to_string(),
            ),
            stroke: Some(options.province_stroke.get(state).to_string()),
            stroke_width: Some(options.province_stroke_width.get(state).to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn border_gets_stroke_only() {
        let options = MapOptions::default();
        let patch = resolve(
            Surface::Border,
            PaintEvent::State(PaintState::Click),
            false,
            &options,
        );
        assert_eq!(patch.fill, None);
        assert_eq!(patch.stroke.as_deref(), Some("#333333"));
        assert_eq!(patch.stroke_width.as_deref(), Some("1"));
    }

    #[test]
    fn area_prefers_update_color() {
        let options = MapOptions::default();
        let plain = resolve(
            Surface::Area { update_color: None },
            PaintEvent::State(PaintState::Over),
            false,
            &options,
        );
        assert_eq!(plain.fill.as_deref(), Some("#FFFFFF"));

        let colored = resolve(
            Surface::Area {
                update_color: Some("#ff0000"),
            },
            PaintEvent::State(PaintState::Over),
            false,
            &options,
        );
        assert_eq!(colored.fill.as_deref(), Some("#ff0000"));
        assert_eq!(colored.stroke_width.as_deref(), Some("0.5"));
    }

    #[test]
    fn selection_suppresses_hover_but_not_click() {
        let options = MapOptions::default();
        let area = Surface::Area { update_color: None };
        assert!(resolve(area, PaintEvent::State(PaintState::Over), true, &options).is_empty());
        assert!(resolve(area, PaintEvent::State(PaintState::Out), true, &options).is_empty());
        let click = resolve(area, PaintEvent::State(PaintState::Click), true, &options);
        assert_eq!(click.fill.as_deref(), Some("#666666"));
    }

    #[test]
    fn literal_colors_bypass_palette() {
        let options = MapOptions::default();
        let patch = resolve(
            Surface::Area {
                update_color: Some("#00ff00"),
            },
            PaintEvent::Color("rgb(1, 2, 3)"),
            true,
            &options,
        );
        assert_eq!(
            patch,
            StylePatch {
                fill: Some("rgb(1, 2, 3)".to_string()),
                ..StylePatch::default()
            }
        );
        assert!(
            resolve(
                Surface::Background,
                PaintEvent::Color("#000000"),
                false,
                &options
            )
            .is_empty()
        );
    }

    #[test]
    fn parse_events() {
        assert_eq!(
            PaintEvent::parse("over"),
            Some(PaintEvent::State(PaintState::Over))
        );
        assert_eq!(PaintEvent::parse("#abc"), Some(PaintEvent::Color("#abc")));
        assert_eq!(PaintEvent::parse("red"), None);
    }
}
