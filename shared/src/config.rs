use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::style::PaintState;

pub const DEFAULT_LIB_PATH: &str = "../src/";
pub const MAP_FILE_PROVINCES: &str = "world-states-provinces.svg";
pub const MAP_FILE_STATES: &str = "world-states.svg";
/// Screens narrower than this load the states-only map.
pub const SMALL_SCREEN_WIDTH: f64 = 999.0;

pub const DEFAULT_OCEAN_COLOR: &str = "#D8EBFF";
pub const DEFAULT_WORLD_COLOR: &str = "#FFFFFF";
/// Fill used for World and Ocean when a background image shows through.
pub const TRANSPARENT_FILL: &str = "rgba(255, 255, 255, 0)";

/// Labels rendered at or below this font size mark microstates.
pub const DEFAULT_MICROSTATE_FONT_SIZE: f64 = 2.0;

pub const BACKGROUND_IMAGE_WIDTH: &str = "1000";
pub const BACKGROUND_IMAGE_HEIGHT: &str = "507";

pub const WORLD_ID: &str = "World";
pub const OCEAN_ID: &str = "Ocean";
pub const LABELS_ID: &str = "labels";
pub const SHAPES_ID: &str = "shapes";
pub const BACKGROUND_ID: &str = "Background";
pub const ANTARCTICA_ID: &str = "AQ";
/// Top-level ids starting with this marker are internal metadata.
pub const METADATA_MARKER: char = '_';

/// One value per interaction state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePalette {
    pub out: String,
    pub over: String,
    pub click: String,
}

impl StatePalette {
    pub fn new(out: &str, over: &str, click: &str) -> Self {
        Self {
            out: out.to_string(),
            over: over.to_string(),
            click: click.to_string(),
        }
    }

    pub fn get(&self, state: PaintState) -> &str {
        match state {
            PaintState::Out => &self.out,
            PaintState::Over => &self.over,
            PaintState::Click => &self.click,
        }
    }

    fn values(&self) -> [&str; 3] {
        [&self.out, &self.over, &self.click]
    }
}

/// Which entity a pointer over a province highlights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoverScope {
    /// The whole owning country, its label and border.
    #[default]
    Country,
    /// Only the province (and its subprovinces) under the pointer.
    Province,
}

/// Widget options. Field names and defaults match the JS option object, so a
/// partial object deserializes over the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapOptions {
    pub lib_path: String,
    /// `false` loads the small map without provinces.
    pub big_map: bool,
    pub show_ocean: bool,
    pub show_antarctica: bool,
    pub show_labels: bool,
    pub show_micro_labels: bool,
    pub show_micro_states: bool,
    pub show_info_box: bool,
    pub background_image: String,

    pub ocean_color: String,
    pub world_color: String,
    pub label_fill: StatePalette,
    pub country_stroke: StatePalette,
    pub country_stroke_width: StatePalette,
    pub province_fill: StatePalette,
    pub province_stroke: StatePalette,
    pub province_stroke_width: StatePalette,

    pub group_countries: bool,
    pub group_by: Vec<String>,

    pub track_coords: bool,

    pub time_controls: bool,
    pub time_pause: bool,
    pub time_loop: bool,

    pub microstate_font_size: f64,
    pub hover_scope: HoverScope,
    pub exclude_countries: Vec<String>,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            lib_path: DEFAULT_LIB_PATH.to_string(),
            big_map: true,
            show_ocean: true,
            show_antarctica: true,
            show_labels: true,
            show_micro_labels: false,
            show_micro_states: true,
            show_info_box: false,
            background_image: String::new(),
            ocean_color: DEFAULT_OCEAN_COLOR.to_string(),
            world_color: DEFAULT_WORLD_COLOR.to_string(),
            label_fill: StatePalette::new("#666666", "#333333", "#000000"),
            country_stroke: StatePalette::new("#FFFFFF", "#FFFFFF", "#333333"),
            country_stroke_width: StatePalette::new("0.5", "1", "1"),
            province_fill: StatePalette::new("#B9B9B9", "#FFFFFF", "#666666"),
            province_stroke: StatePalette::new("#FFFFFF", "#FFFFFF", "#666666"),
            province_stroke_width: StatePalette::new("0.1", "0.5", "0.5"),
            group_countries: true,
            group_by: vec!["region".to_string()],
            track_coords: false,
            time_controls: false,
            time_pause: true,
            time_loop: false,
            microstate_font_size: DEFAULT_MICROSTATE_FONT_SIZE,
            hover_scope: HoverScope::Country,
            exclude_countries: Vec::new(),
        }
    }
}

impl MapOptions {
    /// Path of the map asset to load. Small screens always get the states-only map.
    pub fn map_url(&self, small_screen: bool) -> String {
        let file = if small_screen || !self.big_map {
            MAP_FILE_STATES
        } else {
            MAP_FILE_PROVINCES
        };
        format!("{}{}", self.lib_path, file)
    }

    /// Country codes removed from the map entirely.
    pub fn removed_countries(&self) -> Vec<&str> {
        let mut removed: Vec<&str> = self.exclude_countries.iter().map(String::as_str).collect();
        if !self.show_antarctica && !removed.contains(&ANTARCTICA_ID) {
            removed.push(ANTARCTICA_ID);
        }
        removed
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (option, palette) in [
            ("countryStrokeWidth", &self.country_stroke_width),
            ("provinceStrokeWidth", &self.province_stroke_width),
        ] {
            for value in palette.values() {
                if value.trim().parse::<f64>().is_err() {
                    return Err(ConfigError::InvalidValue {
                        option,
                        value: value.to_string(),
                    });
                }
            }
        }
        if self.group_countries
            && let Some(key) = self.group_by.iter().find(|key| key.trim().is_empty())
        {
            return Err(ConfigError::InvalidValue {
                option: "groupBy",
                value: key.clone(),
            });
        }
        if !(self.microstate_font_size >= 0.0) {
            return Err(ConfigError::InvalidValue {
                option: "microstateFontSize",
                value: self.microstate_font_size.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_options_keep_defaults() {
        let options: MapOptions =
            serde_json::from_str(r##"{"showOcean": false, "provinceFill": {"out": "#111111", "over": "#222222", "click": "#333333"}}"##)
                .unwrap();
        assert!(!options.show_ocean);
        assert!(options.show_antarctica);
        assert_eq!(options.province_fill.get(PaintState::Over), "#222222");
        assert_eq!(options.country_stroke.get(PaintState::Click), "#333333");
        assert_eq!(options.group_by, vec!["region".to_string()]);
    }

    #[test]
    fn map_url_picks_variant() {
        let mut options = MapOptions::default();
        assert_eq!(options.map_url(false), "../src/world-states-provinces.svg");
        assert_eq!(options.map_url(true), "../src/world-states.svg");
        options.big_map = false;
        assert_eq!(options.map_url(false), "../src/world-states.svg");
    }

    #[test]
    fn removed_countries_includes_antarctica_once() {
        let mut options = MapOptions {
            show_antarctica: false,
            exclude_countries: vec!["AQ".to_string(), "GL".to_string()],
            ..MapOptions::default()
        };
        assert_eq!(options.removed_countries(), vec!["AQ", "GL"]);
        options.exclude_countries.clear();
        assert_eq!(options.removed_countries(), vec!["AQ"]);
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(MapOptions::default().validate().is_ok());

        let options = MapOptions {
            province_stroke_width: StatePalette::new("0.1", "thick", "0.5"),
            ..MapOptions::default()
        };
        assert_eq!(
            options.validate(),
            Err(ConfigError::InvalidValue {
                option: "provinceStrokeWidth",
                value: "thick".to_string(),
            })
        );

        let options = MapOptions {
            group_by: vec![" ".to_string()],
            ..MapOptions::default()
        };
        assert!(options.validate().is_err());

        let options = MapOptions {
            microstate_font_size: -1.0,
            ..MapOptions::default()
        };
        assert!(options.validate().is_err());
    }
}
