pub mod config;
pub mod country_data;
pub mod document;
pub mod error;
pub mod events;
pub mod geo;
pub mod hierarchy;
pub mod info;
pub mod playback;
pub mod selection;
pub mod style;
pub mod table;
pub mod widget;

pub use config::{HoverScope, MapOptions, StatePalette};
pub use country_data::{CountryData, CountryRecord};
pub use document::{DocumentChange, MapDocument, NodeId, ShapeKind, ViewBox};
pub use error::{ConfigError, MapError};
pub use events::*;
pub use geo::{Atlas, GeoKey, GeoNode, NodeKind};
pub use info::InfoContent;
pub use playback::{ColorMap, DateFrame, Playback, PlaybackCommand, TimeSeries};
pub use style::PaintState;
pub use table::{TableMode, TableOutcome};
pub use widget::{LabelScope, WorldMap};
