use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{HoverScope, MapOptions, OCEAN_ID, WORLD_ID};
use crate::country_data::CountryData;
use crate::document::{DocumentChange, MapDocument, NodeId};
use crate::error::MapError;
use crate::events::{Coords, MapEvent, NodeInfo};
use crate::geo::{Atlas, GeoKey, GeoNode, Hit};
use crate::hierarchy;
use crate::info::{InfoContent, describe};
use crate::playback::{ColorMap, Playback, PlaybackCommand, TimeSeries};
use crate::selection::{Paint, PaintTarget, SelectionState, Transition};
use crate::style::{PaintEvent, PaintState, Surface, is_color, resolve};
use crate::table::{TableData, TableMode, TableOutcome, parse_table};

/// Which labels [`WorldMap::toggle_labels`] flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelScope {
    All,
    Micro,
}

/// One map instance: the document mirror, its index, interaction state and
/// time controls. Every operation runs to completion synchronously and
/// queues its notifications; hosts drain them with [`WorldMap::take_events`].
#[derive(Debug)]
pub struct WorldMap {
    document: MapDocument,
    atlas: Atlas,
    selection: SelectionState,
    options: MapOptions,
    country_data: CountryData,
    table_data: TableData,
    hover_info: Option<InfoContent>,
    coordinates: Option<Coords>,
    time_series: TimeSeries,
    playback: Option<Playback>,
    events: Vec<MapEvent>,
}

impl WorldMap {
    /// Build the map over a loaded document. `None` country data selects the
    /// built-in table.
    pub fn new(
        mut document: MapDocument,
        options: MapOptions,
        country_data: Option<CountryData>,
        time_series: Option<TimeSeries>,
    ) -> Result<Self, MapError> {
        options.validate()?;
        let country_data = country_data.unwrap_or_else(CountryData::fallback);
        let atlas = hierarchy::build(&mut document, &country_data, &options);
        let time_series = time_series.unwrap_or_default();
        let playback = options.time_controls.then(|| {
            Playback::new(
                time_series.max_index(),
                options.time_pause,
                options.time_loop,
            )
        });

        let mut map = Self {
            document,
            atlas,
            selection: SelectionState::default(),
            options,
            country_data,
            table_data: TableData::new(),
            hover_info: None,
            coordinates: None,
            time_series,
            playback,
            events: Vec::new(),
        };
        if map.playback.is_some() && !map.time_series.is_empty() {
            map.show_date(0);
        }
        Ok(map)
    }

    pub fn document(&self) -> &MapDocument {
        &self.document
    }

    pub fn atlas(&self) -> &Atlas {
        &self.atlas
    }

    pub fn options(&self) -> &MapOptions {
        &self.options
    }

    pub fn country_data(&self) -> &CountryData {
        &self.country_data
    }

    pub fn table_data(&self) -> &TableData {
        &self.table_data
    }

    pub fn time_series(&self) -> &TimeSeries {
        &self.time_series
    }

    pub fn playback(&self) -> Option<&Playback> {
        self.playback.as_ref()
    }

    /// Overlay content for the node under the pointer.
    pub fn info(&self) -> Option<&InfoContent> {
        self.hover_info.as_ref()
    }

    pub fn selected(&self) -> Option<NodeInfo> {
        self.selection
            .selected()
            .and_then(|key| NodeInfo::of(&self.atlas, key))
    }

    pub fn take_changes(&mut self) -> Vec<DocumentChange> {
        self.document.take_changes()
    }

    pub fn take_events(&mut self) -> Vec<MapEvent> {
        std::mem::take(&mut self.events)
    }

    fn lookup(&self, id: &str) -> Option<GeoKey> {
        let key = self.atlas.find(id);
        if key.is_none() {
            debug!(id, "no country or province with this id");
        }
        key
    }

    /// Highlight a country (with its provinces, border and label) or a single
    /// province. Silent: no callback fires.
    pub fn over(&mut self, id: &str) {
        if let Some(key) = self.lookup(id) {
            let transition = self.selection.enter(&self.atlas, key);
            self.apply(transition);
        }
    }

    pub fn out(&mut self, id: &str) {
        if let Some(key) = self.lookup(id) {
            let transition = self.selection.leave(&self.atlas, key);
            self.apply(transition);
        }
    }

    /// Select a country or province, or deselect it if already selected.
    pub fn click(&mut self, id: &str) {
        if let Some(key) = self.lookup(id) {
            self.activate(key);
        }
    }

    fn activate(&mut self, key: GeoKey) {
        let transition = self.selection.activate(&self.atlas, key);
        self.apply(transition);
        let selection = self.selected();
        debug!(
            selected = selection.as_ref().map(|node| node.id.as_str()),
            "selection changed"
        );
        self.events.push(MapEvent::Click { selection });
    }

    /// Nearest indexed ancestor-or-self of a document element.
    fn hit_at(&self, element: NodeId) -> Option<Hit> {
        let mut current = Some(element);
        while let Some(node) = current {
            if let Some(hit) = self.atlas.hit(node) {
                return Some(hit);
            }
            current = self.document.get(node).and_then(|el| el.parent());
        }
        None
    }

    /// Node reported to callbacks for a hit, and the node a transition
    /// starts from under the configured hover scope.
    fn resolve_hit(&self, hit: Hit) -> Option<(GeoKey, Option<GeoKey>)> {
        let (origin, scoped) = match hit {
            Hit::Area(key) => {
                let scoped = match self.options.hover_scope {
                    HoverScope::Country => self.atlas.owner(key)?,
                    HoverScope::Province => key,
                };
                (key, Some(scoped))
            }
            Hit::Border { country } => (country, Some(country)),
            Hit::Marker { country, .. } => match self.options.hover_scope {
                HoverScope::Country => (country, Some(country)),
                HoverScope::Province => (country, None),
            },
            Hit::Label(label) => {
                let country = self.atlas.owner(label)?;
                (country, Some(country))
            }
        };
        Some((origin, scoped))
    }

    /// Pointer entered a document element.
    pub fn pointer_over(&mut self, element: NodeId) {
        self.pointer(element, PaintState::Over);
    }

    /// Pointer left a document element.
    pub fn pointer_out(&mut self, element: NodeId) {
        self.pointer(element, PaintState::Out);
    }

    fn pointer(&mut self, element: NodeId, state: PaintState) {
        let Some(hit) = self.hit_at(element) else {
            if state == PaintState::Out {
                self.hover_info = None;
            }
            return;
        };
        let Some((origin, scoped)) = self.resolve_hit(hit) else {
            return;
        };

        if let Some(key) = scoped {
            let transition = if state == PaintState::Over {
                self.selection.enter(&self.atlas, key)
            } else {
                self.selection.leave(&self.atlas, key)
            };
            self.apply(transition);
        }
        if let Hit::Marker { country, element } = hit {
            self.paint(Paint {
                target: PaintTarget::Marker { country, element },
                state,
            });
        }

        self.hover_info = if state == PaintState::Over {
            describe(&self.atlas, origin, &self.table_data)
        } else {
            None
        };
        if let Some(node) = NodeInfo::of(&self.atlas, origin) {
            self.events.push(match state {
                PaintState::Over => MapEvent::Over { node },
                _ => MapEvent::Out { node },
            });
        }
    }

    /// Pointer released over a document element.
    pub fn pointer_up(&mut self, element: NodeId) {
        if let Some(hit) = self.hit_at(element)
            && let Some((origin, scoped)) = self.resolve_hit(hit)
        {
            self.activate(scoped.unwrap_or(origin));
        }
    }

    fn apply(&mut self, transition: Transition) {
        for paint in transition.paints {
            self.paint(paint);
        }
    }

    fn paint(&mut self, paint: Paint) {
        let within = self.selection.covers(&self.atlas, paint.target);
        let event = PaintEvent::State(paint.state);
        match paint.target {
            PaintTarget::Area(key) => {
                let Some(node) = self.atlas.get(key) else {
                    return;
                };
                let element = node.element();
                let surface = match self.document.id_of(element) {
                    Some(WORLD_ID | OCEAN_ID) => Surface::Background,
                    _ => Surface::Area {
                        update_color: node.update_color(),
                    },
                };
                resolve(surface, event, within, &self.options).apply(&mut self.document, element);
            }
            PaintTarget::Border(country) => {
                let Some(border) = self
                    .atlas
                    .country(country)
                    .and_then(|country| country.border.clone())
                else {
                    return;
                };
                let patch = resolve(Surface::Border, event, within, &self.options);
                if border.parts.is_empty() {
                    patch.apply(&mut self.document, border.element);
                }
                for part in border.parts {
                    patch.apply(&mut self.document, part);
                }
            }
            PaintTarget::Marker { element, .. } => {
                if within {
                    return;
                }
                if paint.state == PaintState::Out {
                    self.document.remove_attribute(element, "fill");
                    self.document.remove_attribute(element, "stroke");
                } else {
                    resolve(
                        Surface::Area { update_color: None },
                        event,
                        false,
                        &self.options,
                    )
                    .apply(&mut self.document, element);
                }
            }
            PaintTarget::Label(label) => {
                if within && paint.state != PaintState::Click {
                    return;
                }
                if let Some(label) = self.atlas.label(label) {
                    let fill = self.options.label_fill.get(paint.state);
                    self.document.set_attribute(label.element, "fill", fill);
                }
            }
        }
    }

    /// Apply sticky fills keyed by country or province id. Values that are
    /// not color literals are ignored.
    pub fn update(&mut self, colors: &ColorMap) {
        for (id, color) in colors {
            if !is_color(color) {
                debug!(id = %id, color = %color, "ignoring non-color update value");
                continue;
            }
            let Some(key) = self.lookup(id) else {
                continue;
            };
            for target in self.atlas.update_targets(key) {
                self.atlas.set_update_color(target, Some(color.clone()));
                if let Some(element) = self.atlas.get(target).map(GeoNode::element) {
                    resolve(
                        Surface::Area {
                            update_color: Some(color.as_str()),
                        },
                        PaintEvent::Color(color),
                        false,
                        &self.options,
                    )
                    .apply(&mut self.document, element);
                }
            }
        }
    }

    /// Clear every sticky fill and repaint those surfaces in their current
    /// state: selected ones keep the click look, the rest go back to rest.
    pub fn reset(&mut self) {
        let colored = self.atlas.colored();
        debug!(count = colored.len(), "resetting update colors");
        for key in colored {
            self.atlas.set_update_color(key, None);
            let target = PaintTarget::Area(key);
            let state = if self.selection.covers(&self.atlas, target) {
                PaintState::Click
            } else {
                PaintState::Out
            };
            self.paint(Paint { target, state });
        }
    }

    pub fn toggle_labels(&mut self, scope: LabelScope) {
        match scope {
            LabelScope::All => {
                let Some(layer) = self.atlas.label_layer else {
                    debug!("map has no label layer");
                    return;
                };
                let next = toggled(self.document.attribute(layer, "display"));
                self.document.set_attribute(layer, "display", next);
            }
            LabelScope::Micro => {
                let labels: Vec<GeoKey> = self.atlas.country_labels.values().copied().collect();
                for key in labels {
                    let Some(label) = self.atlas.label_mut(key) else {
                        continue;
                    };
                    if !label.microstate {
                        continue;
                    }
                    let next = toggled(self.document.attribute(label.element, "display"));
                    label.visible = next == "block";
                    self.document.set_attribute(label.element, "display", next);
                }
            }
        }
    }

    /// Current visual state as a standalone SVG document.
    pub fn export_svg(&self) -> String {
        self.document.to_svg_string()
    }

    /// Bitmap export size: twice the view box.
    pub fn raster_size(&self) -> Option<(u32, u32)> {
        let view_box = self.document.view_box()?;
        Some((
            (view_box.width * 2.0).round() as u32,
            (view_box.height * 2.0).round() as u32,
        ))
    }

    /// Record a pointer position in map units and notify.
    pub fn report_coordinates(&mut self, x: f64, y: f64) {
        let coords = Coords { x, y };
        self.coordinates = Some(coords);
        self.events.push(MapEvent::Coords { coords });
    }

    pub fn coordinates(&self) -> Option<Coords> {
        self.coordinates
    }

    /// Append caller SVG markup to the shapes overlay.
    pub fn draw_shape(&mut self, markup: &str) -> Result<NodeId, MapError> {
        let parent = self.atlas.shapes.unwrap_or_else(|| self.document.root());
        self.document.append_markup(parent, markup)
    }

    /// Move to a date index: applies that frame's colors when a series is
    /// loaded and notifies the date callback.
    ///
    /// The index is clamped to the last date, so the event always names the
    /// date actually shown.
    pub fn date(&mut self, index: usize) {
        let index = match &mut self.playback {
            Some(playback) => {
                playback.seek(index);
                playback.current()
            }
            None => self
                .time_series
                .max_index()
                .map_or(index, |max| index.min(max)),
        };
        self.show_date(index);
    }

    fn show_date(&mut self, index: usize) {
        let frame = self.time_series.get(index).cloned();
        if let Some(frame) = &frame {
            self.update(&frame.colors);
        }
        self.events.push(MapEvent::Date {
            index,
            date: frame.map(|frame| frame.date),
        });
    }

    /// Replace the animated series, e.g. with one read from a time table.
    pub fn load_time_series(&mut self, series: TimeSeries) {
        let max = series.max_index();
        self.time_series = series;
        let playback = self.playback.get_or_insert_with(|| {
            Playback::new(max, self.options.time_pause, self.options.time_loop)
        });
        playback.set_max(max);
        info!(dates = self.time_series.len(), "time series loaded");
    }

    /// Parse an HTML table and report the outcome through the table callback.
    pub fn ingest_table(&mut self, html: &str, mode: TableMode) -> TableOutcome {
        let outcome = parse_table(html, mode, &self.country_data);
        match &outcome {
            TableOutcome::Data(data) => self.table_data = data.clone(),
            TableOutcome::Series(series) if mode == TableMode::Animate => {
                self.load_time_series(series.clone());
            }
            TableOutcome::Series(_) => {}
            TableOutcome::Error { error } => debug!(%error, "table ingestion failed"),
        }
        self.events.push(MapEvent::Table {
            outcome: outcome.clone(),
        });
        outcome
    }

    /// One timer period of the time controller.
    pub fn tick(&mut self) -> bool {
        let Some(playback) = &mut self.playback else {
            return false;
        };
        if !playback.tick() {
            return false;
        }
        let current = playback.current();
        self.show_date(current);
        true
    }

    /// Manual time control. Returns true when the date was refreshed.
    pub fn control(&mut self, command: PlaybackCommand) -> bool {
        let Some(playback) = &mut self.playback else {
            debug!(?command, "time controls are disabled");
            return false;
        };
        if !playback.apply(command) {
            return false;
        }
        let current = playback.current();
        self.show_date(current);
        true
    }
}

fn toggled(display: Option<&str>) -> &'static str {
    match display {
        None | Some("block") => "none",
        Some(_) => "block",
    }
}
