use serde::Serialize;

use crate::geo::{Atlas, GeoKey, NodeKind};
use crate::table::TableOutcome;

/// Callback payload describing a map node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeInfo {
    pub id: String,
    pub kind: NodeKind,
    /// Owning country code.
    pub country: String,
    /// Country display name.
    pub name: String,
}

impl NodeInfo {
    pub fn of(atlas: &Atlas, key: GeoKey) -> Option<Self> {
        let node = atlas.get(key)?;
        let country = atlas.country(atlas.owner(key)?)?;
        Some(Self {
            id: node.id().to_string(),
            kind: node.kind(),
            country: country.code.clone(),
            name: country.name().to_string(),
        })
    }
}

/// Map position in document (viewBox) units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coords {
    pub x: f64,
    pub y: f64,
}

/// Notifications queued by [`crate::WorldMap`] and drained by the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MapEvent {
    Over {
        node: NodeInfo,
    },
    Out {
        node: NodeInfo,
    },
    /// `selection` is `None` after a deselect.
    Click {
        selection: Option<NodeInfo>,
    },
    Coords {
        coords: Coords,
    },
    Date {
        index: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        date: Option<String>,
    },
    Table {
        outcome: TableOutcome,
    },
}

/// Caller-registered handlers, one per event kind. Unset handlers drop
/// their events.
#[derive(Default)]
pub struct Callbacks {
    over: Option<Box<dyn Fn(&NodeInfo)>>,
    out: Option<Box<dyn Fn(&NodeInfo)>>,
    click: Option<Box<dyn Fn(Option<&NodeInfo>)>>,
    coords: Option<Box<dyn Fn(Coords)>>,
    date: Option<Box<dyn Fn(usize, Option<&str>)>>,
    table: Option<Box<dyn Fn(&TableOutcome)>>,
}

impl Callbacks {
    pub fn on_over(mut self, handler: impl Fn(&NodeInfo) + 'static) -> Self {
        self.over = Some(Box::new(handler));
        self
    }

    pub fn on_out(mut self, handler: impl Fn(&NodeInfo) + 'static) -> Self {
        self.out = Some(Box::new(handler));
        self
    }

    pub fn on_click(mut self, handler: impl Fn(Option<&NodeInfo>) + 'static) -> Self {
        self.click = Some(Box::new(handler));
        self
    }

    pub fn on_coords(mut self, handler: impl Fn(Coords) + 'static) -> Self {
        self.coords = Some(Box::new(handler));
        self
    }

    pub fn on_date(mut self, handler: impl Fn(usize, Option<&str>) + 'static) -> Self {
        self.date = Some(Box::new(handler));
        self
    }

    pub fn on_table(mut self, handler: impl Fn(&TableOutcome) + 'static) -> Self {
        self.table = Some(Box::new(handler));
        self
    }

    pub fn dispatch(&self, event: &MapEvent) {
        match event {
            MapEvent::Over { node } => {
                if let Some(handler) = &self.over {
                    handler(node);
                }
            }
            MapEvent::Out { node } => {
                if let Some(handler) = &self.out {
                    handler(node);
                }
            }
            MapEvent::Click { selection } => {
                if let Some(handler) = &self.click {
                    handler(selection.as_ref());
                }
            }
            MapEvent::Coords { coords } => {
                if let Some(handler) = &self.coords {
                    handler(*coords);
                }
            }
            MapEvent::Date { index, date } => {
                if let Some(handler) = &self.date {
                    handler(*index, date.as_deref());
                }
            }
            MapEvent::Table { outcome } => {
                if let Some(handler) = &self.table {
                    handler(outcome);
                }
            }
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("over", &self.over.is_some())
            .field("out", &self.out.is_some())
            .field("click", &self.click.is_some())
            .field("coords", &self.coords.is_some())
            .field("date", &self.date.is_some())
            .field("table", &self.table.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(MapEvent::Click { selection: None }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "click", "selection": null}));

        let json = serde_json::to_value(MapEvent::Date {
            index: 2,
            date: Some("2021".to_string()),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "date", "index": 2, "date": "2021"}));
    }

    #[test]
    fn dispatch_routes_to_the_matching_handler() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let clicks = Rc::clone(&seen);
        let dates = Rc::clone(&seen);
        let callbacks = Callbacks::default()
            .on_click(move |selection| {
                clicks
                    .borrow_mut()
                    .push(selection.map_or(String::new(), |node| node.id.clone()));
            })
            .on_date(move |index, _| dates.borrow_mut().push(index.to_string()));

        callbacks.dispatch(&MapEvent::Click { selection: None });
        callbacks.dispatch(&MapEvent::Date {
            index: 4,
            date: None,
        });
        callbacks.dispatch(&MapEvent::Coords {
            coords: Coords { x: 1.0, y: 2.0 },
        });
        assert_eq!(*seen.borrow(), vec![String::new(), "4".to_string()]);
    }
}
