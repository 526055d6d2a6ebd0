use std::collections::BTreeMap;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Timer period driving [`Playback::tick`].
pub const TICK_PERIOD_MS: u32 = 100;
pub const DEFAULT_SPEED: u32 = 10;
pub const MIN_SPEED: u32 = 1;
pub const MAX_SPEED: u32 = 20;

/// `country or province id -> fill color`.
pub type ColorMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFrame {
    pub date: String,
    pub colors: ColorMap,
}

/// Ordered per-date color maps.
///
/// Deserializes from either `[{"2019": {...}}, ...]` or `{"2019": {...}, ...}`
/// and serializes as the ordered object form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeSeries(Vec<DateFrame>);

impl TimeSeries {
    pub fn new(frames: Vec<DateFrame>) -> Self {
        Self(frames)
    }

    pub fn frames(&self) -> &[DateFrame] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<&DateFrame> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index of the last frame, or `None` when there are no frames.
    pub fn max_index(&self) -> Option<usize> {
        self.0.len().checked_sub(1)
    }
}

impl Serialize for TimeSeries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for frame in &self.0 {
            map.serialize_entry(&frame.date, &frame.colors)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TimeSeries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            List(Vec<serde_json::Map<String, serde_json::Value>>),
            Object(serde_json::Map<String, serde_json::Value>),
        }

        let entries: Vec<(String, serde_json::Value)> = match Raw::deserialize(deserializer)? {
            Raw::List(items) => items
                .into_iter()
                .filter_map(|item| item.into_iter().next())
                .collect(),
            Raw::Object(map) => map.into_iter().collect(),
        };
        entries
            .into_iter()
            .map(|(date, colors)| {
                let colors = serde_json::from_value(colors).map_err(de::Error::custom)?;
                Ok(DateFrame { date, colors })
            })
            .collect::<Result<_, _>>()
            .map(Self)
    }
}

/// Manual time controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "index", rename_all = "camelCase")]
pub enum PlaybackCommand {
    TogglePlay,
    Start,
    End,
    Back,
    Forward,
    Scrub(usize),
    Faster,
    Slower,
}

impl PlaybackCommand {
    /// Keyboard shortcut for a `KeyboardEvent.key` value.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            " " | "Spacebar" => Some(Self::TogglePlay),
            "ArrowLeft" => Some(Self::Back),
            "ArrowRight" => Some(Self::Forward),
            "ArrowUp" => Some(Self::Start),
            "ArrowDown" => Some(Self::End),
            "+" => Some(Self::Faster),
            "-" => Some(Self::Slower),
            _ => None,
        }
    }
}

/// Discrete date cursor advanced by a fixed-period timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Playback {
    current: usize,
    /// Last valid index; `None` runs without an upper bound.
    max: Option<usize>,
    ticks: u64,
    speed: u32,
    paused: bool,
    looping: bool,
}

impl Playback {
    pub fn new(max: Option<usize>, paused: bool, looping: bool) -> Self {
        Self {
            current: 0,
            max,
            ticks: 0,
            speed: DEFAULT_SPEED,
            paused,
            looping,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn set_max(&mut self, max: Option<usize>) {
        self.max = max;
        if let Some(max) = max {
            self.current = self.current.min(max);
        }
    }

    /// Jump without touching the play state.
    pub fn seek(&mut self, index: usize) {
        self.current = match self.max {
            Some(max) => index.min(max),
            None => index,
        };
    }

    /// One timer period. Returns true when the cursor stepped, i.e. every
    /// `speed` periods while playing.
    pub fn tick(&mut self) -> bool {
        if self.paused {
            return false;
        }
        self.ticks += 1;
        if self.speed == 1 || self.ticks % u64::from(self.speed) == 1 {
            self.advance();
            return true;
        }
        false
    }

    /// Step forward once; at the end wrap (looping) or pause.
    pub fn advance(&mut self) {
        match self.max {
            Some(max) if self.current >= max => {
                if self.looping {
                    self.current = 0;
                } else {
                    self.paused = true;
                }
            }
            _ => self.current += 1,
        }
    }

    /// Apply a manual control. Returns true when the date display needs a
    /// refresh; speed changes don't.
    pub fn apply(&mut self, command: PlaybackCommand) -> bool {
        match command {
            PlaybackCommand::TogglePlay => {
                self.paused = !self.paused;
                return true;
            }
            PlaybackCommand::Faster => {
                self.speed = self.speed.saturating_sub(1).max(MIN_SPEED);
                return false;
            }
            PlaybackCommand::Slower => {
                self.speed = (self.speed + 1).min(MAX_SPEED);
                return false;
            }
            PlaybackCommand::Start => self.current = 0,
            PlaybackCommand::End => {
                if let Some(max) = self.max {
                    self.current = max;
                }
            }
            PlaybackCommand::Back => self.current = self.current.saturating_sub(1),
            PlaybackCommand::Forward => {
                if self.max.is_none_or(|max| self.current < max) {
                    self.current += 1;
                }
            }
            PlaybackCommand::Scrub(index) => self.seek(index),
        }
        self.paused = true;
        true
    }
}
