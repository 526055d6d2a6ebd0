use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::MapError;

const FALLBACK_JSON: &str = include_str!("../data/countries.json");

static FALLBACK: LazyLock<CountryData> =
    LazyLock::new(|| match CountryData::from_json(FALLBACK_JSON) {
        Ok(data) => data,
        Err(e) => {
            tracing::error!(error = %e, "built-in country table is invalid");
            CountryData::default()
        }
    });

/// External attributes of one country: name, region and whatever else the
/// data source carries (population, GDP, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRecord {
    pub name: String,
    /// Comma-separated alternative names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altnames: Option<String>,
    #[serde(default)]
    pub region: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CountryRecord {
    /// Look up an attribute by its data-source key, rendered as text.
    pub fn attribute(&self, key: &str) -> Option<String> {
        match key {
            "name" => Some(self.name.clone()),
            "region" => Some(self.region.clone()),
            "altnames" => self.altnames.clone(),
            _ => self.extra.get(key).and_then(value_text),
        }
    }

    pub fn alt_names(&self) -> impl Iterator<Item = &str> {
        self.altnames
            .as_deref()
            .into_iter()
            .flat_map(|names| names.split(','))
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

fn value_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Country records keyed by 2-letter code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountryData(BTreeMap<String, CountryRecord>);

impl CountryData {
    /// The built-in table used when the caller supplies none.
    pub fn fallback() -> Self {
        FALLBACK.clone()
    }

    pub fn from_json(json: &str) -> Result<Self, MapError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn get(&self, code: &str) -> Option<&CountryRecord> {
        self.0.get(code)
    }

    pub fn insert(&mut self, code: &str, record: CountryRecord) {
        self.0.insert(code.to_string(), record);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CountryRecord)> {
        self.0.iter().map(|(code, record)| (code.as_str(), record))
    }

    /// Resolve a free-form country name (as found in scraped tables) to its code.
    pub fn find_id_by_name(&self, name: &str) -> Option<String> {
        let wanted = normalize_country_name(name);
        if wanted.is_empty() {
            return None;
        }
        self.iter()
            .find(|(_, record)| record.name == wanted)
            .or_else(|| {
                self.iter()
                    .find(|(_, record)| record.alt_names().any(|alt| alt == wanted))
            })
            .map(|(code, _)| code.to_string())
    }
}

/// Strip articles, footnote markers and parenthetical qualifiers.
pub fn normalize_country_name(raw: &str) -> String {
    let mut name = raw.trim().to_string();

    if name.len() >= 4 && name.is_char_boundary(4) && name[..4].eq_ignore_ascii_case("the ") {
        name.drain(..4);
    }
    let len = name.len();
    if len >= 5 && name.is_char_boundary(len - 5) && name[len - 5..].eq_ignore_ascii_case(", the")
    {
        name.truncate(len - 5);
    }

    // Trailing single-letter footnote, e.g. "Syrian Arab Republic b".
    let chars: Vec<char> = name.chars().collect();
    if chars.len() > 2 && chars[chars.len() - 2] == ' ' {
        name = chars[..chars.len() - 2].iter().collect();
    }
    if let Some(stripped) = name.strip_suffix('†') {
        name = stripped.to_string();
    }

    // Everything from the first "(" to the last ")".
    if let (Some(open), Some(close)) = (name.find('('), name.rfind(')'))
        && open < close
    {
        name.replace_range(open..=close, "");
    }
    name.trim().to_string()
}
