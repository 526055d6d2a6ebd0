use serde::Serialize;

use crate::geo::{Atlas, GeoKey, GeoNode};
use crate::table::TableData;

/// Text shown in the hover overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoContent {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    /// Country facts from the data record.
    pub facts: Vec<(String, String)>,
    /// Ingested table values for the country or province.
    pub details: Vec<(String, String)>,
}

const FACTS: [(&str, &str); 4] = [
    ("population", "Population"),
    ("GDP", "GDP"),
    ("region", "Region"),
    ("altnames", "Alternative names"),
];

/// Overlay content for a hovered node; `None` for nodes without a country.
pub fn describe(atlas: &Atlas, key: GeoKey, table: &TableData) -> Option<InfoContent> {
    let node = atlas.get(key)?;
    let country = atlas.country(atlas.owner(key)?)?;

    let subtitle = match node {
        GeoNode::Province(_) | GeoNode::Subprovince(_) => {
            let id = node.id();
            let border_prefix = country.code.to_lowercase();
            let unnamed = id.starts_with("path")
                || id.get(..2).is_some_and(|prefix| prefix == border_prefix)
                || id.chars().count() == 2;
            (!unnamed && !id.is_empty()).then(|| id.to_string())
        }
        GeoNode::Country(_) | GeoNode::Label(_) => None,
    };

    let facts = country
        .record
        .as_ref()
        .map(|record| {
            FACTS
                .iter()
                .filter_map(|(key, title)| {
                    record
                        .attribute(key)
                        .filter(|value| !value.is_empty())
                        .map(|value| (title.to_string(), value))
                })
                .collect()
        })
        .unwrap_or_default();

    let details = table
        .get(&country.code)
        .or_else(|| table.get(node.id()))
        .map(|row| {
            row.iter()
                .map(|(column, cell)| (column.clone(), cell.to_string()))
                .collect()
        })
        .unwrap_or_default();

    Some(InfoContent {
        title: country.name().to_string(),
        subtitle,
        facts,
        details,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::MapOptions;
    use crate::country_data::CountryData;
    use crate::document::MapDocument;
    use crate::hierarchy;
    use crate::table::{Cell, Scalar};

    const MAP: &str = r##"<svg xmlns="http://www.w3.org/2000/svg">
        <g id="DE"><path id="de"/><path id="DE-BY"/><path id="path123"/></g>
        <g id="QQ"><path id="QQ-1"/></g>
    </svg>"##;

    fn atlas() -> Atlas {
        let mut doc = MapDocument::parse(MAP).unwrap();
        hierarchy::build(&mut doc, &CountryData::fallback(), &MapOptions::default())
    }

    #[test]
    fn names_provinces_but_not_unnamed_paths() {
        let atlas = atlas();
        let by = describe(&atlas, atlas.find("DE-BY").unwrap(), &TableData::new()).unwrap();
        assert_eq!(by.title, "Alemanha");
        assert_eq!(by.subtitle.as_deref(), Some("DE-BY"));
        assert!(by.facts.iter().any(|(k, v)| k == "Region" && v == "EU"));

        let unnamed = describe(&atlas, atlas.find("path123").unwrap(), &TableData::new()).unwrap();
        assert_eq!(unnamed.subtitle, None);
    }

    #[test]
    fn missing_record_falls_back_to_code() {
        let atlas = atlas();
        let info = describe(&atlas, atlas.countries["QQ"], &TableData::new()).unwrap();
        assert_eq!(info.title, "QQ");
        assert!(info.facts.is_empty());
    }

    #[test]
    fn includes_table_values() {
        let atlas = atlas();
        let table = TableData::from([(
            "DE".to_string(),
            BTreeMap::from([("Value".to_string(), Cell::Plain(Scalar::Number(42.0)))]),
        )]);
        let info = describe(&atlas, atlas.countries["DE"], &table).unwrap();
        assert_eq!(info.details, vec![("Value".to_string(), "42".to_string())]);
    }
}
