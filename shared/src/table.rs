use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::country_data::CountryData;
use crate::playback::{DateFrame, TimeSeries};

/// Header texts (lowercased) that mark a table's country column.
pub static TABLE_KEYS: [&str; 11] = [
    "iso",
    "name",
    "country",
    "countries",
    "state",
    "states",
    "nation",
    "nations",
    "member state",
    "member states",
    "country or territory",
];

static TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<table\b[^>]*>(.*?)</table>").expect("valid regex"));
// Rows and cells run until the next opening tag, since HTML lets
// `</tr>`, `</td>` and `</th>` be omitted.
static ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<tr\b[^>]*>").expect("valid regex"));
static CELL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(th|td)\b([^>]*)>").expect("valid regex"));
static STYLE_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bstyle\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});
static BGCOLOR_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bbgcolor\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).expect("valid regex")
});
static BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|&nbsp;|</li>\s*<li>").expect("valid regex"));
static FOOTNOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*\]").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static NUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9,.]*$").expect("valid regex"));

/// How the caller wants a table read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableMode {
    /// Every non-empty cell, keyed by column header.
    #[default]
    Inspect,
    /// Colored cells only; time tables become a [`TimeSeries`].
    Animate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

impl Scalar {
    fn coerce(text: String) -> Self {
        if NUMERIC_RE.is_match(&text)
            && let Ok(number) = text.replace(',', "").parse::<f64>()
        {
            return Self::Number(number);
        }
        Self::Text(text)
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Colored { value: Scalar, color: String },
    Plain(Scalar),
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Colored { value, .. } | Self::Plain(value) => value.fmt(f),
        }
    }
}

/// `country code -> column header -> cell`.
pub type TableData = BTreeMap<String, BTreeMap<String, Cell>>;

/// Result of [`parse_table`], as delivered to the table callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TableOutcome {
    Data(TableData),
    Series(TimeSeries),
    Error { error: String },
}

struct RawCell {
    header: bool,
    text: String,
    color: Option<String>,
}

/// Extract country data from the first table in `html` that has a country
/// column. Failure is reported as [`TableOutcome::Error`], never raised.
pub fn parse_table(html: &str, mode: TableMode, countries: &CountryData) -> TableOutcome {
    let tables: Vec<&str> = TABLE_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    let no_data = || TableOutcome::Error {
        error: format!("No valid data found in {} tables", tables.len()),
    };

    let Some((rows, table_key)) = tables.iter().find_map(|table| {
        let rows = read_rows(table);
        let key = rows
            .iter()
            .flatten()
            .filter(|cell| cell.header)
            .find_map(|cell| {
                let lowered = cell.text.to_lowercase();
                TABLE_KEYS.iter().find(|key| **key == lowered)
            })?;
        Some((rows, *key))
    }) else {
        return no_data();
    };

    let column_keys: Vec<String> = rows
        .iter()
        .find(|row| row.iter().any(|cell| cell.header))
        .map(|row| {
            row.iter()
                .filter(|cell| cell.header && !cell.text.is_empty())
                .map(|cell| cell.text.clone())
                .collect()
        })
        .unwrap_or_default();
    if column_keys.len() < 2 {
        debug!(columns = column_keys.len(), "table has too few columns");
        return no_data();
    }
    // The first header naming the key wins; later ones are value columns.
    let Some(key_column) = column_keys
        .iter()
        .position(|header| header.to_lowercase().contains(table_key))
    else {
        return no_data();
    };

    let data_rows: Vec<Vec<&RawCell>> = rows
        .iter()
        .map(|row| row.iter().filter(|cell| !cell.header).collect::<Vec<_>>())
        .filter(|row| !row.is_empty())
        .collect();

    if mode == TableMode::Animate && is_time_table(&column_keys) {
        let series = read_series(&data_rows, &column_keys, countries);
        return if series.is_empty() {
            no_data()
        } else {
            TableOutcome::Series(series)
        };
    }

    let mut data = TableData::new();
    for row in &data_rows {
        let Some(key_cell) = row.get(key_column) else {
            continue;
        };
        let Some(code) = resolve_key(&key_cell.text, table_key, countries) else {
            continue;
        };
        let mut values = BTreeMap::new();
        for (column, cell) in row.iter().enumerate() {
            if column == key_column || cell.text.is_empty() {
                continue;
            }
            let Some(header) = column_keys.get(column) else {
                continue;
            };
            let value = Scalar::coerce(cell.text.clone());
            match (&cell.color, mode) {
                (Some(color), _) => {
                    values.insert(
                        header.clone(),
                        Cell::Colored {
                            value,
                            color: color.clone(),
                        },
                    );
                }
                (None, TableMode::Inspect) => {
                    values.insert(header.clone(), Cell::Plain(value));
                }
                (None, TableMode::Animate) => {}
            }
        }
        data.insert(code, values);
    }

    if data.is_empty() {
        no_data()
    } else {
        TableOutcome::Data(data)
    }
}

fn read_rows(table: &str) -> Vec<Vec<RawCell>> {
    sections(&ROW_RE, table)
        .map(|(_, row)| {
            sections(&CELL_RE, row)
                .map(|(tag, body)| RawCell {
                    header: tag[1].eq_ignore_ascii_case("th"),
                    text: strip_html(body),
                    color: background_color(&tag[2]),
                })
                .collect()
        })
        .collect()
}

/// Each opening tag matched by `opener`, paired with the text up to the next
/// one (or the end of `text`).
fn sections<'t>(
    opener: &'t Regex,
    text: &'t str,
) -> impl Iterator<Item = (regex::Captures<'t>, &'t str)> + 't {
    let mut tags = opener.captures_iter(text).peekable();
    std::iter::from_fn(move || {
        let tag = tags.next()?;
        let start = tag.get(0)?.end();
        let end = tags
            .peek()
            .and_then(|next| next.get(0))
            .map_or(text.len(), |next| next.start());
        Some((tag, &text[start..end]))
    })
}

/// Table row key to country code. Full names go through fuzzy name lookup;
/// purely numeric keys (rank columns) are rejected.
fn resolve_key(text: &str, table_key: &str, countries: &CountryData) -> Option<String> {
    let code = if text.chars().count() > 2 && table_key != "iso" {
        countries.find_id_by_name(text)?
    } else {
        text.to_string()
    };
    (!code.is_empty() && code.parse::<f64>().is_err()).then_some(code)
}

/// Three consecutive header years (ascending or descending) after the key column.
fn is_time_table(column_keys: &[String]) -> bool {
    let years: Vec<i64> = column_keys
        .iter()
        .skip(1)
        .take(3)
        .filter_map(|key| key.trim().parse().ok())
        .collect();
    match years.as_slice() {
        [a, b, c] => {
            (a.checked_add(1) == Some(*b) && b.checked_add(1) == Some(*c))
                || (a.checked_sub(1) == Some(*b) && b.checked_sub(1) == Some(*c))
        }
        _ => false,
    }
}

fn read_series(rows: &[Vec<&RawCell>], column_keys: &[String], countries: &CountryData) -> TimeSeries {
    let mut frames: Vec<DateFrame> = column_keys
        .iter()
        .skip(1)
        .map(|date| DateFrame {
            date: date.clone(),
            colors: BTreeMap::new(),
        })
        .collect();
    for row in rows {
        let Some(code) = row
            .first()
            .and_then(|cell| countries.find_id_by_name(&cell.text))
        else {
            continue;
        };
        for (column, cell) in row.iter().enumerate().skip(1) {
            if let Some(color) = &cell.color
                && let Some(frame) = frames.get_mut(column - 1)
            {
                frame.colors.insert(code.clone(), color.clone());
            }
        }
    }
    frames.retain(|frame| !frame.colors.is_empty());
    TimeSeries::new(frames)
}

fn background_color(attributes: &str) -> Option<String> {
    let from_style = STYLE_ATTR_RE.captures(attributes).and_then(|caps| {
        let style = caps.get(1).or_else(|| caps.get(2))?.as_str();
        style.split(';').find_map(|declaration| {
            let (name, value) = declaration.split_once(':')?;
            let name = name.trim().to_ascii_lowercase();
            (name == "background-color" || name == "background")
                .then(|| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
    });
    from_style.or_else(|| {
        BGCOLOR_ATTR_RE.captures(attributes).and_then(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().trim().to_string())
                .filter(|value| !value.is_empty())
        })
    })
}

/// Cell markup to plain text: line breaks become spaces, footnote brackets
/// and tags are dropped.
pub fn strip_html(input: &str) -> String {
    let text = BREAK_RE.replace_all(input, " ");
    let text = text.replace(['\n', '\r'], "");
    let text = FOOTNOTE_RE.replace_all(&text, "");
    let text = TAG_RE.replace_all(&text, "");
    text.replace("&amp;", "&").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn countries() -> CountryData {
        CountryData::fallback()
    }

    #[test]
    fn numeric_cells_are_coerced() {
        let html = "<table><tr><th>ISO</th><th>Value</th></tr><tr><td>US</td><td>42</td></tr></table>";
        let outcome = parse_table(html, TableMode::Inspect, &countries());
        let expected = TableData::from([(
            "US".to_string(),
            BTreeMap::from([("Value".to_string(), Cell::Plain(Scalar::Number(42.0)))]),
        )]);
        assert_eq!(outcome, TableOutcome::Data(expected));
    }

    #[test]
    fn names_resolve_and_rank_columns_are_skipped() {
        let html = r#"
            <p>intro</p>
            <table class="wikitable">
              <tr><th>Rank</th><th>Country<sup>[1]</sup></th><th>Population</th></tr>
              <tr><td>1</td><td><a href="/bs">The Bahamas</a></td><td>396,913</td></tr>
              <tr><td>2</td><td>Atlantis</td><td>12</td></tr>
              <tr><td>3</td><td>Alemanha</td><td>83.02 million</td></tr>
            </table>"#;
        let TableOutcome::Data(data) = parse_table(html, TableMode::Inspect, &countries()) else {
            panic!("expected table data");
        };
        assert_eq!(data.keys().collect::<Vec<_>>(), vec!["BS", "DE"]);
        assert_eq!(data["BS"]["Population"], Cell::Plain(Scalar::Number(396913.0)));
        assert_eq!(data["BS"]["Rank"], Cell::Plain(Scalar::Number(1.0)));
        assert_eq!(
            data["DE"]["Population"],
            Cell::Plain(Scalar::Text("83.02 million".to_string()))
        );
    }

    #[test]
    fn first_matching_header_is_the_key_column() {
        let html = "<table><tr><th>Country</th><th>Value</th><th>Former country</th></tr>\
            <tr><td>Alemanha</td><td>1</td><td>França</td></tr></table>";
        let TableOutcome::Data(data) = parse_table(html, TableMode::Inspect, &countries()) else {
            panic!("expected table data");
        };
        assert_eq!(data.keys().collect::<Vec<_>>(), vec!["DE"]);
        assert_eq!(
            data["DE"]["Former country"],
            Cell::Plain(Scalar::Text("França".to_string()))
        );
    }

    #[test]
    fn colored_cells_carry_their_color() {
        let html = r#"<table><tr><th>ISO</th><th>Score</th><th>Note</th></tr>
            <tr><td>DE</td><td style="background-color: #ff0000">7</td><td>ok</td></tr></table>"#;
        let TableOutcome::Data(data) = parse_table(html, TableMode::Animate, &countries()) else {
            panic!("expected table data");
        };
        assert_eq!(
            data["DE"],
            BTreeMap::from([(
                "Score".to_string(),
                Cell::Colored {
                    value: Scalar::Number(7.0),
                    color: "#ff0000".to_string(),
                }
            )])
        );
    }

    #[test]
    fn time_tables_become_series() {
        let html = r##"<table>
            <tr><th>Country</th><th>2019</th><th>2020</th><th>2021</th></tr>
            <tr><td>Alemanha</td><td bgcolor="#111111">1</td><td bgcolor="#222222">2</td><td>3</td></tr>
            <tr><td>França</td><td style="background:#333333">1</td><td>2</td><td style="background-color:#444444">3</td></tr>
        </table>"##;
        let TableOutcome::Series(series) = parse_table(html, TableMode::Animate, &countries())
        else {
            panic!("expected a time series");
        };
        let dates: Vec<&str> = series.frames().iter().map(|f| f.date.as_str()).collect();
        assert_eq!(dates, vec!["2019", "2020", "2021"]);
        assert_eq!(series.frames()[0].colors["DE"], "#111111");
        assert_eq!(series.frames()[0].colors["FR"], "#333333");
        assert!(!series.frames()[2].colors.contains_key("DE"));

        // Inspect mode reads the same table row by row.
        let TableOutcome::Data(data) = parse_table(html, TableMode::Inspect, &countries()) else {
            panic!("expected table data");
        };
        assert_eq!(data["FR"]["2020"], Cell::Plain(Scalar::Number(2.0)));
    }

    #[test]
    fn time_detection_needs_a_consecutive_run() {
        let keys = |k: &[&str]| k.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(is_time_table(&keys(&["Country", "2021", "2020", "2019"])));
        assert!(!is_time_table(&keys(&["Country", "2019", "2021", "2022"])));
        assert!(!is_time_table(&keys(&["Country", "2019", "2020"])));
        assert!(!is_time_table(&keys(&["Country", "9223372036854775807", "1", "2"])));
        assert!(!is_time_table(&keys(&["Country", "-9223372036854775808", "1", "0"])));
    }

    #[test]
    fn extreme_year_headers_read_as_plain_columns() {
        let html = "<table><tr><th>Country</th><th>9223372036854775807</th><th>1</th><th>2</th></tr>\
            <tr><td>Alemanha</td><td>5</td><td>6</td><td>7</td></tr></table>";
        let TableOutcome::Data(data) = parse_table(html, TableMode::Inspect, &countries()) else {
            panic!("expected table data");
        };
        assert_eq!(data["DE"]["1"], Cell::Plain(Scalar::Number(6.0)));
    }

    #[test]
    fn omitted_closing_tags_are_tolerated() {
        let html = "<table><tr><th>ISO<th>Value</tr><tr><td>US<td>42</table>";
        let expected = TableData::from([(
            "US".to_string(),
            BTreeMap::from([("Value".to_string(), Cell::Plain(Scalar::Number(42.0)))]),
        )]);
        assert_eq!(
            parse_table(html, TableMode::Inspect, &countries()),
            TableOutcome::Data(expected)
        );

        let html = r#"<table><thead><tr><th>ISO</th><th>Score</th></tr></thead>
            <tbody><tr><td>DE<td style="background-color: #ff0000">7
            <tr><td>FR<td>3</tbody></table>"#;
        let TableOutcome::Data(data) = parse_table(html, TableMode::Inspect, &countries()) else {
            panic!("expected table data");
        };
        assert_eq!(
            data["DE"]["Score"],
            Cell::Colored {
                value: Scalar::Number(7.0),
                color: "#ff0000".to_string(),
            }
        );
        assert_eq!(data["FR"]["Score"], Cell::Plain(Scalar::Number(3.0)));
    }

    #[test]
    fn degenerate_input_reports_an_error() {
        let error = |n: usize| TableOutcome::Error {
            error: format!("No valid data found in {n} tables"),
        };
        assert_eq!(parse_table("<p>nothing</p>", TableMode::Inspect, &countries()), error(0));
        assert_eq!(
            parse_table(
                "<table><tr><th>Country</th></tr><tr><td>DE</td></tr></table><table></table>",
                TableMode::Inspect,
                &countries()
            ),
            error(2)
        );
        assert_eq!(
            parse_table(
                "<table><tr><th>Price</th><th>Value</th></tr><tr><td>1</td><td>2</td></tr></table>",
                TableMode::Inspect,
                &countries()
            ),
            error(1)
        );
    }

    #[test]
    fn strip_html_flattens_markup() {
        assert_eq!(strip_html("  <b>Côte</b>&nbsp;d'Ivoire<br>\n"), "Côte d'Ivoire");
        assert_eq!(strip_html("Kosovo[a]"), "Kosovo");
        assert_eq!(strip_html("<ul><li>A</li><li>B</li></ul>"), "A B");
    }
}
