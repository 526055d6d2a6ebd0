use tracing::{debug, info, warn};

use crate::config::{
    BACKGROUND_ID, BACKGROUND_IMAGE_HEIGHT, BACKGROUND_IMAGE_WIDTH, LABELS_ID, METADATA_MARKER,
    MapOptions, OCEAN_ID, SHAPES_ID, TRANSPARENT_FILL, WORLD_ID,
};
use crate::country_data::CountryData;
use crate::document::{MapDocument, NodeId, ShapeKind};
use crate::geo::{Atlas, Border, Country, GeoKey, GeoNode, Hit, Label, Province, Subprovince};
use crate::style::{PaintEvent, PaintState, Surface, resolve};

/// Index a loaded map document into an [`Atlas`], painting every surface in
/// its resting state. Missing layers or data records are skipped, never fatal.
pub fn build(doc: &mut MapDocument, data: &CountryData, options: &MapOptions) -> Atlas {
    let mut atlas = Atlas::default();
    let root = doc.root();

    let entries: Vec<(String, NodeId)> = doc
        .children(root)
        .iter()
        .filter_map(|node| {
            let id = doc.id_of(*node)?;
            let kind = doc.kind(*node)?;
            (!id.starts_with(METADATA_MARKER) && kind.is_map_entry())
                .then(|| (id.to_string(), *node))
        })
        .collect();

    let mut candidates = Vec::new();
    for (id, node) in entries {
        match id.as_str() {
            WORLD_ID => atlas.world = Some(node),
            OCEAN_ID => atlas.ocean = Some(node),
            LABELS_ID => atlas.label_layer = Some(node),
            SHAPES_ID => doc.remove(node),
            _ => candidates.push((id, node)),
        }
    }

    paint_background(doc, &atlas, options);

    for (code, node) in candidates {
        add_country(doc, &mut atlas, data, options, code, node);
    }

    add_labels(doc, &mut atlas, data, options);
    hide_microstates(doc, &mut atlas, options);

    for code in options.removed_countries() {
        remove_country(doc, &mut atlas, code);
    }

    if let Some(layer) = atlas.label_layer {
        let display = if options.show_labels { "block" } else { "none" };
        doc.set_attribute(layer, "display", display);
    }

    if options.group_countries {
        build_groups(&mut atlas, options);
    }

    atlas.shapes = Some(doc.insert_element(
        root,
        None,
        "g",
        vec![("id".to_string(), SHAPES_ID.to_string())],
    ));

    info!(
        countries = atlas.countries.len(),
        labels = atlas.country_labels.len(),
        groups = atlas.country_groups.len(),
        "map hierarchy built"
    );
    atlas
}

fn paint_background(doc: &mut MapDocument, atlas: &Atlas, options: &MapOptions) {
    let (mut world_fill, mut ocean_fill) =
        (options.world_color.as_str(), options.ocean_color.as_str());

    if !options.background_image.is_empty() {
        let before = atlas.world.or_else(|| doc.children(doc.root()).first().copied());
        doc.insert_element(
            doc.root(),
            before,
            "image",
            vec![
                ("id".to_string(), BACKGROUND_ID.to_string()),
                ("overflow".to_string(), "visible".to_string()),
                ("width".to_string(), BACKGROUND_IMAGE_WIDTH.to_string()),
                ("height".to_string(), BACKGROUND_IMAGE_HEIGHT.to_string()),
                ("href".to_string(), options.background_image.clone()),
            ],
        );
        world_fill = TRANSPARENT_FILL;
        ocean_fill = TRANSPARENT_FILL;
    }

    match atlas.world {
        Some(world) => doc.set_style(world, "fill", world_fill),
        None => debug!("map has no World layer"),
    }
    match atlas.ocean {
        Some(ocean) if !options.show_ocean => {
            doc.set_style(ocean, "fill", "none");
            doc.set_style(ocean, "stroke", "none");
        }
        Some(ocean) => doc.set_style(ocean, "fill", ocean_fill),
        None => debug!("map has no Ocean layer"),
    }
}

fn add_country(
    doc: &mut MapDocument,
    atlas: &mut Atlas,
    data: &CountryData,
    options: &MapOptions,
    code: String,
    element: NodeId,
) {
    let record = data.get(&code).cloned();
    if record.is_none() {
        debug!(country = %code, "no country data record");
    }
    let border_id = code.to_lowercase();
    let key = atlas.push(GeoNode::Country(Country {
        code: code.clone(),
        element,
        record,
        border: None,
        provinces: Vec::new(),
        markers: Vec::new(),
        label: None,
        update_color: None,
    }));
    atlas.countries.insert(code, key);

    if doc.kind(element).is_some_and(ShapeKind::is_drawable) {
        atlas.register_element(element, Hit::Area(key));
        paint_area(doc, element, options);
        return;
    }

    let mut border = None;
    let mut provinces = Vec::new();
    let mut markers = Vec::new();

    for child in doc.children(element).to_vec() {
        let kind = doc.kind(child).unwrap_or(ShapeKind::Other);
        let id = doc.id_of(child).unwrap_or_default().to_string();

        // Microstate markers may share the border's lowercase id.
        if kind == ShapeKind::Circle {
            atlas.register_element(
                child,
                Hit::Marker {
                    country: key,
                    element: child,
                },
            );
            markers.push(child);
        } else if id == border_id {
            let parts: Vec<NodeId> = if kind == ShapeKind::Group {
                doc.children(child)
                    .iter()
                    .copied()
                    .filter(|part| doc.kind(*part).is_some_and(ShapeKind::is_drawable))
                    .collect()
            } else {
                Vec::new()
            };
            atlas.register_element(child, Hit::Border { country: key });
            for part in &parts {
                atlas.register_element(*part, Hit::Border { country: key });
            }
            let outline = Border {
                element: child,
                parts,
            };
            paint_border(doc, &outline, options);
            border = Some(outline);
        } else if kind.is_drawable() {
            let province = atlas.push(GeoNode::Province(Province {
                id,
                element: child,
                country: key,
                subprovinces: None,
                update_color: None,
            }));
            atlas.register_element(child, Hit::Area(province));
            paint_area(doc, child, options);
            provinces.push(province);
        } else if kind == ShapeKind::Group {
            let province = atlas.push(GeoNode::Province(Province {
                id,
                element: child,
                country: key,
                subprovinces: None,
                update_color: None,
            }));
            atlas.register_element(child, Hit::Area(province));

            let mut subprovinces = Vec::new();
            for grandchild in doc.children(child).to_vec() {
                if !doc.kind(grandchild).is_some_and(ShapeKind::is_drawable) {
                    continue;
                }
                // Unfilled grandchildren are inner outlines; they route to the province.
                if doc.attribute(grandchild, "fill") == Some("none") {
                    atlas.register_element(grandchild, Hit::Area(province));
                    continue;
                }
                let subprovince = atlas.push(GeoNode::Subprovince(Subprovince {
                    id: doc.id_of(grandchild).unwrap_or_default().to_string(),
                    element: grandchild,
                    country: key,
                    province,
                    update_color: None,
                }));
                atlas.register_element(grandchild, Hit::Area(subprovince));
                paint_area(doc, grandchild, options);
                subprovinces.push(subprovince);
            }
            if let Some(GeoNode::Province(p)) = atlas.get_mut(province) {
                p.subprovinces = Some(subprovinces);
            }
            provinces.push(province);
        }
    }

    if let Some(country) = atlas.country_mut(key) {
        country.border = border;
        country.provinces = provinces;
        country.markers = markers;
    }
}

fn paint_area(doc: &mut MapDocument, node: NodeId, options: &MapOptions) {
    resolve(
        Surface::Area { update_color: None },
        PaintEvent::State(PaintState::Out),
        false,
        options,
    )
    .apply(doc, node);
}

fn paint_border(doc: &mut MapDocument, border: &Border, options: &MapOptions) {
    let patch = resolve(
        Surface::Border,
        PaintEvent::State(PaintState::Out),
        false,
        options,
    );
    if border.parts.is_empty() {
        patch.apply(doc, border.element);
    }
    for part in &border.parts {
        patch.apply(doc, *part);
    }
}

fn add_labels(doc: &mut MapDocument, atlas: &mut Atlas, data: &CountryData, options: &MapOptions) {
    let Some(layer) = atlas.label_layer else {
        warn!("map has no label layer");
        return;
    };
    for node in doc.children(layer).to_vec() {
        if doc.kind(node) != Some(ShapeKind::Text) {
            continue;
        }
        let Some(code) = doc
            .id_of(node)
            .and_then(|id| id.get(..2))
            .map(str::to_string)
        else {
            continue;
        };

        let text = match data.get(&code) {
            Some(record) => {
                doc.set_text(node, &record.name);
                record.name.clone()
            }
            None => doc
                .get(node)
                .and_then(|el| el.text())
                .unwrap_or_default()
                .to_string(),
        };
        doc.set_attribute(node, "fill", options.label_fill.get(PaintState::Out));
        let microstate = doc
            .attribute(node, "font-size")
            .and_then(|size| size.trim().parse::<f64>().ok())
            .is_some_and(|size| size <= options.microstate_font_size);

        let key = atlas.push(GeoNode::Label(Label {
            code: code.clone(),
            element: node,
            text,
            microstate,
            visible: true,
        }));
        atlas.register_element(node, Hit::Label(key));
        if let Some(country) = atlas.countries.get(&code).copied()
            && let Some(country) = atlas.country_mut(country)
        {
            country.label = Some(key);
        }
        atlas.country_labels.insert(code, key);
    }
}

fn hide_microstates(doc: &mut MapDocument, atlas: &mut Atlas, options: &MapOptions) {
    let micro: Vec<(String, GeoKey)> = atlas
        .country_labels
        .iter()
        .filter(|(_, key)| atlas.label(**key).is_some_and(|label| label.microstate))
        .map(|(code, key)| (code.clone(), *key))
        .collect();

    for (code, key) in micro {
        if !options.show_micro_labels
            && let Some(label) = atlas.label_mut(key)
        {
            label.visible = false;
            doc.set_attribute(label.element, "display", "none");
        }
        if !options.show_micro_states
            && let Some(country) = atlas.country_by_code(&code)
        {
            doc.set_attribute(country.element, "display", "none");
        }
    }
}

fn remove_country(doc: &mut MapDocument, atlas: &mut Atlas, code: &str) {
    let element = atlas.country_by_code(code).map(|country| country.element);
    let label = atlas
        .country_labels
        .get(code)
        .and_then(|key| atlas.label(*key))
        .map(|label| label.element);
    if atlas.forget_country(code).is_none() && label.is_none() {
        debug!(country = %code, "country to remove is not on the map");
        return;
    }
    for node in element.into_iter().chain(label) {
        atlas.unregister_element(node);
        doc.remove(node);
    }
    atlas.country_labels.remove(code);
}

fn build_groups(atlas: &mut Atlas, options: &MapOptions) {
    let mut groups = std::mem::take(&mut atlas.country_groups);
    for group_key in &options.group_by {
        let buckets = groups.entry(group_key.clone()).or_default();
        for (code, country) in atlas.iter_countries() {
            let Some(record) = &country.record else {
                continue;
            };
            let Some(subgroup) = record.attribute(group_key).filter(|s| !s.is_empty()) else {
                continue;
            };
            if let Some(key) = atlas.countries.get(code) {
                buckets
                    .entry(subgroup)
                    .or_default()
                    .insert(code.to_string(), *key);
            }
        }
    }
    atlas.country_groups = groups;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentChange;

    const FIXTURE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 1000 507">
        <defs><clipPath id="clip"/></defs>
        <rect id="World" width="1000" height="507"/>
        <rect id="Ocean" width="1000" height="507"/>
        <g id="_meta"><path id="junk" d="M0 0"/></g>
        <g id="DE">
            <path id="de" d="M0 0"/>
            <path id="DE-BY" d="M1 1"/>
            <g id="DE-NW">
                <path id="DE-NW-K" d="M2 2"/>
                <path id="DE-NW-D" d="M3 3"/>
                <path id="path15677" fill="none" d="M4 4"/>
            </g>
        </g>
        <g id="FR">
            <g id="fr"><path d="M5 5"/><path d="M6 6"/></g>
            <path id="FR-IDF" d="M7 7"/>
        </g>
        <g id="AQ"><path id="aq" d="M8 8"/><path id="AQ-1" d="M9 9"/></g>
        <g id="MC"><circle id="mc" cx="1" cy="1" r="1"/></g>
        <path id="XK" d="M10 10"/>
        <circle id="ZZ" cx="0" cy="0" r="1"/>
        <g id="labels">
            <text id="DE-label" font-size="6">Germany</text>
            <text id="FR-label" font-size="6">France</text>
            <text id="AQ-label" font-size="6">Antarctica</text>
            <text id="MC-label" font-size="2">Monaco</text>
        </g>
    </svg>"##;

    fn built(options: &MapOptions) -> (MapDocument, Atlas) {
        let mut doc = MapDocument::parse(FIXTURE).unwrap();
        let atlas = build(&mut doc, &CountryData::fallback(), options);
        (doc, atlas)
    }

    #[test]
    fn admits_only_map_entries() {
        let (_, atlas) = built(&MapOptions::default());
        let codes: Vec<&str> = atlas.countries.keys().map(String::as_str).collect();
        assert_eq!(codes, vec!["AQ", "DE", "FR", "MC", "XK"]);
        assert!(atlas.world.is_some());
        assert!(atlas.ocean.is_some());
        assert!(atlas.label_layer.is_some());
    }

    #[test]
    fn countries_own_themselves() {
        let (_, atlas) = built(&MapOptions::default());
        for key in atlas.countries.values() {
            assert_eq!(atlas.owner(*key), Some(*key));
        }
    }

    #[test]
    fn each_province_listed_once_by_its_country() {
        let (_, atlas) = built(&MapOptions::default());
        for (_, country) in atlas.iter_countries() {
            for province in &country.provinces {
                let owner = atlas.owner(*province).unwrap();
                let listed = atlas.country(owner).unwrap().provinces.as_slice();
                assert_eq!(listed.iter().filter(|p| *p == province).count(), 1);
            }
        }
    }

    #[test]
    fn classifies_borders_provinces_and_subprovinces() {
        let (doc, atlas) = built(&MapOptions::default());
        let de = atlas.country_by_code("DE").unwrap();
        assert_eq!(de.provinces.len(), 2);
        assert_eq!(de.border.as_ref().map(|b| b.element), doc.element_by_id("de"));

        let nw = atlas.province(de.provinces[1]).unwrap();
        assert_eq!(nw.id, "DE-NW");
        let subs = nw.subprovinces.as_ref().unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(atlas.get(subs[0]).unwrap().id(), "DE-NW-K");

        let outline = doc.element_by_id("path15677").unwrap();
        assert_eq!(atlas.hit(outline), Some(Hit::Area(de.provinces[1])));
        assert_eq!(doc.attribute(outline, "fill"), Some("none"));

        let fr = atlas.country_by_code("FR").unwrap();
        assert_eq!(fr.provinces.len(), 1);
        assert_eq!(fr.border.as_ref().map(|b| b.parts.len()), Some(2));
        for part in &fr.border.as_ref().unwrap().parts {
            assert_eq!(doc.attribute(*part, "stroke-width"), Some("0.5"));
            assert_eq!(doc.attribute(*part, "fill"), None);
        }

        let mc = atlas.country_by_code("MC").unwrap();
        assert!(mc.provinces.is_empty());
        assert_eq!(mc.markers.len(), 1);
        assert!(mc.border.is_none());
        let marker = doc.element_by_id("mc").unwrap();
        assert!(matches!(atlas.hit(marker), Some(Hit::Marker { .. })));
    }

    #[test]
    fn resting_style_is_applied() {
        let (doc, _) = built(&MapOptions::default());
        let by = doc.element_by_id("DE-BY").unwrap();
        assert_eq!(doc.attribute(by, "fill"), Some("#B9B9B9"));
        assert_eq!(doc.attribute(by, "stroke-width"), Some("0.1"));
        let border = doc.element_by_id("de").unwrap();
        assert_eq!(doc.attribute(border, "stroke"), Some("#FFFFFF"));
        let ocean = doc.element_by_id("Ocean").unwrap();
        assert_eq!(doc.style(ocean, "fill").as_deref(), Some("#D8EBFF"));
    }

    #[test]
    fn single_shape_country_is_its_own_area() {
        let (doc, atlas) = built(&MapOptions::default());
        let xk = atlas.countries["XK"];
        assert_eq!(atlas.areas(xk), vec![xk]);
        let element = doc.element_by_id("XK").unwrap();
        assert_eq!(atlas.hit(element), Some(Hit::Area(xk)));
    }

    #[test]
    fn labels_take_names_and_flag_microstates() {
        let (doc, atlas) = built(&MapOptions::default());
        let de = atlas.label(atlas.country_labels["DE"]).unwrap();
        assert_eq!(de.text, "Alemanha");
        assert_eq!(doc.get(de.element).and_then(|el| el.text()), Some("Alemanha"));
        assert!(!de.microstate);

        let mc = atlas.label(atlas.country_labels["MC"]).unwrap();
        assert!(mc.microstate);
        assert!(!mc.visible);
        assert_eq!(doc.attribute(mc.element, "display"), Some("none"));
        assert_eq!(
            atlas.country_by_code("DE").unwrap().label,
            Some(atlas.country_labels["DE"])
        );
    }

    #[test]
    fn hiding_antarctica_removes_both_entries() {
        let options = MapOptions {
            show_antarctica: false,
            ..MapOptions::default()
        };
        let (mut doc, atlas) = built(&options);
        assert!(!atlas.countries.contains_key("AQ"));
        assert!(!atlas.country_labels.contains_key("AQ"));
        assert!(doc.element_by_id("AQ").is_none());
        assert!(doc.element_by_id("AQ-label").is_none());
        assert!(atlas.find("AQ-1").is_none());
        assert!(
            atlas
                .country_groups
                .values()
                .flat_map(|groups| groups.values())
                .all(|members| !members.contains_key("AQ"))
        );
        assert!(!doc.to_svg_string().contains("AQ-1"));
        assert!(
            doc.take_changes()
                .iter()
                .any(|change| matches!(change, DocumentChange::Remove { .. }))
        );
    }

    #[test]
    fn groups_bucket_by_region() {
        let (_, atlas) = built(&MapOptions::default());
        let regions = &atlas.country_groups["region"];
        let eu: Vec<&str> = regions["EU"].keys().map(String::as_str).collect();
        assert_eq!(eu, vec!["DE", "FR", "MC", "XK"]);
        assert!(regions["AN"].contains_key("AQ"));

        let (_, atlas) = built(&MapOptions {
            group_countries: false,
            ..MapOptions::default()
        });
        assert!(atlas.country_groups.is_empty());
    }

    #[test]
    fn background_image_makes_layers_transparent() {
        let (doc, atlas) = built(&MapOptions {
            background_image: "bg.png".to_string(),
            ..MapOptions::default()
        });
        let image = doc.element_by_id("Background").unwrap();
        let world = atlas.world.unwrap();
        let children = doc.children(doc.root());
        let image_at = children.iter().position(|n| *n == image).unwrap();
        let world_at = children.iter().position(|n| *n == world).unwrap();
        assert!(image_at < world_at);
        assert_eq!(doc.style(world, "fill").as_deref(), Some(TRANSPARENT_FILL));
    }

    #[test]
    fn hidden_ocean_and_shape_layer() {
        let (doc, atlas) = built(&MapOptions {
            show_ocean: false,
            show_labels: false,
            ..MapOptions::default()
        });
        let ocean = atlas.ocean.unwrap();
        assert_eq!(doc.style(ocean, "stroke").as_deref(), Some("none"));
        assert_eq!(doc.attribute(atlas.label_layer.unwrap(), "display"), Some("none"));
        let shapes = atlas.shapes.unwrap();
        assert_eq!(doc.children(doc.root()).last(), Some(&shapes));
        assert_eq!(doc.id_of(shapes), Some(SHAPES_ID));
    }
}
