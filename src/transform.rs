use crate::config::COORD_EPSILON;
use crate::models::{BoundaryRelation, DropCounts, EnrichedBoundary};
use std::collections::{HashMap, HashSet};

/// Join raw relations with the category map and keep only rows fit for the
/// enriched table. The input must already be ordered by admin level then
/// name; deduplication keeps the first occurrence per wikidata id.
pub fn transform(
    rows: Vec<BoundaryRelation>,
    categories: &HashMap<String, String>,
) -> (Vec<EnrichedBoundary>, DropCounts) {
    let mut records = Vec::new();
    let mut drops = DropCounts::default();
    let mut seen: HashSet<String> = HashSet::new();

    for row in rows {
        let Some(wikidata_id) = row.wikidata_id else {
            drops.missing_wikidata += 1;
            continue;
        };
        let Some(category) = categories.get(&wikidata_id) else {
            drops.missing_category += 1;
            continue;
        };
        if !is_valid_geometry(&row.geometry) {
            drops.invalid_geometry += 1;
            continue;
        }
        if !seen.insert(wikidata_id.clone()) {
            drops.duplicates += 1;
            continue;
        }

        records.push(EnrichedBoundary {
            wikidata_id,
            commons_category: category.clone(),
            admin_level: row.admin_level,
            name: row.name,
            geom: row.geometry,
        });
    }

    (records, drops)
}

/// Shape check on the stored EWKT: SRID prefix, polygon or multipolygon
/// header, and at least one closed ring with 4 or more points.
pub fn is_valid_geometry(text: &str) -> bool {
    let Some(body) = text.strip_prefix("SRID=4326;") else {
        return false;
    };
    if !body.starts_with("POLYGON") && !body.starts_with("MULTIPOLYGON") {
        return false;
    }
    rings_of(body).iter().any(|ring| is_closed_ring(ring))
}

/// Innermost parenthesised groups, i.e. the coordinate lists.
fn rings_of(body: &str) -> Vec<&str> {
    let mut rings = Vec::new();
    let mut start = None;
    for (i, c) in body.char_indices() {
        match c {
            '(' => start = Some(i + 1),
            ')' => {
                if let Some(s) = start.take() {
                    rings.push(&body[s..i]);
                }
            }
            _ => {}
        }
    }
    rings
}

fn is_closed_ring(ring: &str) -> bool {
    let points: Vec<Option<(f64, f64)>> = ring.split(',').map(parse_point).collect();
    if points.len() < 4 || points.iter().any(Option::is_none) {
        return false;
    }
    match (points.first(), points.last()) {
        (Some(Some(first)), Some(Some(last))) => {
            (first.0 - last.0).abs() <= COORD_EPSILON && (first.1 - last.1).abs() <= COORD_EPSILON
        }
        _ => false,
    }
}

fn parse_point(text: &str) -> Option<(f64, f64)> {
    let mut parts = text.trim().split_whitespace();
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((x, y))
}
