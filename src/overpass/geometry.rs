use crate::config::{COORD_EPSILON, MAX_RING_POINTS};
use crate::models::{BoundaryRelation, GeometryPoint, OverpassResponse};
use std::collections::{HashMap, VecDeque};

/// Persisted when a relation's members cannot be assembled into any outer
/// ring. Storable as-is, but rejected later by the transform validity check.
pub const EMPTY_GEOMETRY: &str = "SRID=4326;POLYGON EMPTY";

/// Turn a geometry response (interleaved ways and relations) into raw
/// boundary records. Relations without a name or a numeric admin_level tag
/// are discarded entirely.
pub fn parse_relations(response: &OverpassResponse, country_code: &str) -> Vec<BoundaryRelation> {
    let mut ways: HashMap<i64, &Vec<GeometryPoint>> = HashMap::new();
    for element in &response.elements {
        if element.element_type == "way" {
            if let Some(points) = &element.geometry {
                ways.insert(element.id, points);
            }
        }
    }

    let mut relations = Vec::new();
    for element in &response.elements {
        if element.element_type != "relation" {
            continue;
        }
        let Some(name) = element.tag("name").filter(|n| !n.is_empty()) else {
            log::debug!("relation {} has no name, skipping", element.id);
            continue;
        };
        let Some(admin_level) = element.tag("admin_level").and_then(|v| v.parse::<i32>().ok())
        else {
            log::debug!("relation {} has no usable admin_level, skipping", element.id);
            continue;
        };

        let mut outer_fragments = Vec::new();
        let mut inner_fragments = Vec::new();
        for member in element.members.as_deref().unwrap_or_default() {
            if member.member_type != "way" {
                continue;
            }
            let Some(points) = ways.get(&member.member_ref) else {
                continue;
            };
            // An absent role counts as outer; anything else (subarea, label,
            // admin_centre) is not part of the boundary outline.
            match member.role.as_deref().unwrap_or("") {
                "inner" => inner_fragments.push((*points).clone()),
                "outer" | "" => outer_fragments.push((*points).clone()),
                _ => {}
            }
        }

        let geometry = assemble(element.id, &outer_fragments, &inner_fragments);
        let wikidata_id = element
            .tag("wikidata")
            .filter(|v| is_wikidata_id(v))
            .map(str::to_string);

        relations.push(BoundaryRelation {
            relation_id: element.id,
            country_code: country_code.to_string(),
            admin_level,
            name: name.to_string(),
            wikidata_id,
            geometry,
            tags: element.tags.clone().unwrap_or_default(),
        });
    }
    relations
}

/// Merge way fragments into rings, pair holes with the outer that contains
/// them, simplify, and serialise as EWKT.
pub fn assemble(
    relation_id: i64,
    outer_fragments: &[Vec<GeometryPoint>],
    inner_fragments: &[Vec<GeometryPoint>],
) -> String {
    let outer_rings = merge_rings(outer_fragments);
    let inner_rings = merge_rings(inner_fragments);

    let mut polygons: Vec<(Vec<GeometryPoint>, Vec<Vec<GeometryPoint>>)> =
        outer_rings.into_iter().map(|ring| (ring, Vec::new())).collect();

    'pairing: for inner in inner_rings {
        let Some(&probe) = inner.first() else { continue };
        // First containing outer wins, also for nested outers.
        for (outer, holes) in polygons.iter_mut() {
            if point_in_ring(probe, outer) {
                holes.push(inner);
                continue 'pairing;
            }
        }
        log::warn!(
            "relation {}: inner ring is contained by no outer ring, dropping it",
            relation_id
        );
    }

    let mut bodies = Vec::new();
    for (outer, holes) in polygons {
        let outer = cap_ring(strip_collinear(&outer));
        if outer.len() < 4 {
            continue;
        }
        let holes: Vec<Vec<GeometryPoint>> = holes
            .iter()
            .map(|hole| cap_ring(strip_collinear(hole)))
            .filter(|hole| hole.len() >= 4)
            .collect();
        bodies.push(polygon_body(&outer, &holes));
    }

    match bodies.len() {
        0 => EMPTY_GEOMETRY.to_string(),
        1 => format!("SRID=4326;POLYGON{}", bodies[0]),
        _ => format!("SRID=4326;MULTIPOLYGON({})", bodies.join(",")),
    }
}

pub(crate) fn is_wikidata_id(value: &str) -> bool {
    let mut chars = value.chars();
    chars.next() == Some('Q') && {
        let digits = chars.as_str();
        !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
    }
}

fn points_eq(a: GeometryPoint, b: GeometryPoint) -> bool {
    (a.lat - b.lat).abs() <= COORD_EPSILON && (a.lon - b.lon).abs() <= COORD_EPSILON
}

/// Merge unordered, possibly-reversed fragments into closed rings. Each ring
/// grows from a seed fragment at the tail, then at the head, flipping
/// fragments as needed, until its connected component is exhausted. Rings
/// with fewer than 3 pre-closure points are dropped.
fn merge_rings(fragments: &[Vec<GeometryPoint>]) -> Vec<Vec<GeometryPoint>> {
    let mut used: Vec<bool> = fragments.iter().map(|f| f.is_empty()).collect();
    let mut rings = Vec::new();

    for seed in 0..fragments.len() {
        if used[seed] {
            continue;
        }
        used[seed] = true;
        let mut ring: VecDeque<GeometryPoint> = fragments[seed].iter().copied().collect();

        loop {
            let Some(&tail) = ring.back() else { break };
            let Some((idx, at_start)) = find_unused_touching(fragments, &used, tail) else {
                break;
            };
            used[idx] = true;
            if at_start {
                ring.extend(fragments[idx].iter().skip(1).copied());
            } else {
                ring.extend(fragments[idx].iter().rev().skip(1).copied());
            }
        }
        loop {
            let Some(&head) = ring.front() else { break };
            let Some((idx, at_start)) = find_unused_touching(fragments, &used, head) else {
                break;
            };
            used[idx] = true;
            if at_start {
                for point in fragments[idx].iter().skip(1) {
                    ring.push_front(*point);
                }
            } else {
                for point in fragments[idx].iter().rev().skip(1) {
                    ring.push_front(*point);
                }
            }
        }

        if ring.len() >= 3 {
            let mut ring: Vec<GeometryPoint> = ring.into_iter().collect();
            if let (Some(&first), Some(&last)) = (ring.first(), ring.last()) {
                if !points_eq(first, last) {
                    ring.push(first);
                }
            }
            rings.push(ring);
        }
    }
    rings
}

fn find_unused_touching(
    fragments: &[Vec<GeometryPoint>],
    used: &[bool],
    point: GeometryPoint,
) -> Option<(usize, bool)> {
    for (idx, fragment) in fragments.iter().enumerate() {
        if used[idx] {
            continue;
        }
        if let Some(&first) = fragment.first() {
            if points_eq(first, point) {
                return Some((idx, true));
            }
        }
        if let Some(&last) = fragment.last() {
            if points_eq(last, point) {
                return Some((idx, false));
            }
        }
    }
    None
}

/// Standard ray casting. The caller probes with an inner ring's first point.
fn point_in_ring(point: GeometryPoint, ring: &[GeometryPoint]) -> bool {
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = (ring[i].lon, ring[i].lat);
        let (xj, yj) = (ring[j].lon, ring[j].lat);
        if (yi > point.lat) != (yj > point.lat)
            && point.lon < (xj - xi) * (point.lat - yi) / (yj - yi) + xi
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Remove interior points that are collinear with their kept neighbours.
fn strip_collinear(ring: &[GeometryPoint]) -> Vec<GeometryPoint> {
    if ring.len() < 4 {
        return ring.to_vec();
    }
    let mut out = Vec::with_capacity(ring.len());
    out.push(ring[0]);
    let mut prev = ring[0];
    for i in 1..ring.len() - 1 {
        let cur = ring[i];
        let next = ring[i + 1];
        let cross = (cur.lon - prev.lon) * (next.lat - prev.lat)
            - (cur.lat - prev.lat) * (next.lon - prev.lon);
        if cross.abs() > COORD_EPSILON {
            out.push(cur);
            prev = cur;
        }
    }
    out.push(ring[ring.len() - 1]);
    out
}

/// Uniform sampling keeps rows under the downstream size limit: every
/// ceil(n/max)-th point plus the final one, so closure survives.
fn cap_ring(ring: Vec<GeometryPoint>) -> Vec<GeometryPoint> {
    let n = ring.len();
    if n <= MAX_RING_POINTS {
        return ring;
    }
    let step = (n + MAX_RING_POINTS - 1) / MAX_RING_POINTS;
    let mut out: Vec<GeometryPoint> = ring.iter().copied().step_by(step).collect();
    let last = ring[n - 1];
    if let Some(&tail) = out.last() {
        if !points_eq(tail, last) {
            out.push(last);
        }
    }
    out
}

fn ring_text(ring: &[GeometryPoint]) -> String {
    let coords: Vec<String> = ring
        .iter()
        .map(|p| format!("{} {}", p.lon, p.lat))
        .collect();
    format!("({})", coords.join(","))
}

fn polygon_body(outer: &[GeometryPoint], holes: &[Vec<GeometryPoint>]) -> String {
    let mut rings = vec![ring_text(outer)];
    rings.extend(holes.iter().map(|hole| ring_text(hole)));
    format!("({})", rings.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lon: f64, lat: f64) -> GeometryPoint {
        GeometryPoint { lat, lon }
    }

    fn assert_ring(actual: &[GeometryPoint], expected: &[GeometryPoint]) {
        assert_eq!(actual.len(), expected.len());
        for (got, want) in actual.iter().zip(expected) {
            assert!(points_eq(*got, *want), "got {:?}, want {:?}", got, want);
        }
    }

    #[test]
    fn three_fragments_merge_into_one_closed_ring() {
        let a = vec![pt(0.0, 0.0), pt(1.0, 0.0)];
        let b = vec![pt(2.0, 0.0), pt(1.0, 0.0)];
        let c = vec![pt(2.0, 0.0), pt(2.0, 1.0), pt(0.0, 1.0), pt(0.0, 0.0)];

        let rings = merge_rings(&[a, b, c]);
        assert_eq!(rings.len(), 1);
        assert_ring(
            &rings[0],
            &[
                pt(0.0, 0.0),
                pt(1.0, 0.0),
                pt(2.0, 0.0),
                pt(2.0, 1.0),
                pt(0.0, 1.0),
                pt(0.0, 0.0),
            ],
        );
    }

    #[test]
    fn merge_grows_at_the_head_too() {
        let a = vec![pt(5.0, 5.0), pt(6.0, 5.0)];
        let b = vec![pt(6.0, 5.0), pt(6.0, 6.0)];
        let c = vec![pt(5.0, 6.0), pt(5.0, 5.0)];

        let rings = merge_rings(&[a, b, c]);
        assert_eq!(rings.len(), 1);
        assert_ring(
            &rings[0],
            &[pt(5.0, 6.0), pt(5.0, 5.0), pt(6.0, 5.0), pt(6.0, 6.0), pt(5.0, 6.0)],
        );
    }

    #[test]
    fn short_components_are_dropped() {
        let rings = merge_rings(&[vec![pt(0.0, 0.0), pt(1.0, 1.0)]]);
        assert!(rings.is_empty());
    }

    #[test]
    fn collinear_interior_points_are_removed() {
        let ring = vec![
            pt(0.0, 0.0),
            pt(1.0, 0.0),
            pt(2.0, 0.0),
            pt(2.0, 1.0),
            pt(2.0, 2.0),
            pt(0.0, 2.0),
            pt(0.0, 1.0),
            pt(0.0, 0.0),
        ];
        let simplified = strip_collinear(&ring);
        assert_ring(
            &simplified,
            &[pt(0.0, 0.0), pt(2.0, 0.0), pt(2.0, 2.0), pt(0.0, 2.0), pt(0.0, 0.0)],
        );
    }

    #[test]
    fn oversize_rings_are_sampled_down_and_stay_closed() {
        let n = 1200;
        let mut ring: Vec<GeometryPoint> = (0..n)
            .map(|i| {
                let angle = (i as f64) * std::f64::consts::TAU / (n as f64);
                pt(angle.cos(), angle.sin())
            })
            .collect();
        ring.push(ring[0]);

        let capped = cap_ring(ring.clone());
        assert!(capped.len() <= MAX_RING_POINTS + 1);
        assert!(points_eq(capped[0], *capped.last().unwrap()));
    }

    #[test]
    fn single_outer_emits_polygon() {
        let fragments = [
            vec![pt(0.0, 0.0), pt(1.0, 0.0)],
            vec![pt(2.0, 0.0), pt(1.0, 0.0)],
            vec![pt(2.0, 0.0), pt(2.0, 1.0), pt(0.0, 1.0), pt(0.0, 0.0)],
        ];
        let ewkt = assemble(1, &fragments, &[]);
        assert_eq!(ewkt, "SRID=4326;POLYGON((0 0,2 0,2 1,0 1,0 0))");
    }

    #[test]
    fn inner_ring_becomes_a_hole_not_a_multipolygon() {
        let outer = vec![
            pt(0.0, 0.0),
            pt(10.0, 0.0),
            pt(10.0, 10.0),
            pt(0.0, 10.0),
            pt(0.0, 0.0),
        ];
        let inner = vec![
            pt(2.0, 2.0),
            pt(8.0, 2.0),
            pt(8.0, 8.0),
            pt(2.0, 8.0),
            pt(2.0, 2.0),
        ];
        let ewkt = assemble(1, &[outer], &[inner]);
        assert_eq!(
            ewkt,
            "SRID=4326;POLYGON((0 0,10 0,10 10,0 10,0 0),(2 2,8 2,8 8,2 8,2 2))"
        );
    }

    #[test]
    fn disjoint_outers_emit_multipolygon() {
        let first = vec![pt(0.0, 0.0), pt(1.0, 0.0), pt(1.0, 1.0), pt(0.0, 1.0), pt(0.0, 0.0)];
        let second = vec![pt(5.0, 5.0), pt(6.0, 5.0), pt(6.0, 6.0), pt(5.0, 6.0), pt(5.0, 5.0)];
        let ewkt = assemble(1, &[first, second], &[]);
        assert!(ewkt.starts_with("SRID=4326;MULTIPOLYGON((("));
        assert_eq!(ewkt.matches("((").count(), 2);
    }

    #[test]
    fn inner_without_outer_yields_placeholder() {
        let inner = vec![
            pt(2.0, 2.0),
            pt(8.0, 2.0),
            pt(8.0, 8.0),
            pt(2.0, 8.0),
            pt(2.0, 2.0),
        ];
        assert_eq!(assemble(1, &[], &[inner]), EMPTY_GEOMETRY);
    }

    #[test]
    fn hole_outside_every_outer_is_dropped() {
        let outer = vec![pt(0.0, 0.0), pt(1.0, 0.0), pt(1.0, 1.0), pt(0.0, 1.0), pt(0.0, 0.0)];
        let stray = vec![pt(5.0, 5.0), pt(6.0, 5.0), pt(6.0, 6.0), pt(5.0, 6.0), pt(5.0, 5.0)];
        let ewkt = assemble(1, &[outer], &[stray]);
        assert_eq!(ewkt, "SRID=4326;POLYGON((0 0,1 0,1 1,0 1,0 0))");
    }

    #[test]
    fn point_in_ring_basics() {
        let square = [pt(0.0, 0.0), pt(4.0, 0.0), pt(4.0, 4.0), pt(0.0, 4.0), pt(0.0, 0.0)];
        assert!(point_in_ring(pt(2.0, 2.0), &square));
        assert!(!point_in_ring(pt(5.0, 2.0), &square));
        assert!(!point_in_ring(pt(-1.0, -1.0), &square));
    }

    #[test]
    fn wikidata_id_shape() {
        assert!(is_wikidata_id("Q1"));
        assert!(is_wikidata_id("Q31"));
        assert!(!is_wikidata_id("31"));
        assert!(!is_wikidata_id("Q"));
        assert!(!is_wikidata_id("Q12a"));
        assert!(!is_wikidata_id("q12"));
    }

    fn fixture() -> OverpassResponse {
        serde_json::from_value(serde_json::json!({
            "elements": [
                {
                    "type": "way",
                    "id": 100,
                    "geometry": [
                        {"lat": 0.0, "lon": 0.0},
                        {"lat": 0.0, "lon": 4.0},
                        {"lat": 4.0, "lon": 4.0},
                        {"lat": 4.0, "lon": 0.0},
                        {"lat": 0.0, "lon": 0.0}
                    ]
                },
                {
                    "type": "relation",
                    "id": 1,
                    "tags": {
                        "name": "Flanders",
                        "admin_level": "4",
                        "boundary": "administrative",
                        "wikidata": "Q234"
                    },
                    "members": [{"type": "way", "ref": 100, "role": "outer"}]
                },
                {
                    "type": "relation",
                    "id": 2,
                    "tags": {"admin_level": "4"},
                    "members": [{"type": "way", "ref": 100, "role": "outer"}]
                },
                {
                    "type": "relation",
                    "id": 3,
                    "tags": {"name": "No Level"},
                    "members": [{"type": "way", "ref": 100, "role": "outer"}]
                },
                {
                    "type": "relation",
                    "id": 4,
                    "tags": {"name": "Blank Role", "admin_level": "6", "wikidata": "234"},
                    "members": [{"type": "way", "ref": 100, "role": ""}]
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn parse_keeps_only_named_levelled_relations() {
        let relations = parse_relations(&fixture(), "BEL");
        assert_eq!(relations.len(), 2);

        let flanders = &relations[0];
        assert_eq!(flanders.relation_id, 1);
        assert_eq!(flanders.country_code, "BEL");
        assert_eq!(flanders.admin_level, 4);
        assert_eq!(flanders.wikidata_id.as_deref(), Some("Q234"));
        assert!(flanders.geometry.starts_with("SRID=4326;POLYGON(("));
        assert_eq!(flanders.tags.get("boundary").map(String::as_str), Some("administrative"));
    }

    #[test]
    fn blank_role_counts_as_outer_and_bad_wikidata_is_nulled() {
        let relations = parse_relations(&fixture(), "BEL");
        let blank = &relations[1];
        assert_eq!(blank.relation_id, 4);
        assert_ne!(blank.geometry, EMPTY_GEOMETRY);
        assert_eq!(blank.wikidata_id, None);
    }
}
