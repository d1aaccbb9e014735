use crate::config::{OVERPASS_AREA_OFFSET, OVERPASS_TIMEOUT_SECS};

/// The searchable area derived from a boundary relation.
pub fn area_id(relation_id: i64) -> i64 {
    OVERPASS_AREA_OFFSET + relation_id
}

/// Top-level boundary relations of a country, matched on the ISO3166-1
/// alpha-3 tag. Ids only keeps the payload small.
pub fn country_root(iso3: &str, level: u8) -> String {
    format!(
        "[out:json][timeout:{timeout}];\n\
         relation[\"boundary\"=\"administrative\"][\"admin_level\"=\"{level}\"][\"ISO3166-1:alpha3\"=\"{iso3}\"];\n\
         out ids;",
        timeout = OVERPASS_TIMEOUT_SECS,
        level = level,
        iso3 = iso3,
    )
}

/// Boundary relations of one admin level spatially inside a parent relation.
pub fn children_of(parent_relation_id: i64, level: u8) -> String {
    format!(
        "[out:json][timeout:{timeout}];\n\
         relation[\"boundary\"=\"administrative\"][\"admin_level\"=\"{level}\"](area:{area});\n\
         out ids;",
        timeout = OVERPASS_TIMEOUT_SECS,
        level = level,
        area = area_id(parent_relation_id),
    )
}

/// Full geometry for a set of relations: the relations themselves plus the
/// ways they reference, so members and point lists arrive interleaved.
pub fn relation_geometry(relation_ids: &[i64]) -> String {
    let ids = relation_ids
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "[out:json][timeout:{timeout}];\n\
         (relation(id:{ids});way(r););\n\
         out geom;",
        timeout = OVERPASS_TIMEOUT_SECS,
        ids = ids,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_id_offset() {
        assert_eq!(area_id(52), 3_600_000_052);
        assert_eq!(area_id(0), 3_600_000_000);
    }

    #[test]
    fn country_root_shape() {
        let q = country_root("BEL", 4);
        assert!(q.starts_with("[out:json][timeout:90];"));
        assert!(q.contains(r#"["boundary"="administrative"]"#));
        assert!(q.contains(r#"["admin_level"="4"]"#));
        assert!(q.contains(r#"["ISO3166-1:alpha3"="BEL"]"#));
        assert!(q.ends_with("out ids;"));
    }

    #[test]
    fn children_use_derived_area() {
        let q = children_of(52, 6);
        assert!(q.contains("(area:3600000052)"));
        assert!(q.contains(r#"["admin_level"="6"]"#));
        assert!(q.ends_with("out ids;"));
    }

    #[test]
    fn geometry_recurses_into_ways() {
        let q = relation_geometry(&[1, 2, 3]);
        assert!(q.contains("relation(id:1,2,3)"));
        assert!(q.contains("way(r);"));
        assert!(q.ends_with("out geom;"));
    }
}
