use serde::Deserialize;
use std::collections::HashMap;

/// Top-level Overpass interpreter response. Ids-only queries return bare
/// elements; geometry queries interleave ways (with point lists) and
/// relations (with member references).
#[derive(Debug, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
pub struct OverpassElement {
    #[serde(rename = "type")]
    pub element_type: String,
    pub id: i64,
    #[serde(default)]
    pub tags: Option<HashMap<String, String>>,
    #[serde(default)]
    pub members: Option<Vec<RelationMember>>,
    #[serde(default)]
    pub geometry: Option<Vec<GeometryPoint>>,
}

impl OverpassElement {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.as_ref().and_then(|t| t.get(key)).map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
pub struct RelationMember {
    #[serde(rename = "type")]
    pub member_type: String,
    #[serde(rename = "ref")]
    pub member_ref: i64,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GeometryPoint {
    pub lat: f64,
    pub lon: f64,
}
