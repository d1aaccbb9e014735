use std::collections::HashMap;

/// One discovered OSM boundary relation, as persisted in the raw table.
/// `geometry` is EWKT; `tags` is carried verbatim into the jsonb column.
#[derive(Debug, Clone)]
pub struct BoundaryRelation {
    pub relation_id: i64,
    pub country_code: String,
    pub admin_level: i32,
    pub name: String,
    pub wikidata_id: Option<String>,
    pub geometry: String,
    pub tags: HashMap<String, String>,
}

/// Consumer-facing projection keyed by wikidata id.
#[derive(Debug, Clone)]
pub struct EnrichedBoundary {
    pub wikidata_id: String,
    pub commons_category: String,
    pub admin_level: i32,
    pub name: String,
    pub geom: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ProgressStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::Pending => "pending",
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProgressStatus::Pending),
            "in_progress" => Some(ProgressStatus::InProgress),
            "completed" => Some(ProgressStatus::Completed),
            "failed" => Some(ProgressStatus::Failed),
            _ => None,
        }
    }
}

/// Why transform rows were rejected, for the operator summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct DropCounts {
    pub missing_wikidata: usize,
    pub missing_category: usize,
    pub invalid_geometry: usize,
    pub duplicates: usize,
}

impl DropCounts {
    pub fn total(&self) -> usize {
        self.missing_wikidata + self.missing_category + self.invalid_geometry + self.duplicates
    }
}

#[derive(Debug, Clone)]
pub struct RowError {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct InsertStats {
    pub inserted: usize,
    pub errors: Vec<RowError>,
}

/// Everything the operator sees about one country run.
#[derive(Debug, Default)]
pub struct CountrySummary {
    pub country_code: String,
    pub relations_discovered: usize,
    pub geometries_parsed: usize,
    pub wikidata_matches: usize,
    pub transformed: usize,
    pub inserted: usize,
    pub drops: DropCounts,
    pub row_errors: Vec<RowError>,
    pub level_counts: Vec<(i32, i64)>,
    pub null_fields: i64,
    pub invalid_geometries: i64,
}
