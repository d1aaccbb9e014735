pub mod osm;
pub mod records;

pub use osm::{GeometryPoint, OverpassElement, OverpassResponse, RelationMember};
pub use records::{
    BoundaryRelation, CountrySummary, DropCounts, EnrichedBoundary, InsertStats, ProgressStatus,
    RowError,
};
