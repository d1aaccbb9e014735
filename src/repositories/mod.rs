pub mod boundaries;
pub mod progress;
pub mod relations;

pub use boundaries::BoundaryRepository;
pub use progress::ProgressRepository;
pub use relations::RelationRepository;
