//! Export core: pure helpers and state shared by the fetch pipeline.
mod batch;
mod ids;
mod index;
mod page;

pub use batch::{advance, BatchAction, BatchEvent, BatchPhase};
pub use ids::collect_unique;
pub use index::index_by;
pub use page::Page;
