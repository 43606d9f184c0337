//! Top-K rating prediction over a candidate catalog.

pub mod engine;
pub mod ranker;

pub use engine::{RecommendEngine, RecommendationResponse};
pub use ranker::{rank, recommend, round_to};
