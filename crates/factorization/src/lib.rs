//! Matrix-factorization engine: rating table ingestion, index maps,
//! SGD training of biased latent factors, and the durable model artifact.

pub mod matrix;
pub mod model;
pub mod store;
pub mod table;
pub mod trainer;

pub use matrix::{IdIndex, RatingMatrix, RatingTriple};
pub use model::FactorModel;
pub use store::{ModelStore, FORMAT_VERSION};
pub use table::{catalog_from_records, read_rating_csv, read_rating_table, TableColumns};
pub use trainer::{SgdTrainer, TrainerOptions};
