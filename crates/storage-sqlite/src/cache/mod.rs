//! Recommendation cache storage.

pub mod model;
pub mod repository;

pub use model::RecommendationCacheDB;
pub use repository::RecommendationCacheRepository;
