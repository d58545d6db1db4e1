pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::{extraction::ExtractionAdapter, ml::PredictionService};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<PredictionService>,
    pub extractor: Arc<ExtractionAdapter>,
}

impl AppState {
    pub fn new(predictor: Arc<PredictionService>, extractor: Arc<ExtractionAdapter>) -> Self {
        Self {
            predictor,
            extractor,
        }
    }
}
