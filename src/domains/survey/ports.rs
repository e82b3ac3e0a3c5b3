use super::area::SurveyArea;
use crate::common::BoundaryError;
use async_trait::async_trait;

/// Port for loading the survey boundary (file, network, ...).
#[async_trait]
pub trait BoundarySource: Send + Sync {
    async fn load_boundary(&self) -> Result<SurveyArea, BoundaryError>;
}
