use super::area::{SubRegion, SurveyArea};
use crate::common::PartitionError;

/// Relative area below which a clipped strip counts as empty.
const MIN_AREA_FRACTION: f64 = 1e-9;

/// Splits a survey area into equal-width longitude strips, one per drone.
///
/// Every drone runs this independently on the same area, so the output depends
/// only on `(area, total_parts, index)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AreaPartitioner;

impl AreaPartitioner {
    pub fn partition(
        &self,
        area: &SurveyArea,
        total_parts: usize,
        index: usize,
    ) -> Result<SubRegion, PartitionError> {
        let polygon = area.polygon();
        let vertices = polygon.vertices().len();
        if vertices < 3 {
            return Err(PartitionError::DegeneratePolygon { vertices });
        }
        if total_parts == 0 || index >= total_parts {
            return Err(PartitionError::InvalidIndex { index, total_parts });
        }
        let total_area = polygon.area();
        let bounds = match polygon.bounds() {
            Some(b) if !polygon.is_degenerate() => b,
            _ => return Err(PartitionError::DegeneratePolygon { vertices }),
        };

        if total_parts == 1 {
            return Ok(SubRegion {
                index,
                total_parts,
                polygon: polygon.clone(),
            });
        }

        let width = (bounds.max_lon - bounds.min_lon) / total_parts as f64;
        let min_lon = bounds.min_lon + index as f64 * width;
        let max_lon = if index + 1 == total_parts {
            bounds.max_lon
        } else {
            bounds.min_lon + (index + 1) as f64 * width
        };

        let clipped = polygon.clip_to_lon_range(min_lon, max_lon);
        if clipped.vertices().len() < 3 || clipped.area() <= total_area * MIN_AREA_FRACTION {
            return Err(PartitionError::EmptyRegion { index, total_parts });
        }

        tracing::debug!(
            index,
            total_parts,
            min_lon,
            max_lon,
            vertices = clipped.vertices().len(),
            "partitioned survey area"
        );

        Ok(SubRegion {
            index,
            total_parts,
            polygon: clipped,
        })
    }
}
