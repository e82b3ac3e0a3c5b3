use super::area::{BoundingBox, ScanLine, SubRegion};
use crate::common::{haversine_distance, meters_to_deg_lat, meters_to_deg_lon, GeoPoint, PlanningError};
use crate::domains::mission::MissionPlan;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSpec {
    pub sensor_res_w: u32,
    pub sensor_res_h: u32,
    pub pixel_size_mm: f64,
    pub focal_length_mm: f64,
}

impl Default for CameraSpec {
    fn default() -> Self {
        Self {
            sensor_res_w: 4056,
            sensor_res_h: 3040,
            pixel_size_mm: 0.00155,
            focal_length_mm: 8.0,
        }
    }
}

/// Ground footprint and spacing derived from a camera at a given altitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MappingParams {
    pub ground_width_m: f64,
    pub ground_height_m: f64,
    pub gsd_cm: f64,
    pub line_spacing_m: f64,
    /// Along-track photo spacing, kept for photo-trigger tooling.
    pub photo_spacing_m: f64,
}

impl MappingParams {
    pub fn compute(
        camera: &CameraSpec,
        altitude_m: f64,
        overlap_pct: f64,
        sidelap_pct: f64,
    ) -> Result<Self, PlanningError> {
        if !(altitude_m > 0.0) {
            return Err(PlanningError::InvalidParameter {
                reason: format!("altitude must be positive, got {}", altitude_m),
            });
        }
        if !(camera.focal_length_mm > 0.0 && camera.pixel_size_mm > 0.0) {
            return Err(PlanningError::InvalidParameter {
                reason: "camera focal length and pixel size must be positive".to_string(),
            });
        }
        for (name, pct) in [("overlap", overlap_pct), ("sidelap", sidelap_pct)] {
            if !(0.0..100.0).contains(&pct) {
                return Err(PlanningError::InvalidParameter {
                    reason: format!("{} must be in [0, 100), got {}", name, pct),
                });
            }
        }

        let project = |pixels: u32| {
            camera.pixel_size_mm * pixels as f64 * altitude_m / camera.focal_length_mm
        };
        let ground_width_m = project(camera.sensor_res_w);
        let ground_height_m = project(camera.sensor_res_h);

        Ok(Self {
            ground_width_m,
            ground_height_m,
            gsd_cm: camera.pixel_size_mm * altitude_m * 100.0 / camera.focal_length_mm,
            line_spacing_m: ground_height_m * (1.0 - sidelap_pct / 100.0),
            photo_spacing_m: ground_width_m * (1.0 - overlap_pct / 100.0),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanDirection {
    /// Constant-latitude lines.
    Horizontal,
    /// Constant-longitude lines.
    Vertical,
}

/// Ordered points flown along one scan line.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPass {
    pub line: ScanLine,
    pub ascending: bool,
    pub points: Vec<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverageLayout {
    pub mapping: MappingParams,
    pub direction: ScanDirection,
    pub home: GeoPoint,
    pub passes: Vec<ScanPass>,
    pub lines_generated: usize,
}

/// Boustrophedon coverage planner for a single sub-region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoveragePlanner {
    pub camera: CameraSpec,
    pub altitude_m: f64,
    pub overlap_pct: f64,
    pub sidelap_pct: f64,
}

impl CoveragePlanner {
    pub fn new(camera: CameraSpec, altitude_m: f64, overlap_pct: f64, sidelap_pct: f64) -> Self {
        Self {
            camera,
            altitude_m,
            overlap_pct,
            sidelap_pct,
        }
    }

    pub fn plan(&self, region: &SubRegion) -> Result<MissionPlan, PlanningError> {
        let layout = self.layout(region)?;

        let mut points = Vec::with_capacity(1 + layout.passes.iter().map(|p| p.points.len()).sum::<usize>());
        points.push(layout.home);
        points.extend(layout.passes.iter().flat_map(|p| p.points.iter().copied()));

        let line_spacing_m = layout.mapping.line_spacing_m;
        let plan = MissionPlan::from_points(&points, self.altitude_m)
            .map_err(|_| PlanningError::NoCoverage { line_spacing_m })?;

        tracing::info!(
            region = region.index,
            waypoints = plan.len(),
            lines = layout.passes.len(),
            direction = ?layout.direction,
            distance_m = plan.total_distance_m(),
            "coverage plan generated"
        );
        Ok(plan)
    }

    /// Scan passes in flight order, without the home waypoint prepended.
    pub fn layout(&self, region: &SubRegion) -> Result<CoverageLayout, PlanningError> {
        let polygon = &region.polygon;
        let bounds = match polygon.bounds() {
            Some(b) if !polygon.is_degenerate() => b,
            _ => return Err(PlanningError::EmptyRegion),
        };
        let home = polygon.centroid().ok_or(PlanningError::EmptyRegion)?;

        let mapping = MappingParams::compute(
            &self.camera,
            self.altitude_m,
            self.overlap_pct,
            self.sidelap_pct,
        )?;
        let direction = scan_direction(&bounds);
        let lines = scan_lines(&bounds, direction, mapping.line_spacing_m);
        let lines_generated = lines.len();

        let mut passes = Vec::new();
        let mut ascending = true;
        for line in lines {
            let segments = polygon.intersect_scan_line(line);
            if segments.is_empty() {
                continue;
            }
            let mut points: Vec<GeoPoint> = segments.into_iter().flat_map(|(a, b)| [a, b]).collect();
            if !ascending {
                points.reverse();
            }
            passes.push(ScanPass {
                line,
                ascending,
                points,
            });
            ascending = !ascending;
        }

        if passes.is_empty() {
            return Err(PlanningError::NoCoverage {
                line_spacing_m: mapping.line_spacing_m,
            });
        }

        Ok(CoverageLayout {
            mapping,
            direction,
            home,
            passes,
            lines_generated,
        })
    }
}

/// Lines run horizontally when the east-west extent is at least the north-south extent.
pub fn scan_direction(bounds: &BoundingBox) -> ScanDirection {
    let width_m = haversine_distance(bounds.min_lat, bounds.min_lon, bounds.min_lat, bounds.max_lon);
    let height_m = haversine_distance(bounds.min_lat, bounds.min_lon, bounds.max_lat, bounds.min_lon);
    if width_m >= height_m {
        ScanDirection::Horizontal
    } else {
        ScanDirection::Vertical
    }
}

fn scan_lines(bounds: &BoundingBox, direction: ScanDirection, spacing_m: f64) -> Vec<ScanLine> {
    let (start, end, step) = match direction {
        ScanDirection::Horizontal => (bounds.min_lat, bounds.max_lat, meters_to_deg_lat(spacing_m)),
        ScanDirection::Vertical => (
            bounds.min_lon,
            bounds.max_lon,
            meters_to_deg_lon(spacing_m, bounds.mid_lat()),
        ),
    };
    // the last line may sit up to half a step past the far edge
    let count = ((end + step / 2.0 - start) / step).floor() as usize + 1;
    (0..count)
        .map(|i| start + i as f64 * step)
        .map(|offset| match direction {
            ScanDirection::Horizontal => ScanLine::Horizontal { lat: offset },
            ScanDirection::Vertical => ScanLine::Vertical { lon: offset },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_footprint() {
        let mp = MappingParams::compute(&CameraSpec::default(), 50.0, 15.0, 15.0).unwrap();
        assert!((mp.ground_width_m - 39.29).abs() < 0.01);
        assert!((mp.ground_height_m - 29.45).abs() < 0.01);
        assert!((mp.line_spacing_m - 25.03).abs() < 0.01);
        assert!((mp.photo_spacing_m - 33.40).abs() < 0.01);
        assert!((mp.gsd_cm - 0.96875).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_full_sidelap() {
        let err = MappingParams::compute(&CameraSpec::default(), 50.0, 15.0, 100.0).unwrap_err();
        assert!(matches!(err, PlanningError::InvalidParameter { .. }));
    }

    #[test]
    fn test_scan_lines_include_far_edge() {
        let bounds = BoundingBox {
            min_lon: 0.0,
            min_lat: 0.0,
            max_lon: 1.0,
            max_lat: 0.001,
        };
        let lines = scan_lines(&bounds, ScanDirection::Horizontal, 25.0);
        let step = meters_to_deg_lat(25.0);
        let last = match lines.last().unwrap() {
            ScanLine::Horizontal { lat } => *lat,
            ScanLine::Vertical { .. } => panic!("expected horizontal lines"),
        };
        assert!(last + step / 2.0 >= bounds.max_lat);
    }
}
