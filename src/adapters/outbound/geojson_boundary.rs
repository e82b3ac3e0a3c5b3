use crate::common::{BoundaryError, GeoPoint};
use crate::domains::survey::{BoundarySource, SurveyArea};
use async_trait::async_trait;
use geojson::{GeoJson, Geometry, Value};
use std::path::PathBuf;

/// Reads the survey boundary from a GeoJSON file. The outer ring of the first
/// polygon found is used; positions are `[lon, lat]`.
pub struct GeoJsonBoundaryLoader {
    path: PathBuf,
}

impl GeoJsonBoundaryLoader {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BoundarySource for GeoJsonBoundaryLoader {
    async fn load_boundary(&self) -> Result<SurveyArea, BoundaryError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        parse_boundary(&content)
    }
}

pub fn parse_boundary(content: &str) -> Result<SurveyArea, BoundaryError> {
    let document: GeoJson = content
        .parse()
        .map_err(|e: geojson::Error| BoundaryError::Parse(e.to_string()))?;

    let ring = match &document {
        GeoJson::Geometry(geometry) => outer_ring(geometry),
        GeoJson::Feature(feature) => feature.geometry.as_ref().and_then(outer_ring),
        GeoJson::FeatureCollection(collection) => collection
            .features
            .iter()
            .filter_map(|f| f.geometry.as_ref())
            .find_map(outer_ring),
    }
    .ok_or(BoundaryError::NoPolygon)?;

    let vertices = ring
        .iter()
        .map(|position| match position.as_slice() {
            [lon, lat, ..] => Ok(GeoPoint::new(*lat, *lon)),
            _ => Err(BoundaryError::Parse(format!("invalid position {:?}", position))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SurveyArea::new(vertices))
}

fn outer_ring(geometry: &Geometry) -> Option<&Vec<Vec<f64>>> {
    match &geometry.value {
        Value::Polygon(rings) => rings.first(),
        Value::MultiPolygon(polygons) => polygons.first().and_then(|rings| rings.first()),
        Value::GeometryCollection(members) => members.iter().find_map(outer_ring),
        _ => None,
    }
}
