use crate::common::{BoundaryError, GeoPoint};
use crate::domains::survey::{BoundarySource, SurveyArea};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::PathBuf;

/// Reads the survey boundary from a KML file: the outer boundary of the
/// first `<Polygon>` in document order.
pub struct KmlBoundaryLoader {
    path: PathBuf,
}

impl KmlBoundaryLoader {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BoundarySource for KmlBoundaryLoader {
    async fn load_boundary(&self) -> Result<SurveyArea, BoundaryError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        parse_kml_boundary(&content)
    }
}

pub fn parse_kml_boundary(content: &str) -> Result<SurveyArea, BoundaryError> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut in_polygon = false;
    let mut in_inner = false;
    let mut in_coordinates = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"Polygon" => in_polygon = true,
                b"innerBoundaryIs" => in_inner = true,
                b"coordinates" => in_coordinates = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"Polygon" => in_polygon = false,
                b"innerBoundaryIs" => in_inner = false,
                b"coordinates" => in_coordinates = false,
                _ => {}
            },
            Ok(Event::Text(text)) if in_polygon && !in_inner && in_coordinates => {
                let text = text
                    .unescape()
                    .map_err(|e| BoundaryError::Parse(e.to_string()))?;
                return parse_coordinates(&text);
            }
            Ok(Event::Eof) => return Err(BoundaryError::NoPolygon),
            Ok(_) => {}
            Err(e) => {
                return Err(BoundaryError::Parse(format!(
                    "KML error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }
}

/// KML tuples are `lon,lat[,alt]` separated by whitespace.
fn parse_coordinates(text: &str) -> Result<SurveyArea, BoundaryError> {
    let vertices = text
        .split_whitespace()
        .map(|tuple| {
            let mut fields = tuple.split(',').map(str::parse::<f64>);
            match (fields.next(), fields.next()) {
                (Some(Ok(lon)), Some(Ok(lat))) => Ok(GeoPoint::new(lat, lon)),
                _ => Err(BoundaryError::Parse(format!("invalid coordinate tuple {:?}", tuple))),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    if vertices.is_empty() {
        return Err(BoundaryError::NoPolygon);
    }
    Ok(SurveyArea::new(vertices))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <Placemark>
      <name>mast</name>
      <Point><coordinates>8.5,47.5,0</coordinates></Point>
    </Placemark>
    <Placemark>
      <name>30ha</name>
      <Polygon>
        <outerBoundaryIs><LinearRing><coordinates>
          8.0,47.0,0 8.01,47.0,0 8.01,47.005,0 8.0,47.005,0 8.0,47.0,0
        </coordinates></LinearRing></outerBoundaryIs>
        <innerBoundaryIs><LinearRing><coordinates>
          8.004,47.002,0 8.005,47.002,0 8.005,47.003,0 8.004,47.002,0
        </coordinates></LinearRing></innerBoundaryIs>
      </Polygon>
    </Placemark>
  </Document>
</kml>"#;

    #[test]
    fn test_outer_ring_of_first_polygon() {
        let area = parse_kml_boundary(FIELD).unwrap();
        let vertices = area.polygon().vertices();
        assert_eq!(vertices.len(), 4);
        assert_eq!(vertices[0], GeoPoint::new(47.0, 8.0));
        assert_eq!(vertices[2], GeoPoint::new(47.005, 8.01));
    }

    #[test]
    fn test_point_only_document() {
        let doc = r#"<kml><Placemark><Point><coordinates>8.5,47.5</coordinates></Point></Placemark></kml>"#;
        assert!(matches!(parse_kml_boundary(doc), Err(BoundaryError::NoPolygon)));
    }

    #[test]
    fn test_bad_tuple() {
        let doc = r#"<kml><Polygon><outerBoundaryIs><LinearRing><coordinates>8.0;47.0 8.1,47.1</coordinates></LinearRing></outerBoundaryIs></Polygon></kml>"#;
        assert!(matches!(parse_kml_boundary(doc), Err(BoundaryError::Parse(_))));
    }
}
