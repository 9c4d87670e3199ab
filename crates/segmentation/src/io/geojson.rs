use std::path::Path;

use geojson::{Feature, FeatureCollection, Geometry, Value};

use crate::{
    contour::PixelContour,
    error::{Result, SegmentationError},
    geometry::PixelPosition,
    types::SegmentationOutcome,
};

fn number(value: f64) -> serde_json::Value {
    serde_json::Number::from_f64(value)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

impl SegmentationOutcome {
    /// Export as a FeatureCollection holding one closed polygon.
    ///
    /// An unavailable segmentation exports an empty collection that still
    /// carries the image dimensions.
    pub fn to_geojson(&self) -> FeatureCollection {
        let mut features = Vec::new();

        if self.is_available() {
            let mut ring: Vec<Vec<f64>> = self
                .contour
                .points()
                .iter()
                .map(|p| vec![p.x as f64, p.y as f64])
                .collect();
            // GeoJSON rings repeat their first position
            if let Some(first) = ring.first().cloned() {
                ring.push(first);
            }

            let mut properties = serde_json::Map::new();
            properties.insert("area".to_string(), number(self.area()));
            properties.insert("perimeter".to_string(), number(self.perimeter()));
            properties.insert("point_count".to_string(), serde_json::Value::from(self.contour.len()));
            if let Some([x, y]) = self.centroid() {
                properties.insert("centroid".to_string(), serde_json::Value::Array(vec![number(x), number(y)]));
            }

            features.push(Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Polygon(vec![ring]))),
                id: Some(geojson::feature::Id::Number(serde_json::Number::from(0))),
                properties: Some(properties),
                foreign_members: None,
            });
        }

        // Add metadata to foreign members of the FeatureCollection
        let mut foreign_members = serde_json::Map::new();
        foreign_members.insert("image_width".to_string(), serde_json::Value::from(self.image_width));
        foreign_members.insert("image_height".to_string(), serde_json::Value::from(self.image_height));

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign_members),
        }
    }

    /// Export to GeoJSON and serialize to JSON string
    pub fn to_geojson_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_geojson())?)
    }

    /// Save GeoJSON to file
    pub fn save_geojson<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_geojson_string()?)?;
        Ok(())
    }

    /// Load an outcome from a GeoJSON file
    pub fn from_geojson_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let geojson_str = std::fs::read_to_string(path)?;
        Self::from_geojson_str(&geojson_str)
    }

    /// Load an outcome from a GeoJSON string; the exterior ring of the first
    /// polygon feature becomes the contour.
    pub fn from_geojson_str(geojson_str: &str) -> Result<Self> {
        let geojson: FeatureCollection = geojson_str.parse()?;

        let foreign_members = geojson
            .foreign_members
            .as_ref()
            .ok_or_else(|| SegmentationError::invalid("missing image metadata in GeoJSON"))?;
        let dimension = |key: &str| {
            foreign_members
                .get(key)
                .and_then(|v| v.as_u64())
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| SegmentationError::invalid(format!("missing or invalid {key}")))
        };
        let image_width = dimension("image_width")?;
        let image_height = dimension("image_height")?;

        let ring = geojson
            .features
            .into_iter()
            .filter_map(|feature| feature.geometry)
            .find_map(|geometry| match geometry.value {
                Value::Polygon(mut rings) if !rings.is_empty() => Some(rings.swap_remove(0)),
                _ => None,
            })
            .unwrap_or_default();

        let points = ring
            .iter()
            .map(|coord| match coord.as_slice() {
                [x, y, ..] if *x >= 0.0 && *y >= 0.0 => Ok(PixelPosition::new(x.round() as u32, y.round() as u32)),
                _ => Err(SegmentationError::invalid("polygon coordinates must be non-negative pairs")),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(PixelContour::new(points).distinct(), image_width, image_height))
    }
}
