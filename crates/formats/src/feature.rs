use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;

use foundation::Aabb2;
use foundation::math::exact_bits;
use serde_json::{Map, Value};

/// A source-space coordinate. `z` is NaN when the source has no altitude.
///
/// Equality and hashing are exact over the bit patterns of all three
/// components (no tolerance); every NaN counts as the same "missing" value.
/// This makes the type usable as a memoization key for vertex welding.
#[derive(Debug, Copy, Clone)]
pub struct SourceCoordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl SourceCoordinate {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// A coordinate with a missing altitude.
    pub fn xy(x: f64, y: f64) -> Self {
        Self::new(x, y, f64::NAN)
    }

    pub fn has_z(&self) -> bool {
        !self.z.is_nan()
    }

    fn key(&self) -> (u64, u64, u64) {
        (exact_bits(self.x), exact_bits(self.y), exact_bits(self.z))
    }
}

impl PartialEq for SourceCoordinate {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for SourceCoordinate {}

impl Hash for SourceCoordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polygon {
    pub exterior: Vec<SourceCoordinate>,
    /// Holes. Carried for completeness; triangulation ignores them.
    pub interiors: Vec<Vec<SourceCoordinate>>,
}

impl Polygon {
    pub fn new(exterior: Vec<SourceCoordinate>) -> Self {
        Self {
            exterior,
            interiors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Geometry {
    Point(SourceCoordinate),
    MultiPoint(Vec<SourceCoordinate>),
    LineString(Vec<SourceCoordinate>),
    MultiLineString(Vec<Vec<SourceCoordinate>>),
    Polygon(Polygon),
    MultiPolygon(Vec<Polygon>),
    /// A geometry type the pipeline cannot emit (e.g. `GeometryCollection`).
    Unsupported(String),
}

impl Geometry {
    pub fn kind_name(&self) -> &str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::LineString(_) => "LineString",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
            Geometry::Unsupported(kind) => kind,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Geometry::Unsupported(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Option<String>,
    pub geometry: Geometry,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self { id: None, geometry }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    /// Features dropped because their geometry was `null`.
    pub null_geometries: usize,
}

/// Per-kind counts plus the planar source extent, for inspection tooling.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CollectionStats {
    pub points: usize,
    pub lines: usize,
    pub polygons: usize,
    pub unsupported: usize,
    pub coordinates: usize,
    pub extent: Option<Aabb2>,
}

#[derive(Debug)]
pub enum FeatureSourceError {
    Io(std::io::Error),
    NotAFeatureCollection,
    InvalidFeature { index: usize, reason: String },
}

impl fmt::Display for FeatureSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureSourceError::Io(err) => write!(f, "I/O error: {err}"),
            FeatureSourceError::NotAFeatureCollection => {
                write!(f, "expected GeoJSON FeatureCollection")
            }
            FeatureSourceError::InvalidFeature { index, reason } => {
                write!(f, "invalid feature at index {index}: {reason}")
            }
        }
    }
}

impl std::error::Error for FeatureSourceError {}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            features,
            null_geometries: 0,
        }
    }

    pub fn load_geojson(path: impl AsRef<Path>) -> Result<Self, FeatureSourceError> {
        let payload = std::fs::read_to_string(path).map_err(FeatureSourceError::Io)?;
        Self::from_geojson_str(&payload)
    }

    pub fn from_geojson_str(payload: &str) -> Result<Self, FeatureSourceError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| FeatureSourceError::InvalidFeature {
                index: 0,
                reason: format!("JSON parse error: {e}"),
            })?;
        Self::from_geojson_value(&value)
    }

    pub fn from_geojson_value(value: &Value) -> Result<Self, FeatureSourceError> {
        let obj = value
            .as_object()
            .ok_or(FeatureSourceError::NotAFeatureCollection)?;
        let ty = obj
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or(FeatureSourceError::NotAFeatureCollection)?;
        if ty != "FeatureCollection" {
            return Err(FeatureSourceError::NotAFeatureCollection);
        }

        let features_val = obj
            .get("features")
            .and_then(|v| v.as_array())
            .ok_or(FeatureSourceError::NotAFeatureCollection)?;

        let mut out = Self::default();
        out.features.reserve(features_val.len());
        for (index, feat_val) in features_val.iter().enumerate() {
            match parse_feature(feat_val)
                .map_err(|reason| FeatureSourceError::InvalidFeature { index, reason })?
            {
                Some(feature) => out.features.push(feature),
                None => out.null_geometries += 1,
            }
        }

        Ok(out)
    }

    pub fn stats(&self) -> CollectionStats {
        let mut stats = CollectionStats::default();
        let mut extent = Aabb2::empty();
        let mut visit = |coords: &[SourceCoordinate], stats: &mut CollectionStats| {
            stats.coordinates += coords.len();
            for c in coords {
                extent.extend(c.x, c.y);
            }
        };

        for feature in &self.features {
            match &feature.geometry {
                Geometry::Point(p) => {
                    stats.points += 1;
                    visit(std::slice::from_ref(p), &mut stats);
                }
                Geometry::MultiPoint(ps) => {
                    stats.points += ps.len();
                    visit(ps, &mut stats);
                }
                Geometry::LineString(line) => {
                    stats.lines += 1;
                    visit(line, &mut stats);
                }
                Geometry::MultiLineString(lines) => {
                    stats.lines += lines.len();
                    for line in lines {
                        visit(line, &mut stats);
                    }
                }
                Geometry::Polygon(poly) => {
                    stats.polygons += 1;
                    visit(&poly.exterior, &mut stats);
                }
                Geometry::MultiPolygon(polys) => {
                    stats.polygons += polys.len();
                    for poly in polys {
                        visit(&poly.exterior, &mut stats);
                    }
                }
                Geometry::Unsupported(_) => stats.unsupported += 1,
            }
        }

        stats.extent = (!extent.is_empty()).then_some(extent);
        stats
    }
}

fn parse_feature(value: &Value) -> Result<Option<Feature>, String> {
    let feat_obj = value
        .as_object()
        .ok_or("feature must be an object".to_string())?;

    let feat_type = feat_obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("feature missing type".to_string())?;
    if feat_type != "Feature" {
        return Err(format!("unexpected feature type: {feat_type}"));
    }

    let id = match feat_obj.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    let geometry = match feat_obj.get("geometry") {
        None => return Err("feature missing geometry".to_string()),
        Some(Value::Null) => return Ok(None),
        Some(Value::Object(obj)) => parse_geometry(obj)?,
        Some(_) => return Err("geometry must be an object".to_string()),
    };

    Ok(Some(Feature { id, geometry }))
}

fn parse_geometry(obj: &Map<String, Value>) -> Result<Geometry, String> {
    let ty = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("geometry missing type".to_string())?;

    let coords = || {
        obj.get("coordinates")
            .ok_or(format!("{ty} geometry missing coordinates"))
    };

    match ty {
        "Point" => Ok(Geometry::Point(parse_position(coords()?)?)),
        "MultiPoint" => Ok(Geometry::MultiPoint(parse_positions(coords()?)?)),
        "LineString" => Ok(Geometry::LineString(parse_positions(coords()?)?)),
        "MultiLineString" => Ok(Geometry::MultiLineString(parse_lines(coords()?)?)),
        "Polygon" => Ok(Geometry::Polygon(parse_polygon(coords()?)?)),
        "MultiPolygon" => Ok(Geometry::MultiPolygon(parse_multi_polygon(coords()?)?)),
        other => Ok(Geometry::Unsupported(other.to_string())),
    }
}

fn parse_position(coords: &Value) -> Result<SourceCoordinate, String> {
    let arr = coords
        .as_array()
        .ok_or("position must be an array".to_string())?;
    if arr.len() < 2 {
        return Err("position must have at least [x, y]".to_string());
    }
    let component = |i: usize, name: &str| {
        arr[i]
            .as_f64()
            .ok_or(format!("position {name} must be a number"))
    };
    let x = component(0, "x")?;
    let y = component(1, "y")?;
    let z = match arr.get(2) {
        Some(Value::Null) | None => f64::NAN,
        Some(_) => component(2, "z")?,
    };
    Ok(SourceCoordinate::new(x, y, z))
}

fn parse_positions(coords: &Value) -> Result<Vec<SourceCoordinate>, String> {
    let arr = coords
        .as_array()
        .ok_or("coordinates must be an array".to_string())?;
    arr.iter().map(parse_position).collect()
}

fn parse_lines(coords: &Value) -> Result<Vec<Vec<SourceCoordinate>>, String> {
    let arr = coords
        .as_array()
        .ok_or("MultiLineString coordinates must be an array".to_string())?;
    arr.iter().map(parse_positions).collect()
}

fn parse_polygon(coords: &Value) -> Result<Polygon, String> {
    let rings = coords
        .as_array()
        .ok_or("Polygon coordinates must be an array of rings".to_string())?;
    let mut rings = rings
        .iter()
        .map(parse_positions)
        .collect::<Result<Vec<_>, _>>()?
        .into_iter();
    let exterior = rings
        .next()
        .ok_or("Polygon must have an exterior ring".to_string())?;
    Ok(Polygon {
        exterior,
        interiors: rings.collect(),
    })
}

fn parse_multi_polygon(coords: &Value) -> Result<Vec<Polygon>, String> {
    let polys = coords
        .as_array()
        .ok_or("MultiPolygon coordinates must be an array of polygons".to_string())?;
    polys.iter().map(parse_polygon).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;

    use super::{FeatureCollection, FeatureSourceError, Geometry, SourceCoordinate};

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "id": 7, "properties": {},
             "geometry": {"type": "Point", "coordinates": [14.4, 50.1, 210.5]}},
            {"type": "Feature", "properties": {},
             "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}},
            {"type": "Feature", "properties": {},
             "geometry": {"type": "Polygon", "coordinates": [
                [[0, 0], [4, 0], [4, 4], [0, 4], [0, 0]],
                [[1, 1], [2, 1], [2, 2], [1, 1]]
             ]}},
            {"type": "Feature", "properties": {}, "geometry": null},
            {"type": "Feature", "properties": {},
             "geometry": {"type": "GeometryCollection", "geometries": []}}
        ]
    }"#;

    #[test]
    fn parses_mixed_collection() {
        let fc = FeatureCollection::from_geojson_str(SAMPLE).expect("parse");
        assert_eq!(fc.features.len(), 4);
        assert_eq!(fc.null_geometries, 1);
        assert_eq!(fc.features[0].id.as_deref(), Some("7"));
        assert_eq!(
            fc.features[0].geometry,
            Geometry::Point(SourceCoordinate::new(14.4, 50.1, 210.5))
        );

        let Geometry::LineString(line) = &fc.features[1].geometry else {
            panic!("expected line");
        };
        assert!(!line[0].has_z());

        let Geometry::Polygon(poly) = &fc.features[2].geometry else {
            panic!("expected polygon");
        };
        assert_eq!(poly.exterior.len(), 5);
        assert_eq!(poly.interiors.len(), 1);

        assert_eq!(
            fc.features[3].geometry,
            Geometry::Unsupported("GeometryCollection".to_string())
        );
    }

    #[test]
    fn stats_count_kinds_and_extent() {
        let fc = FeatureCollection::from_geojson_str(SAMPLE).expect("parse");
        let stats = fc.stats();
        assert_eq!(stats.points, 1);
        assert_eq!(stats.lines, 1);
        assert_eq!(stats.polygons, 1);
        assert_eq!(stats.unsupported, 1);
        assert_eq!(stats.coordinates, 1 + 2 + 5);
        let extent = stats.extent.expect("extent");
        assert_eq!(extent.min, [0.0, 0.0]);
        assert_eq!(extent.max, [14.4, 50.1]);
    }

    #[test]
    fn rejects_non_collections_and_bad_positions() {
        let err = FeatureCollection::from_geojson_str(r#"{"type": "Feature"}"#).unwrap_err();
        assert!(matches!(err, FeatureSourceError::NotAFeatureCollection));

        let bad = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1]}}
        ]}"#;
        let err = FeatureCollection::from_geojson_str(bad).unwrap_err();
        assert!(matches!(
            err,
            FeatureSourceError::InvalidFeature { index: 0, .. }
        ));
    }

    #[test]
    fn coordinate_equality_is_bitwise() {
        let a = SourceCoordinate::xy(1.0, 2.0);
        let b = SourceCoordinate::xy(1.0, 2.0);
        assert_eq!(a, b);
        assert_ne!(
            SourceCoordinate::new(0.0, 1.0, 0.0),
            SourceCoordinate::new(-0.0, 1.0, 0.0)
        );
        assert_ne!(
            SourceCoordinate::xy(0.1 + 0.2, 0.0),
            SourceCoordinate::xy(0.3, 0.0)
        );

        let set: HashSet<_> = [a, b, SourceCoordinate::new(1.0, 2.0, 3.0)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }
}
