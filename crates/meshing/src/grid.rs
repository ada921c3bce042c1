//! Uniform N x N spatial binning of features over their source extent.
//!
//! Binning only decides emission order and grouping; it never changes the
//! geometry that ends up in a cell.

use std::collections::BTreeMap;

use formats::{Feature, Geometry, Polygon, SourceCoordinate};
use foundation::Aabb2;
use runtime::EventBus;
use serde::Serialize;

use crate::error::{PipelineError, kinds};
use crate::triangulate::open_ring;

/// Grid cell key. Ordering is row-major: by `row`, then by `col`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GridCell {
    pub row: u32,
    pub col: u32,
}

impl GridCell {
    pub fn new(col: u32, row: u32) -> Self {
        Self { row, col }
    }

    pub fn as_array(self) -> [u32; 2] {
        [self.col, self.row]
    }
}

/// One binned unit of geometry, borrowed from the input features.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ItemGeometry<'a> {
    Polygon(&'a Polygon),
    Line(&'a [SourceCoordinate]),
    Point(SourceCoordinate),
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CellItem<'a> {
    /// Index of the owning feature in the input slice.
    pub feature: usize,
    pub geometry: ItemGeometry<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridBins<'a> {
    pub resolution: u32,
    /// Source-space extent; `None` when the input has no finite coordinate.
    pub extent: Option<Aabb2>,
    /// True when a zero-width or zero-height extent forced a single cell.
    pub single_cell: bool,
    pub cells: BTreeMap<GridCell, Vec<CellItem<'a>>>,
}

impl GridBins<'_> {
    pub fn item_count(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }

    pub fn cell_of(&self, feature: usize) -> Vec<GridCell> {
        self.cells
            .iter()
            .filter(|(_, items)| items.iter().any(|i| i.feature == feature))
            .map(|(cell, _)| *cell)
            .collect()
    }
}

/// Splits every feature into binnable items (MultiX members separately).
///
/// Fails on the first unsupported geometry.
pub fn items(features: &[Feature]) -> Result<Vec<CellItem<'_>>, PipelineError> {
    let mut out = Vec::with_capacity(features.len());
    for (index, feature) in features.iter().enumerate() {
        let item = |geometry| CellItem {
            feature: index,
            geometry,
        };
        match &feature.geometry {
            Geometry::Point(c) => out.push(item(ItemGeometry::Point(*c))),
            Geometry::MultiPoint(points) => {
                out.extend(points.iter().map(|c| item(ItemGeometry::Point(*c))))
            }
            Geometry::LineString(line) => out.push(item(ItemGeometry::Line(line))),
            Geometry::MultiLineString(lines) => {
                out.extend(lines.iter().map(|l| item(ItemGeometry::Line(l))))
            }
            Geometry::Polygon(polygon) => out.push(item(ItemGeometry::Polygon(polygon))),
            Geometry::MultiPolygon(polygons) => {
                out.extend(polygons.iter().map(|p| item(ItemGeometry::Polygon(p))))
            }
            Geometry::Unsupported(kind) => {
                return Err(PipelineError::UnsupportedGeometry {
                    feature: index,
                    kind: kind.clone(),
                });
            }
        }
    }
    Ok(out)
}

/// Pass 1: source extent over polygon exteriors, line vertices and points.
pub fn extent_of(items: &[CellItem<'_>]) -> Option<Aabb2> {
    let mut bounds = Aabb2::empty();
    for item in items {
        match item.geometry {
            ItemGeometry::Polygon(p) => p.exterior.iter().for_each(|c| bounds.extend(c.x, c.y)),
            ItemGeometry::Line(line) => line.iter().for_each(|c| bounds.extend(c.x, c.y)),
            ItemGeometry::Point(c) => bounds.extend(c.x, c.y),
        }
    }
    (!bounds.is_empty()).then_some(bounds)
}

/// Representative `(x, y)` used for cell assignment.
pub fn representative_point(geometry: &ItemGeometry<'_>) -> Option<(f64, f64)> {
    match geometry {
        ItemGeometry::Point(c) => Some((c.x, c.y)),
        ItemGeometry::Line(line) => vertex_average(line),
        ItemGeometry::Polygon(p) => {
            let ring = open_ring(&p.exterior);
            area_centroid(ring).or_else(|| vertex_average(ring))
        }
    }
}

fn vertex_average(coords: &[SourceCoordinate]) -> Option<(f64, f64)> {
    if coords.is_empty() {
        return None;
    }
    let n = coords.len() as f64;
    let (sx, sy) = coords
        .iter()
        .fold((0.0, 0.0), |(sx, sy), c| (sx + c.x, sy + c.y));
    Some((sx / n, sy / n))
}

/// Shoelace centroid; `None` for zero-area rings.
fn area_centroid(ring: &[SourceCoordinate]) -> Option<(f64, f64)> {
    if ring.len() < 3 {
        return None;
    }
    // Relative to the first vertex to keep large projected coordinates exact.
    let (ox, oy) = (ring[0].x, ring[0].y);
    let mut twice_area = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for (i, a) in ring.iter().enumerate() {
        let b = ring[(i + 1) % ring.len()];
        let (ax, ay) = (a.x - ox, a.y - oy);
        let (bx, by) = (b.x - ox, b.y - oy);
        let cross = ax * by - bx * ay;
        twice_area += cross;
        cx += (ax + bx) * cross;
        cy += (ay + by) * cross;
    }
    if twice_area == 0.0 || !twice_area.is_finite() {
        return None;
    }
    Some((ox + cx / (3.0 * twice_area), oy + cy / (3.0 * twice_area)))
}

fn axis_index(value: f64, min: f64, cell_size: f64, n: u32) -> u32 {
    let raw = ((value - min) / cell_size).floor();
    if !raw.is_finite() || raw < 0.0 {
        return 0;
    }
    (raw as u64).min(n as u64 - 1) as u32
}

/// Bins `features` into an `n` x `n` grid.
///
/// Unsupported geometry aborts before any assignment. A degenerate extent
/// collapses everything into cell `(0, 0)`; an input without coordinates
/// yields no cells. Both cases are reported on `events`.
pub fn bin<'a>(
    features: &'a [Feature],
    n: u32,
    events: &mut EventBus,
) -> Result<GridBins<'a>, PipelineError> {
    if n == 0 {
        return Err(PipelineError::Configuration(
            "grid resolution must be at least 1".to_string(),
        ));
    }

    let items = items(features)?;
    let extent = extent_of(&items);
    Ok(assign(items, extent, n, events))
}

/// Pass 2: assigns items to cells of `extent` split `n` x `n`.
pub fn assign<'a>(
    items: Vec<CellItem<'a>>,
    extent: Option<Aabb2>,
    n: u32,
    events: &mut EventBus,
) -> GridBins<'a> {
    let n = n.max(1);
    let Some(extent) = extent else {
        events.warn(
            kinds::MISSING_INPUT,
            format!("no coordinates in {} item(s); nothing to bin", items.len()),
        );
        return GridBins {
            resolution: n,
            extent: None,
            single_cell: false,
            cells: BTreeMap::new(),
        };
    };

    let (width, height) = (extent.width(), extent.height());
    let single_cell = width == 0.0 || height == 0.0;
    if single_cell {
        events.warn(
            kinds::DEGENERATE_EXTENT,
            PipelineError::DegenerateExtent { width, height }.to_string(),
        );
    }

    let (cell_w, cell_h) = (width / n as f64, height / n as f64);
    let mut cells: BTreeMap<GridCell, Vec<CellItem<'a>>> = BTreeMap::new();
    for item in items {
        let cell = match representative_point(&item.geometry) {
            Some((x, y)) if !single_cell => GridCell::new(
                axis_index(x, extent.min[0], cell_w, n),
                axis_index(y, extent.min[1], cell_h, n),
            ),
            _ => GridCell::new(0, 0),
        };
        cells.entry(cell).or_default().push(item);
    }

    GridBins {
        resolution: n,
        extent: Some(extent),
        single_cell,
        cells,
    }
}

#[cfg(test)]
mod tests {
    use formats::{Feature, Geometry, Polygon, SourceCoordinate};
    use pretty_assertions::assert_eq;
    use runtime::EventBus;

    use super::{GridCell, ItemGeometry, bin, representative_point};
    use crate::error::{PipelineError, kinds};

    fn point(x: f64, y: f64) -> Feature {
        Feature::new(Geometry::Point(SourceCoordinate::xy(x, y)))
    }

    fn square(x0: f64, y0: f64, size: f64) -> Polygon {
        Polygon::new(vec![
            SourceCoordinate::xy(x0, y0),
            SourceCoordinate::xy(x0 + size, y0),
            SourceCoordinate::xy(x0 + size, y0 + size),
            SourceCoordinate::xy(x0, y0 + size),
            SourceCoordinate::xy(x0, y0),
        ])
    }

    #[test]
    fn cells_iterate_row_major() {
        let mut cells = vec![
            GridCell::new(2, 0),
            GridCell::new(0, 1),
            GridCell::new(1, 0),
        ];
        cells.sort();
        assert_eq!(
            cells,
            vec![GridCell::new(1, 0), GridCell::new(2, 0), GridCell::new(0, 1)]
        );
    }

    #[test]
    fn points_land_in_their_cells_with_max_clamped() {
        let features = vec![point(0.0, 0.0), point(10.0, 10.0), point(4.9, 5.1)];
        let mut events = EventBus::new();
        let bins = bin(&features, 2, &mut events).expect("bin");

        assert_eq!(bins.cell_of(0), vec![GridCell::new(0, 0)]);
        assert_eq!(bins.cell_of(1), vec![GridCell::new(1, 1)]);
        assert_eq!(bins.cell_of(2), vec![GridCell::new(0, 1)]);
        assert!(events.events().is_empty());
    }

    #[test]
    fn polygon_bins_on_area_weighted_centroid() {
        // An L-shape whose vertex average and area centroid differ.
        let l_shape = Polygon::new(vec![
            SourceCoordinate::xy(0.0, 0.0),
            SourceCoordinate::xy(4.0, 0.0),
            SourceCoordinate::xy(4.0, 1.0),
            SourceCoordinate::xy(1.0, 1.0),
            SourceCoordinate::xy(1.0, 4.0),
            SourceCoordinate::xy(0.0, 4.0),
        ]);
        let (cx, cy) = representative_point(&ItemGeometry::Polygon(&l_shape)).expect("centroid");
        assert!((cx - 19.0 / 14.0).abs() < 1e-12, "{cx}");
        assert!((cy - 19.0 / 14.0).abs() < 1e-12, "{cy}");

        let sq = square(2.0, 2.0, 2.0);
        assert_eq!(
            representative_point(&ItemGeometry::Polygon(&sq)),
            Some((3.0, 3.0))
        );
    }

    #[test]
    fn zero_area_polygon_falls_back_to_vertex_average() {
        let flat = Polygon::new(vec![
            SourceCoordinate::xy(0.0, 0.0),
            SourceCoordinate::xy(1.0, 0.0),
            SourceCoordinate::xy(2.0, 0.0),
        ]);
        assert_eq!(
            representative_point(&ItemGeometry::Polygon(&flat)),
            Some((1.0, 0.0))
        );
    }

    #[test]
    fn single_feature_uses_one_cell_without_dividing_by_zero() {
        let features = vec![point(14.4, 50.1)];
        let mut events = EventBus::new();
        let bins = bin(&features, 10, &mut events).expect("bin");

        assert!(bins.single_cell);
        assert_eq!(bins.cells.len(), 1);
        assert_eq!(bins.cell_of(0), vec![GridCell::new(0, 0)]);
        assert_eq!(events.count_kind(kinds::DEGENERATE_EXTENT), 1);
    }

    #[test]
    fn multipolygon_members_bin_separately() {
        let features = vec![Feature::new(Geometry::MultiPolygon(vec![
            square(0.0, 0.0, 1.0),
            square(9.0, 9.0, 1.0),
        ]))];
        let mut events = EventBus::new();
        let bins = bin(&features, 2, &mut events).expect("bin");

        assert_eq!(bins.item_count(), 2);
        assert_eq!(
            bins.cell_of(0),
            vec![GridCell::new(0, 0), GridCell::new(1, 1)]
        );
    }

    #[test]
    fn unsupported_geometry_aborts_before_assignment() {
        let features = vec![
            point(0.0, 0.0),
            Feature::new(Geometry::Unsupported("GeometryCollection".to_string())),
        ];
        let mut events = EventBus::new();
        let err = bin(&features, 4, &mut events).unwrap_err();
        assert_eq!(
            err,
            PipelineError::UnsupportedGeometry {
                feature: 1,
                kind: "GeometryCollection".to_string()
            }
        );
    }

    #[test]
    fn empty_input_yields_empty_bins_and_a_warning() {
        let mut events = EventBus::new();
        let bins = bin(&[], 4, &mut events).expect("bin");
        assert!(bins.cells.is_empty());
        assert_eq!(bins.extent, None);
        assert_eq!(events.count_kind(kinds::MISSING_INPUT), 1);
    }

    #[test]
    fn binning_is_deterministic() {
        let features: Vec<Feature> = (0..200)
            .map(|i| point((i * 37 % 101) as f64, (i * 53 % 89) as f64))
            .collect();
        let mut events = EventBus::new();
        let a = bin(&features, 7, &mut events).expect("bin");
        let b = bin(&features, 7, &mut events).expect("bin");
        assert_eq!(a, b);
        assert_eq!(a.item_count(), 200);
    }
}
