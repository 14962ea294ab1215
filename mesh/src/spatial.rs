use nalgebra::Point3;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

/// Vertex index paired with its position, for R*-tree queries.
pub(crate) struct IndexedPoint(pub usize, pub Point3<f64>);

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 3]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.1.x, self.1.y, self.1.z])
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.1.x - point[0];
        let dy = self.1.y - point[1];
        let dz = self.1.z - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

/// Bulk-loads an R*-tree over an indexed point set.
pub(crate) fn index_tree(points: &[Point3<f64>]) -> RTree<IndexedPoint> {
    let wrappers: Vec<IndexedPoint> = points
        .iter()
        .enumerate()
        .map(|(i, p)| IndexedPoint(i, *p))
        .collect();
    RTree::bulk_load(wrappers)
}
