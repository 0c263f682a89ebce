//! Uniform hash grid for radius queries in the ground plane.

use std::collections::HashMap;

use crate::types::WorldPoint;

/// Buckets point indices by ground-plane cell.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f64,
    grid: HashMap<(i64, i64), Vec<usize>>,
}

impl SpatialGrid {
    /// `cell_size` should match the typical query radius.
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            grid: HashMap::new(),
        }
    }

    #[inline]
    fn key(&self, x: f64, y: f64) -> (i64, i64) {
        (
            (x / self.cell_size).floor() as i64,
            (y / self.cell_size).floor() as i64,
        )
    }

    /// Drop all entries but keep bucket allocations.
    pub fn clear(&mut self) {
        for bucket in self.grid.values_mut() {
            bucket.clear();
        }
    }

    pub fn set_cell_size(&mut self, cell_size: f64) {
        if cell_size != self.cell_size {
            self.cell_size = cell_size;
            self.grid.clear();
        }
    }

    /// Index all points; bucket order follows slice order.
    pub fn build(&mut self, points: &[WorldPoint]) {
        // Buckets for cells no longer visited would otherwise accumulate.
        if self.grid.len() > 4 * points.len() + 1024 {
            self.grid.clear();
        }
        self.clear();
        for (i, p) in points.iter().enumerate() {
            let key = self.key(p.x, p.y);
            self.grid.entry(key).or_default().push(i);
        }
    }

    /// Indices of points within `radius` of `center` (inclusive), written to `out`.
    ///
    /// Output order depends only on cell scan order and bucket order, never on
    /// hash iteration.
    pub fn within(
        &self,
        points: &[WorldPoint],
        center: &WorldPoint,
        radius: f64,
        out: &mut Vec<usize>,
    ) {
        out.clear();
        let reach = (radius / self.cell_size).ceil() as i64;
        let (cx, cy) = self.key(center.x, center.y);
        let r2 = radius * radius;
        for gx in (cx - reach)..=(cx + reach) {
            for gy in (cy - reach)..=(cy + reach) {
                if let Some(ids) = self.grid.get(&(gx, gy)) {
                    out.extend(
                        ids.iter()
                            .copied()
                            .filter(|&j| points[j].distance_xy_sq(center) <= r2),
                    );
                }
            }
        }
    }
}
