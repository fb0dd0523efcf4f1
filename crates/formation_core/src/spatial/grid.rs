use fxhash::FxHashMap;

use crate::model::{EntityId, Formation, Position};

/// Uniform spatial hash over entity positions.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f32,
    cells: FxHashMap<(i32, i32), Vec<EntityId>>,
    positions: FxHashMap<EntityId, Position>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(f32::EPSILON),
            cells: FxHashMap::default(),
            positions: FxHashMap::default(),
        }
    }

    /// Index every placed entity of `formation`.
    pub fn from_formation(formation: &Formation, cell_size: f32) -> Self {
        let mut grid = Self::new(cell_size);
        for (entity, pos) in formation.placed_entities() {
            grid.insert(entity, pos);
        }
        grid
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    pub fn cell_of(&self, pos: Position) -> (i32, i32) {
        ((pos.x / self.cell_size).floor() as i32, (pos.y / self.cell_size).floor() as i32)
    }

    /// Insert or move an entity.
    pub fn insert(&mut self, entity: EntityId, pos: Position) {
        self.remove(entity);
        let cell = self.cell_of(pos);
        self.cells.entry(cell).or_default().push(entity);
        self.positions.insert(entity, pos);
    }

    pub fn remove(&mut self, entity: EntityId) -> Option<Position> {
        let pos = self.positions.remove(&entity)?;
        let cell = self.cell_of(pos);
        if let Some(bucket) = self.cells.get_mut(&cell) {
            bucket.retain(|e| *e != entity);
            if bucket.is_empty() {
                self.cells.remove(&cell);
            }
        }
        Some(pos)
    }

    pub fn position(&self, entity: EntityId) -> Option<Position> {
        self.positions.get(&entity).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.positions.clear();
    }

    /// Entities in the 3×3 neighbourhood of `pos`.
    pub fn neighbors(&self, pos: Position) -> impl Iterator<Item = (EntityId, Position)> + '_ {
        let (cx, cy) = self.cell_of(pos);
        (-1..=1)
            .flat_map(move |dx| (-1..=1).map(move |dy| (cx + dx, cy + dy)))
            .filter_map(move |cell| self.cells.get(&cell))
            .flatten()
            .filter_map(move |e| self.positions.get(e).map(|p| (*e, *p)))
    }

    /// Entities strictly closer than `radius` to `pos`, ordered by entity id.
    ///
    /// `radius` must not exceed the cell size.
    pub fn colliders(
        &self,
        pos: Position,
        radius: f32,
        exclude: Option<EntityId>,
    ) -> Vec<(EntityId, Position, f32)> {
        debug_assert!(radius <= self.cell_size + f32::EPSILON);
        let radius_sq = radius * radius;
        let mut hits: Vec<(EntityId, Position, f32)> = self
            .neighbors(pos)
            .filter(|(e, _)| Some(*e) != exclude)
            .filter_map(|(e, p)| {
                let d_sq = pos.distance_sq(&p);
                (d_sq < radius_sq).then(|| (e, p, d_sq.sqrt()))
            })
            .collect();
        hits.sort_by_key(|(e, _, _)| *e);
        hits
    }

    pub fn is_clear(&self, pos: Position, radius: f32, exclude: Option<EntityId>) -> bool {
        let radius_sq = radius * radius;
        !self
            .neighbors(pos)
            .any(|(e, p)| Some(e) != exclude && pos.distance_sq(&p) < radius_sq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_move_remove() {
        let mut grid = SpatialGrid::new(10.0);
        grid.insert(EntityId(1), Position::new(5.0, 5.0));
        grid.insert(EntityId(1), Position::new(55.0, 55.0));
        assert_eq!(grid.len(), 1);
        assert!(grid.neighbors(Position::new(5.0, 5.0)).next().is_none());
        assert_eq!(grid.remove(EntityId(1)), Some(Position::new(55.0, 55.0)));
        assert!(grid.is_empty());
    }

    #[test]
    fn test_colliders_cross_cell_boundaries() {
        let mut grid = SpatialGrid::new(10.0);
        grid.insert(EntityId(2), Position::new(19.9, 20.0));
        grid.insert(EntityId(1), Position::new(24.0, 20.0));
        grid.insert(EntityId(3), Position::new(40.0, 20.0));
        let hits = grid.colliders(Position::new(20.1, 20.0), 5.0, None);
        let ids: Vec<EntityId> = hits.iter().map(|(e, _, _)| *e).collect();
        assert_eq!(ids, vec![EntityId(1), EntityId(2)]);
    }

    #[test]
    fn test_exclude_self() {
        let mut grid = SpatialGrid::new(10.0);
        grid.insert(EntityId(1), Position::new(50.0, 50.0));
        assert!(grid.is_clear(Position::new(50.0, 51.0), 5.0, Some(EntityId(1))));
        assert!(!grid.is_clear(Position::new(50.0, 51.0), 5.0, None));
    }
}
