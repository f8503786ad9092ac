use std::cmp::Reverse;
use std::collections::BTreeMap;

use engine::{
    EntityId, GraphPath, Movable, PathPoll, PathPriority, PathService, PathTag, PathTicket, Vec2,
};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CellCoord {
    x: u32,
    y: u32,
}

#[derive(Debug, Clone, Copy)]
struct PendingQuery {
    requester: EntityId,
    start: Vec2,
    end: Vec2,
    priority: PathPriority,
    own_cell: Option<usize>,
    avoid_units: bool,
}

/// Uniform grid navigation: terrain and footprints block cells statically,
/// movers occupy the cell they stand in. Queries are resolved in batches by
/// [`GridPathService::process_queries`], highest priority first.
#[derive(Debug, Clone)]
pub(crate) struct GridPathService {
    width: u32,
    height: u32,
    cell_size: f32,
    static_blocks: Vec<u16>,
    occupants: Vec<u16>,
    pending: BTreeMap<PathTicket, PendingQuery>,
    resolved: BTreeMap<PathTicket, (EntityId, PathPoll)>,
    queries_per_tick: usize,
    next_ticket: u64,
}

impl GridPathService {
    pub(crate) fn new(width: u32, height: u32, cell_size: f32, queries_per_tick: usize) -> Self {
        let cells = (width as usize) * (height as usize);
        Self {
            width,
            height,
            cell_size,
            static_blocks: vec![0; cells],
            occupants: vec![0; cells],
            pending: BTreeMap::new(),
            resolved: BTreeMap::new(),
            queries_per_tick: queries_per_tick.max(1),
            next_ticket: 1,
        }
    }

    pub(crate) fn extent(&self) -> Vec2 {
        Vec2::new(
            self.width as f32 * self.cell_size,
            self.height as f32 * self.cell_size,
        )
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub(crate) fn block_cell_at(&mut self, position: Vec2) {
        if let Some(index) = self.cell_index_at(position) {
            self.static_blocks[index] = self.static_blocks[index].saturating_add(1);
        }
    }

    /// Blocks every cell whose center lies inside the circle, and at least the
    /// cell under the center.
    pub(crate) fn block_footprint(&mut self, center: Vec2, radius: f32) {
        for index in self.footprint_cells(center, radius) {
            self.static_blocks[index] = self.static_blocks[index].saturating_add(1);
        }
    }

    pub(crate) fn unblock_footprint(&mut self, center: Vec2, radius: f32) {
        for index in self.footprint_cells(center, radius) {
            self.static_blocks[index] = self.static_blocks[index].saturating_sub(1);
        }
    }

    /// True when every cell of the footprint is free of both terrain and units.
    pub(crate) fn is_footprint_clear(&self, center: Vec2, radius: f32) -> bool {
        let cells = self.footprint_cells(center, radius);
        !cells.is_empty()
            && cells
                .into_iter()
                .all(|index| self.static_blocks[index] == 0 && self.occupants[index] == 0)
    }

    #[cfg(test)]
    pub(crate) fn is_walkable(&self, position: Vec2) -> bool {
        self.cell_index_at(position)
            .is_some_and(|index| self.static_blocks[index] == 0)
    }

    /// Drops the mover's occupancy, e.g. when it dies.
    pub(crate) fn remove_movable(&mut self, mover: &mut dyn Movable) {
        if let Some(old) = mover.path_tag().0 {
            if let Some(count) = self.occupants.get_mut(old as usize) {
                *count = count.saturating_sub(1);
            }
        }
        mover.set_path_tag(PathTag(None));
    }

    /// Resolves up to `queries_per_tick` pending queries, highest priority and
    /// then oldest first.
    pub(crate) fn process_queries(&mut self) -> usize {
        let mut order: Vec<(Reverse<PathPriority>, PathTicket)> = self
            .pending
            .iter()
            .map(|(ticket, query)| (Reverse(query.priority), *ticket))
            .collect();
        order.sort();
        order.truncate(self.queries_per_tick);

        let processed = order.len();
        for (_, ticket) in order {
            let Some(query) = self.pending.remove(&ticket) else {
                continue;
            };
            let poll = match self.build_path(&query) {
                Some(path) => {
                    trace!(ticket = ticket.0, edges = path.len(), "path_query_resolved");
                    PathPoll::Found(path)
                }
                None => {
                    debug!(
                        ticket = ticket.0,
                        start_x = query.start.x,
                        start_y = query.start.y,
                        end_x = query.end.x,
                        end_y = query.end.y,
                        "path_query_unreachable"
                    );
                    PathPoll::NotFound
                }
            };
            self.resolved.insert(ticket, (query.requester, poll));
        }
        processed
    }

    /// Hands out every resolved query together with the entity that asked
    /// for it, oldest ticket first. Taken results no longer show up in
    /// [`PathService::poll_query`].
    pub(crate) fn take_resolved(&mut self) -> Vec<(EntityId, PathTicket, PathPoll)> {
        std::mem::take(&mut self.resolved)
            .into_iter()
            .map(|(ticket, (requester, poll))| (requester, ticket, poll))
            .collect()
    }

    fn build_path(&self, query: &PendingQuery) -> Option<GraphPath> {
        let start = self.cell_index_at(query.start)?;
        let goal = self.cell_index_at(query.end)?;
        if self.static_blocks[goal] > 0 {
            return None;
        }
        let cells = self.find_path_cells(start, goal, |index| {
            if self.static_blocks[index] > 0 {
                return false;
            }
            if !query.avoid_units || index == goal {
                return true;
            }
            let own = u16::from(query.own_cell == Some(index));
            self.occupants[index].saturating_sub(own) == 0
        })?;

        let mut waypoints = simplify_cells(&cells, self.width)
            .into_iter()
            .map(|index| self.cell_center(index))
            .collect::<Vec<_>>();
        match waypoints.last_mut() {
            Some(last) => *last = query.end,
            None => waypoints.push(query.end),
        }
        Some(GraphPath::from_waypoints(query.start, &waypoints))
    }

    fn coord_of(&self, index: usize) -> CellCoord {
        CellCoord {
            x: (index as u32) % self.width,
            y: (index as u32) / self.width,
        }
    }

    fn index_of(&self, coord: CellCoord) -> Option<usize> {
        if coord.x >= self.width || coord.y >= self.height {
            return None;
        }
        Some(coord.y as usize * self.width as usize + coord.x as usize)
    }

    fn cell_index_at(&self, position: Vec2) -> Option<usize> {
        if !position.is_finite() {
            return None;
        }
        let x = (position.x / self.cell_size).floor();
        let y = (position.y / self.cell_size).floor();
        if x < 0.0 || y < 0.0 {
            return None;
        }
        self.index_of(CellCoord {
            x: x as u32,
            y: y as u32,
        })
    }

    fn cell_center(&self, index: usize) -> Vec2 {
        let coord = self.coord_of(index);
        Vec2::new(
            (coord.x as f32 + 0.5) * self.cell_size,
            (coord.y as f32 + 0.5) * self.cell_size,
        )
    }

    fn footprint_cells(&self, center: Vec2, radius: f32) -> Vec<usize> {
        let mut cells = Vec::new();
        let reach = (radius / self.cell_size).ceil() as i64 + 1;
        let Some(center_index) = self.cell_index_at(center) else {
            return cells;
        };
        let origin = self.coord_of(center_index);
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let x = origin.x as i64 + dx;
                let y = origin.y as i64 + dy;
                if x < 0 || y < 0 {
                    continue;
                }
                let Some(index) = self.index_of(CellCoord {
                    x: x as u32,
                    y: y as u32,
                }) else {
                    continue;
                };
                if index == center_index
                    || self.cell_center(index).distance(center) <= radius
                {
                    cells.push(index);
                }
            }
        }
        cells
    }

    fn is_free_for(&self, index: usize, tag: PathTag, include_units: bool) -> bool {
        if self.static_blocks[index] > 0 {
            return false;
        }
        if !include_units {
            return true;
        }
        let own = u16::from(tag.0 == Some(index as u64));
        self.occupants[index].saturating_sub(own) == 0
    }

    fn find_path_cells(
        &self,
        start: usize,
        goal: usize,
        passable: impl Fn(usize) -> bool,
    ) -> Option<Vec<usize>> {
        if start == goal {
            return Some(vec![start]);
        }

        let goal_coord = self.coord_of(goal);
        let node_count = self.static_blocks.len();
        let mut closed = vec![false; node_count];
        let mut best_g = vec![u32::MAX; node_count];
        let mut parent = vec![None::<usize>; node_count];
        let mut open = Vec::new();
        let mut next_insertion = 0u64;

        let start_h = manhattan_distance(self.coord_of(start), goal_coord);
        open.push(OpenNode {
            index: start,
            coord: self.coord_of(start),
            h_cost: start_h,
            f_cost: start_h,
            insertion_order: next_insertion,
        });
        next_insertion += 1;
        best_g[start] = 0;

        while !open.is_empty() {
            let best_index = pick_best_open_node_index(&open);
            let current = open.swap_remove(best_index);
            if closed[current.index] {
                continue;
            }
            closed[current.index] = true;

            if current.index == goal {
                return reconstruct_cell_path(&parent, start, goal);
            }

            let current_g = best_g[current.index];
            for neighbor in self.neighbors(current.coord).into_iter().flatten() {
                let Some(neighbor_index) = self.index_of(neighbor) else {
                    continue;
                };
                if closed[neighbor_index] || !passable(neighbor_index) {
                    continue;
                }

                let tentative_g = current_g.saturating_add(1);
                if tentative_g >= best_g[neighbor_index] {
                    continue;
                }

                best_g[neighbor_index] = tentative_g;
                parent[neighbor_index] = Some(current.index);
                let h_cost = manhattan_distance(neighbor, goal_coord);
                open.push(OpenNode {
                    index: neighbor_index,
                    coord: neighbor,
                    h_cost,
                    f_cost: tentative_g.saturating_add(h_cost),
                    insertion_order: next_insertion,
                });
                next_insertion += 1;
            }
        }

        None
    }

    fn neighbors(&self, coord: CellCoord) -> [Option<CellCoord>; 4] {
        let north = (coord.y + 1 < self.height).then(|| CellCoord {
            x: coord.x,
            y: coord.y + 1,
        });
        let east = (coord.x + 1 < self.width).then(|| CellCoord {
            x: coord.x + 1,
            y: coord.y,
        });
        let south = (coord.y > 0).then(|| CellCoord {
            x: coord.x,
            y: coord.y - 1,
        });
        let west = (coord.x > 0).then(|| CellCoord {
            x: coord.x - 1,
            y: coord.y,
        });
        [north, east, south, west]
    }
}

impl PathService for GridPathService {
    fn find_next_valid_position(
        &self,
        original: Vec2,
        current: Vec2,
        previous: Option<Vec2>,
        mover: &dyn Movable,
    ) -> Vec2 {
        let tag = mover.path_tag();
        let include_units = !mover.ignore_dynamic_obstacles();
        if let Some(index) = self.cell_index_at(original) {
            if self.is_free_for(index, tag, include_units) {
                return original;
            }
        }
        if let Some(previous) = previous {
            if let Some(index) = self.cell_index_at(previous) {
                if self.is_free_for(index, tag, include_units) {
                    return previous;
                }
            }
        }

        let extent = self.extent();
        let margin = self.cell_size * 0.5;
        let clamped = Vec2::new(
            original.x.clamp(0.0, extent.x - margin),
            original.y.clamp(0.0, extent.y - margin),
        );
        let Some(origin_index) = self.cell_index_at(clamped) else {
            return original;
        };
        let origin = self.coord_of(origin_index);
        let max_ring = self.width.max(self.height) as i64;
        for ring in 1..=max_ring {
            let mut best: Option<(f32, f32, usize)> = None;
            for dy in -ring..=ring {
                for dx in -ring..=ring {
                    if dx.abs() != ring && dy.abs() != ring {
                        continue;
                    }
                    let x = origin.x as i64 + dx;
                    let y = origin.y as i64 + dy;
                    if x < 0 || y < 0 {
                        continue;
                    }
                    let Some(index) = self.index_of(CellCoord {
                        x: x as u32,
                        y: y as u32,
                    }) else {
                        continue;
                    };
                    if !self.is_free_for(index, tag, include_units) {
                        continue;
                    }
                    let center = self.cell_center(index);
                    let key = (
                        center.distance_squared(original),
                        center.distance_squared(current),
                        index,
                    );
                    if best.map_or(true, |current_best| key < current_best) {
                        best = Some(key);
                    }
                }
            }
            if let Some((_, _, index)) = best {
                return self.cell_center(index);
            }
        }
        original
    }

    fn can_move_between(
        &self,
        start: Vec2,
        end: Vec2,
        mover: &dyn Movable,
        include_dynamic_obstacles: bool,
    ) -> bool {
        let include_units = include_dynamic_obstacles && !mover.ignore_dynamic_obstacles();
        let tag = mover.path_tag();
        let step = self.cell_size * 0.5;
        let samples = (start.distance(end) / step).ceil().max(1.0) as u32;
        let start_cell = self.cell_index_at(start);
        for sample in 0..=samples {
            let t = sample as f32 / samples as f32;
            let point = start + (end - start) * t;
            let Some(index) = self.cell_index_at(point) else {
                return false;
            };
            if Some(index) == start_cell {
                continue;
            }
            if !self.is_free_for(index, tag, include_units) {
                return false;
            }
        }
        true
    }

    fn query_path(
        &mut self,
        start: Vec2,
        end: Vec2,
        priority: PathPriority,
        mover: &dyn Movable,
    ) -> PathTicket {
        let ticket = PathTicket(self.next_ticket);
        self.next_ticket += 1;
        self.pending.insert(
            ticket,
            PendingQuery {
                requester: mover.id(),
                start,
                end,
                priority,
                own_cell: mover.path_tag().0.map(|cell| cell as usize),
                avoid_units: !mover.ignore_dynamic_obstacles(),
            },
        );
        ticket
    }

    fn poll_query(&mut self, ticket: PathTicket) -> PathPoll {
        if let Some((_, poll)) = self.resolved.remove(&ticket) {
            return poll;
        }
        if self.pending.contains_key(&ticket) {
            PathPoll::Pending
        } else {
            PathPoll::Unknown
        }
    }

    fn cancel_query(&mut self, ticket: PathTicket) {
        self.pending.remove(&ticket);
        self.resolved.remove(&ticket);
    }

    fn can_be_placed_at(&self, position: Vec2, mover: &dyn Movable) -> bool {
        self.cell_index_at(position).is_some_and(|index| {
            self.is_free_for(index, mover.path_tag(), !mover.ignore_dynamic_obstacles())
        })
    }

    fn update_movable(&mut self, mover: &mut dyn Movable) {
        let new_cell = self.cell_index_at(mover.position());
        let old_cell = mover.path_tag().0.map(|cell| cell as usize);
        if new_cell == old_cell {
            return;
        }
        if let Some(old) = old_cell {
            if let Some(count) = self.occupants.get_mut(old) {
                *count = count.saturating_sub(1);
            }
        }
        if let Some(new) = new_cell {
            self.occupants[new] = self.occupants[new].saturating_add(1);
        }
        mover.set_path_tag(PathTag(new_cell.map(|cell| cell as u64)));
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenNode {
    index: usize,
    coord: CellCoord,
    h_cost: u32,
    f_cost: u32,
    insertion_order: u64,
}

fn pick_best_open_node_index(open: &[OpenNode]) -> usize {
    let mut best_index = 0usize;
    for index in 1..open.len() {
        if open_node_order_key(open[index]) < open_node_order_key(open[best_index]) {
            best_index = index;
        }
    }
    best_index
}

fn open_node_order_key(node: OpenNode) -> (u32, u32, u32, u32, u64) {
    (
        node.f_cost,
        node.h_cost,
        node.coord.y,
        node.coord.x,
        node.insertion_order,
    )
}

fn reconstruct_cell_path(
    parent: &[Option<usize>],
    start: usize,
    goal: usize,
) -> Option<Vec<usize>> {
    let mut cursor = goal;
    let mut cells = vec![cursor];
    while cursor != start {
        cursor = parent.get(cursor).and_then(|value| *value)?;
        cells.push(cursor);
    }
    cells.reverse();
    Some(cells)
}

/// Drops the start cell and every cell where the walk keeps going straight.
fn simplify_cells(cells: &[usize], width: u32) -> Vec<usize> {
    let width = width as i64;
    let step = |a: usize, b: usize| {
        let (a, b) = (a as i64, b as i64);
        (b % width - a % width, b / width - a / width)
    };
    let mut kept = Vec::new();
    for position in 1..cells.len() {
        let is_last = position + 1 == cells.len();
        let (prev, here) = (cells[position - 1], cells[position]);
        if is_last || step(prev, here) != step(here, cells[position + 1]) {
            kept.push(cells[position]);
        }
    }
    kept
}

fn manhattan_distance(a: CellCoord, b: CellCoord) -> u32 {
    a.x.abs_diff(b.x).saturating_add(a.y.abs_diff(b.y))
}

#[cfg(test)]
mod tests {
    use engine::{Brush, EntityId};

    use super::*;

    struct Walker {
        position: Vec2,
        facing: Vec2,
        tag: PathTag,
        ghost: bool,
    }

    impl Walker {
        fn at(x: f32, y: f32) -> Self {
            Self {
                position: Vec2::new(x, y),
                facing: Vec2::new(1.0, 0.0),
                tag: PathTag::default(),
                ghost: false,
            }
        }
    }

    impl Movable for Walker {
        fn id(&self) -> EntityId {
            EntityId(9)
        }
        fn position(&self) -> Vec2 {
            self.position
        }
        fn set_position(&mut self, position: Vec2) {
            self.position = position;
        }
        fn facing(&self) -> Vec2 {
            self.facing
        }
        fn set_facing(&mut self, facing: Vec2) {
            self.facing = facing;
        }
        fn brush(&self) -> Brush {
            Brush::new(2.0)
        }
        fn speed(&self) -> f32 {
            10.0
        }
        fn ignore_dynamic_obstacles(&self) -> bool {
            self.ghost
        }
        fn path_tag(&self) -> PathTag {
            self.tag
        }
        fn set_path_tag(&mut self, tag: PathTag) {
            self.tag = tag;
        }
    }

    fn center(x: u32, y: u32) -> Vec2 {
        Vec2::new(x as f32 * 10.0 + 5.0, y as f32 * 10.0 + 5.0)
    }

    /// 7x5 grid with a wall at column 3 that leaves only row 4 open.
    fn walled_grid() -> GridPathService {
        let mut grid = GridPathService::new(7, 5, 10.0, 4);
        for y in 0..4 {
            grid.block_cell_at(center(3, y));
        }
        grid
    }

    fn resolve(grid: &mut GridPathService, start: Vec2, end: Vec2) -> PathPoll {
        let walker = Walker::at(start.x, start.y);
        let ticket = grid.query_path(start, end, PathPriority::Normal, &walker);
        assert_eq!(grid.poll_query(ticket), PathPoll::Pending);
        grid.process_queries();
        grid.poll_query(ticket)
    }

    #[test]
    fn path_never_steps_onto_blocked_cells() {
        let mut grid = walled_grid();
        let PathPoll::Found(path) = resolve(&mut grid, center(1, 2), center(5, 2)) else {
            panic!("expected a path");
        };
        for edge in path.edges() {
            let steps = (edge.from.distance(edge.to) / 5.0).ceil() as u32;
            for step in 0..=steps {
                let point = edge.from + (edge.to - edge.from) * (step as f32 / steps as f32);
                assert!(grid.is_walkable(point), "path crosses wall at {point:?}");
            }
        }
        assert_eq!(path.edges().last().map(|edge| edge.to), Some(center(5, 2)));
    }

    #[test]
    fn collinear_steps_are_merged_into_single_edges() {
        let mut grid = GridPathService::new(8, 8, 10.0, 4);
        let PathPoll::Found(path) = resolve(&mut grid, center(0, 0), center(5, 0)) else {
            panic!("expected a path");
        };
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn tie_breaks_are_deterministic() {
        let mut grid = GridPathService::new(5, 5, 10.0, 4);
        grid.block_cell_at(center(2, 2));
        let first = resolve(&mut grid, center(0, 2), center(4, 2));
        let second = resolve(&mut grid, center(0, 2), center(4, 2));
        assert_eq!(first, second);
        assert!(matches!(first, PathPoll::Found(_)));
    }

    #[test]
    fn sealed_goal_is_not_found() {
        let mut grid = GridPathService::new(6, 6, 10.0, 4);
        for (x, y) in [(4, 3), (5, 3), (4, 4), (4, 5)] {
            grid.block_cell_at(center(x, y));
        }
        let poll = resolve(&mut grid, center(0, 0), center(5, 5));
        assert_eq!(poll, PathPoll::NotFound);
    }

    #[test]
    fn per_tick_budget_serves_high_priority_first() {
        let mut grid = GridPathService::new(6, 6, 10.0, 1);
        let walker = Walker::at(5.0, 5.0);
        let low = grid.query_path(center(0, 0), center(5, 5), PathPriority::Low, &walker);
        let high = grid.query_path(center(0, 0), center(5, 0), PathPriority::High, &walker);

        assert_eq!(grid.process_queries(), 1);
        assert!(matches!(grid.poll_query(high), PathPoll::Found(_)));
        assert_eq!(grid.poll_query(low), PathPoll::Pending);
        grid.process_queries();
        assert!(matches!(grid.poll_query(low), PathPoll::Found(_)));
        assert_eq!(grid.poll_query(low), PathPoll::Unknown);
    }

    #[test]
    fn resolved_queries_are_handed_out_once_with_their_requester() {
        let mut grid = GridPathService::new(6, 6, 10.0, 4);
        let walker = Walker::at(5.0, 5.0);
        let kept = grid.query_path(center(0, 0), center(5, 0), PathPriority::Normal, &walker);
        let dropped = grid.query_path(center(0, 0), center(5, 5), PathPriority::Normal, &walker);
        grid.cancel_query(dropped);
        grid.process_queries();

        let resolved = grid.take_resolved();
        assert_eq!(resolved.len(), 1);
        let (requester, ticket, poll) = &resolved[0];
        assert_eq!(*requester, EntityId(9));
        assert_eq!(*ticket, kept);
        assert!(matches!(poll, PathPoll::Found(_)));

        assert_eq!(grid.poll_query(kept), PathPoll::Unknown);
        assert!(grid.take_resolved().is_empty());
    }

    #[test]
    fn cancelled_queries_never_resolve() {
        let mut grid = GridPathService::new(6, 6, 10.0, 4);
        let walker = Walker::at(5.0, 5.0);
        let ticket = grid.query_path(center(0, 0), center(5, 5), PathPriority::Normal, &walker);
        grid.cancel_query(ticket);
        grid.cancel_query(ticket);
        grid.process_queries();
        assert_eq!(grid.poll_query(ticket), PathPoll::Unknown);
        assert_eq!(grid.pending_count(), 0);
    }

    #[test]
    fn next_valid_position_leaves_a_footprint_for_the_nearest_free_cell() {
        let mut grid = GridPathService::new(10, 10, 10.0, 4);
        let building = center(5, 5);
        grid.block_footprint(building, 12.0);
        let walker = Walker::at(5.0, 5.0);

        let adjusted = grid.find_next_valid_position(building, walker.position, None, &walker);
        assert!(grid.is_walkable(adjusted));
        let limit = 12.0 + 10.0 * 1.5;
        assert!(adjusted.distance(building) <= limit, "{adjusted:?}");

        grid.unblock_footprint(building, 12.0);
        assert!(grid.is_walkable(building));
    }

    #[test]
    fn occupancy_follows_update_movable_and_blocks_others() {
        let mut grid = GridPathService::new(6, 6, 10.0, 4);
        let mut resident = Walker::at(25.0, 25.0);
        grid.update_movable(&mut resident);
        let visitor = Walker::at(5.0, 25.0);

        assert!(!grid.can_be_placed_at(Vec2::new(24.0, 26.0), &visitor));
        assert!(grid.can_be_placed_at(Vec2::new(24.0, 26.0), &resident));
        assert!(!grid.can_move_between(visitor.position, Vec2::new(55.0, 25.0), &visitor, true));
        assert!(grid.can_move_between(visitor.position, Vec2::new(55.0, 25.0), &visitor, false));

        let ghost = Walker {
            ghost: true,
            ..Walker::at(5.0, 25.0)
        };
        assert!(grid.can_be_placed_at(Vec2::new(24.0, 26.0), &ghost));

        resident.set_position(Vec2::new(45.0, 45.0));
        grid.update_movable(&mut resident);
        assert!(grid.can_be_placed_at(Vec2::new(24.0, 26.0), &visitor));

        grid.remove_movable(&mut resident);
        assert_eq!(resident.path_tag(), PathTag(None));
        assert!(grid.can_be_placed_at(Vec2::new(45.0, 45.0), &visitor));
    }

    #[test]
    fn positions_off_the_map_are_never_placeable() {
        let grid = GridPathService::new(4, 4, 10.0, 4);
        let walker = Walker::at(5.0, 5.0);
        assert!(!grid.can_be_placed_at(Vec2::new(-1.0, 5.0), &walker));
        assert!(!grid.can_be_placed_at(Vec2::new(5.0, 41.0), &walker));
        assert!(!grid.can_move_between(walker.position, Vec2::new(55.0, 5.0), &walker, false));
    }
}
