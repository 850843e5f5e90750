use crate::math::Vec2;

const MIN_BOUND: f32 = 1.0e-6;
const MIN_CELL_SIZE: f32 = 1.0;
const INVALID_INDEX: usize = usize::MAX;
/// Upper bound on bucket count; oversized tanks get coarser cells instead.
const MAX_CELLS: usize = 65_536;

/// Uniform bucket grid over the tank, used as a broadphase for flocking.
///
/// Candidates are reported with an inclusive radius test; membership in a
/// flocking rule is still decided by the rule's own strict comparison.
pub struct NeighborGrid {
    requested_cell_size: f32,
    cell_size: f32,
    width: f32,
    height: f32,
    cols: usize,
    rows: usize,
    member_count: usize,
    head: Vec<usize>,
    next: Vec<usize>,
    cached: Vec<Vec2>,
}

impl NeighborGrid {
    pub fn new(width: f32, height: f32, cell_size: f32) -> Self {
        let cell_size = if cell_size.is_finite() {
            cell_size.max(MIN_CELL_SIZE)
        } else {
            MIN_CELL_SIZE
        };
        let mut grid = Self {
            requested_cell_size: cell_size,
            cell_size,
            width: MIN_BOUND,
            height: MIN_BOUND,
            cols: 0,
            rows: 0,
            member_count: 0,
            head: Vec::new(),
            next: Vec::new(),
            cached: Vec::new(),
        };

        grid.ensure_layout(0, width, height);
        grid
    }

    pub fn set_cell_size(&mut self, cell_size: f32) {
        let cell_size = if cell_size.is_finite() {
            cell_size.max(MIN_CELL_SIZE)
        } else {
            self.requested_cell_size
        };
        if cell_size != self.requested_cell_size {
            self.requested_cell_size = cell_size;
            self.ensure_layout(self.member_count, self.width, self.height);
        }
    }

    pub fn rebuild(&mut self, positions: &[Vec2], width: f32, height: f32) {
        let count = positions.len();

        self.ensure_layout(count, width, height);
        self.head.fill(INVALID_INDEX);

        if count == 0 {
            return;
        }

        self.cached.copy_from_slice(positions);

        for (i, &(x, y)) in positions.iter().enumerate() {
            let cell = self.cell_index_for_position(x, y);
            self.next[i] = self.head[cell];
            self.head[cell] = i;
        }
    }

    /// Visits every other member within `radius` of member `i`.
    pub fn for_each_candidate<F>(&self, i: usize, radius: f32, mut callback: F)
    where
        F: FnMut(usize),
    {
        if i >= self.member_count {
            return;
        }

        let radius = if radius.is_finite() { radius.max(0.0) } else { 0.0 };
        let radius_sq = radius * radius;
        let cell_radius = (radius / self.cell_size).ceil() as isize;

        let (x, y) = self.cached[i];
        let base_cell_x = self.cell_x(x);
        let base_cell_y = self.cell_y(y);

        let min_y = (base_cell_y - cell_radius).max(0);
        let max_y = (base_cell_y + cell_radius).min(self.rows as isize - 1);
        let min_x = (base_cell_x - cell_radius).max(0);
        let max_x = (base_cell_x + cell_radius).min(self.cols as isize - 1);

        for cell_y in min_y..=max_y {
            for cell_x in min_x..=max_x {
                let mut candidate = self.head[cell_y as usize * self.cols + cell_x as usize];
                while candidate != INVALID_INDEX {
                    if candidate != i {
                        let (cx, cy) = self.cached[candidate];
                        let dx = cx - x;
                        let dy = cy - y;
                        if dx * dx + dy * dy <= radius_sq {
                            callback(candidate);
                        }
                    }
                    candidate = self.next[candidate];
                }
            }
        }
    }

    fn ensure_layout(&mut self, count: usize, width: f32, height: f32) {
        self.width = if width.is_finite() { width.max(MIN_BOUND) } else { self.width };
        self.height = if height.is_finite() { height.max(MIN_BOUND) } else { self.height };
        self.member_count = count;

        let (cell_size, cols, rows) =
            bounded_layout(self.width, self.height, self.requested_cell_size);
        self.cell_size = cell_size;

        if cols != self.cols || rows != self.rows {
            self.cols = cols;
            self.rows = rows;
            self.head.resize(cols * rows, INVALID_INDEX);
        }

        if self.next.len() != count {
            self.next.resize(count, INVALID_INDEX);
            self.cached.resize(count, (0.0, 0.0));
        }
    }

    fn cell_index_for_position(&self, x: f32, y: f32) -> usize {
        self.cell_y(y) as usize * self.cols + self.cell_x(x) as usize
    }

    fn cell_x(&self, x: f32) -> isize {
        ((x / self.cell_size).floor() as isize).clamp(0, self.cols as isize - 1)
    }

    fn cell_y(&self, y: f32) -> isize {
        ((y / self.cell_size).floor() as isize).clamp(0, self.rows as isize - 1)
    }
}

/// Grows the cell size until the bucket count fits in [`MAX_CELLS`].
fn bounded_layout(width: f32, height: f32, requested: f32) -> (f32, usize, usize) {
    let mut cell_size = requested;
    loop {
        let cols = ((width / cell_size).ceil() as usize).max(1);
        let rows = ((height / cell_size).ceil() as usize).max(1);
        match cols.checked_mul(rows) {
            Some(cells) if cells <= MAX_CELLS => return (cell_size, cols, rows),
            _ => cell_size *= 2.0,
        }
    }
}
