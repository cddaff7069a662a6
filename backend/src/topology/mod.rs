//! Cell Topology
//!
//! An arena of [`Cell`]s keyed by stable [`CellId`] and linked into an ordered
//! chain (or ring). Cells reference their neighbors by id only, so removing a
//! cell can never leave a dangling pointer behind: at worst a stale id that
//! [`CellTopology::verify`] reports.
//!
//! # Closure
//!
//! The topology closure is an explicit setting ([`Closure`]), never inferred
//! from whether end links happen to be present:
//! - **Chain**: head has no left neighbor, tail has no right neighbor
//! - **Ring**: tail's right is head, head's left is tail (a single cell has
//!   no links at all)
//!
//! # Critical Invariants
//!
//! 1. **Mutual links**: `a.right == Some(b)` iff `b.left == Some(a)`
//! 2. **Reachability**: every cell is reachable walking right from the head
//! 3. **No partial mutation**: an operation that fails leaves the topology
//!    unchanged
//! 4. **Bounded walks**: every traversal is bounded by the cell count
//!
//! # Example
//!
//! ```rust
//! use formation_simulator_core_rs::models::{Closure, Direction};
//! use formation_simulator_core_rs::topology::CellTopology;
//!
//! let mut topology = CellTopology::new(Closure::Chain, None);
//! let a = topology.add_cell(None).unwrap();
//! let b = topology.add_cell(None).unwrap();
//! let c = topology.add_cell(None).unwrap();
//!
//! assert_eq!(topology.ordered(), vec![a, b, c]);
//! assert_eq!(topology.hop_count(a, Direction::Right).unwrap(), 2);
//! assert!(topology.verify().is_empty());
//! ```

use crate::models::{Cell, CellId, Closure, Direction, RobotId};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Errors from topology operations. None of them mutate the topology.
#[derive(Debug, Error, PartialEq)]
pub enum TopologyError {
    #[error("Topology is at its maximum of {max} cells")]
    CapacityExhausted { max: usize },

    #[error("Unknown cell: {0}")]
    UnknownCell(CellId),

    #[error("Cells {a} and {b} are not adjacent")]
    NotAdjacent { a: CellId, b: CellId },

    #[error("Cell {0} is already linked into the topology")]
    AlreadyLinked(CellId),

    #[error("Topology has no cells")]
    Empty,
}

/// Broken invariant found by [`CellTopology::verify`]
#[derive(Debug, Clone, PartialEq)]
pub enum TopologyViolation {
    /// `cell` links to `neighbor`, which does not link back
    NonMutualLink {
        cell: CellId,
        direction: Direction,
        neighbor: CellId,
    },
    /// `cell` links to an id that is not in the arena
    DanglingLink { cell: CellId, neighbor: CellId },
    /// `cell` cannot be reached walking right from the head
    Unreachable { cell: CellId },
    /// End links disagree with the configured closure
    ClosureMismatch { cell: CellId },
    /// Target position is NaN or infinite
    NonFiniteTarget { cell: CellId },
}

impl TopologyViolation {
    /// The cell the violation is attributed to (the one to excise)
    pub fn cell(&self) -> CellId {
        match self {
            TopologyViolation::NonMutualLink { cell, .. } => *cell,
            TopologyViolation::DanglingLink { cell, .. } => *cell,
            TopologyViolation::Unreachable { cell } => *cell,
            TopologyViolation::ClosureMismatch { cell } => *cell,
            TopologyViolation::NonFiniteTarget { cell } => *cell,
        }
    }
}

impl fmt::Display for TopologyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyViolation::NonMutualLink {
                cell,
                direction,
                neighbor,
            } => write!(
                f,
                "{} links {:?} to {} but {} does not link back",
                cell, direction, neighbor, neighbor
            ),
            TopologyViolation::DanglingLink { cell, neighbor } => {
                write!(f, "{} links to missing {}", cell, neighbor)
            }
            TopologyViolation::Unreachable { cell } => {
                write!(f, "{} is unreachable from the head", cell)
            }
            TopologyViolation::ClosureMismatch { cell } => {
                write!(f, "end links at {} disagree with the closure", cell)
            }
            TopologyViolation::NonFiniteTarget { cell } => {
                write!(f, "{} has a non-finite target", cell)
            }
        }
    }
}

/// Ordered, doubly linked arrangement of cells
#[derive(Debug, Clone)]
pub struct CellTopology {
    cells: BTreeMap<CellId, Cell>,
    head: Option<CellId>,
    next_id: u32,
    max_cells: Option<usize>,
    closure: Closure,
}

impl CellTopology {
    /// Create an empty topology
    ///
    /// # Arguments
    ///
    /// * `closure` - Chain or ring
    /// * `max_cells` - Optional capacity; insertions beyond it fail
    pub fn new(closure: Closure, max_cells: Option<usize>) -> Self {
        Self {
            cells: BTreeMap::new(),
            head: None,
            next_id: 0,
            max_cells,
            closure,
        }
    }

    /// Rebuild a topology from checkpointed cells.
    ///
    /// Links are taken as given; callers should [`verify`](Self::verify).
    pub fn from_parts(
        cells: Vec<Cell>,
        head: Option<CellId>,
        next_id: u32,
        max_cells: Option<usize>,
        closure: Closure,
    ) -> Self {
        Self {
            cells: cells.into_iter().map(|c| (c.id(), c)).collect(),
            head,
            next_id,
            max_cells,
            closure,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn closure(&self) -> Closure {
        self.closure
    }

    pub fn max_cells(&self) -> Option<usize> {
        self.max_cells
    }

    pub fn head(&self) -> Option<CellId> {
        self.head
    }

    /// Next id the arena will hand out
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Last cell walking right from the head
    pub fn tail(&self) -> Option<CellId> {
        self.ordered().last().copied()
    }

    pub fn get(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(&id)
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.cells.contains_key(&id)
    }

    /// All cells in id order
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    /// Most recently created cell still present
    pub fn newest(&self) -> Option<CellId> {
        self.cells.keys().next_back().copied()
    }

    /// Cell ids walking right from the head.
    ///
    /// Stops at an open end, on returning to the head, or on any id that is
    /// missing or already visited, so it terminates even on corrupted links.
    pub fn ordered(&self) -> Vec<CellId> {
        let mut order = Vec::with_capacity(self.cells.len());
        let mut visited = BTreeSet::new();
        let mut current = self.head;

        while let Some(id) = current {
            if !self.cells.contains_key(&id) || !visited.insert(id) {
                break;
            }
            order.push(id);
            current = self.cells[&id].right();
        }

        order
    }

    /// Cell at `position` counted from the head (0-based)
    pub fn cell_at(&self, position: usize) -> Option<CellId> {
        self.ordered().get(position).copied()
    }

    /// Position of `cell` counted from the head
    pub fn position_of(&self, cell: CellId) -> Option<usize> {
        self.ordered().iter().position(|&id| id == cell)
    }

    /// Unoccupied cells in topology order
    pub fn empty_cells(&self) -> Vec<CellId> {
        self.ordered()
            .into_iter()
            .filter(|id| !self.cells[id].is_occupied())
            .collect()
    }

    /// Occupied cells in topology order
    pub fn occupied_cells(&self) -> Vec<CellId> {
        self.ordered()
            .into_iter()
            .filter(|id| self.cells[id].is_occupied())
            .collect()
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    fn check_capacity(&self) -> Result<(), TopologyError> {
        match self.max_cells {
            Some(max) if self.cells.len() >= max => Err(TopologyError::CapacityExhausted { max }),
            _ => Ok(()),
        }
    }

    /// Whether another cell would exceed `max_cells`
    pub fn is_full(&self) -> bool {
        self.check_capacity().is_err()
    }

    /// Drop every cell. Ids keep counting up.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.head = None;
    }

    /// Allocate a fresh, unlinked cell for [`insert_cell`](Self::insert_cell)
    pub fn new_cell(&mut self) -> Cell {
        let id = CellId(self.next_id);
        self.next_id += 1;
        Cell::new(id)
    }

    /// Add a cell to the right of `anchor`, or after the tail if no anchor is
    /// given (the first cell of an empty topology).
    pub fn add_cell(&mut self, anchor: Option<CellId>) -> Result<CellId, TopologyError> {
        match anchor.or_else(|| self.tail()) {
            Some(anchor) => self.add_cell_beside(anchor, Direction::Right),
            None => {
                self.check_capacity()?;
                let cell = self.new_cell();
                let id = cell.id();
                self.cells.insert(id, cell);
                self.head = Some(id);
                Ok(id)
            }
        }
    }

    /// Add a cell on the given side of `anchor`
    pub fn add_cell_beside(
        &mut self,
        anchor: CellId,
        side: Direction,
    ) -> Result<CellId, TopologyError> {
        if !self.cells.contains_key(&anchor) {
            return Err(TopologyError::UnknownCell(anchor));
        }
        self.check_capacity()?;

        let cell = self.new_cell();
        Ok(self.link_beside(anchor, side, cell))
    }

    /// Splice `cell` between the adjacent cells `a` and `b` (either order).
    ///
    /// `cell` must come from [`new_cell`](Self::new_cell) and not yet be
    /// linked. On failure nothing changes and `cell` is dropped.
    pub fn insert_cell(&mut self, a: CellId, b: CellId, cell: Cell) -> Result<CellId, TopologyError> {
        if self.cells.contains_key(&cell.id()) {
            return Err(TopologyError::AlreadyLinked(cell.id()));
        }
        let cell_a = self.cells.get(&a).ok_or(TopologyError::UnknownCell(a))?;
        let cell_b = self.cells.get(&b).ok_or(TopologyError::UnknownCell(b))?;

        let anchor = if cell_a.right() == Some(b) && cell_b.left() == Some(a) {
            a
        } else if cell_b.right() == Some(a) && cell_a.left() == Some(b) {
            b
        } else {
            return Err(TopologyError::NotAdjacent { a, b });
        };

        self.check_capacity()?;
        Ok(self.link_beside(anchor, Direction::Right, cell))
    }

    fn link_beside(&mut self, anchor: CellId, side: Direction, mut cell: Cell) -> CellId {
        let id = cell.id();
        let other = self.cells[&anchor].neighbor(side);

        cell.set_neighbor(side.opposite(), Some(anchor));
        cell.set_neighbor(side, other);
        self.cells.insert(id, cell);

        if let Some(anchor_cell) = self.cells.get_mut(&anchor) {
            anchor_cell.set_neighbor(side, Some(id));
        }
        if let Some(other_cell) = other.and_then(|o| self.cells.get_mut(&o)) {
            other_cell.set_neighbor(side.opposite(), Some(id));
        }

        // New leftmost cell (on a ring only while it is still a lone cell)
        if side == Direction::Left && other.is_none() && self.head == Some(anchor) {
            self.head = Some(id);
        }
        if self.closure == Closure::Ring {
            self.close_ring();
        }

        id
    }

    /// Detach `id`, linking its former neighbors to each other.
    ///
    /// Returns the former occupant, which the caller must free.
    pub fn remove_cell(&mut self, id: CellId) -> Result<Option<RobotId>, TopologyError> {
        let cell = self.cells.remove(&id).ok_or(TopologyError::UnknownCell(id))?;
        let (left, right) = (cell.left(), cell.right());

        if left.is_some() && left == right {
            // Two-cell ring: the survivor becomes a lone, unlinked cell
            if let Some(survivor) = left.and_then(|l| self.cells.get_mut(&l)) {
                survivor.set_neighbor(Direction::Left, None);
                survivor.set_neighbor(Direction::Right, None);
            }
        } else {
            if let Some(l) = left.and_then(|l| self.cells.get_mut(&l)) {
                l.set_neighbor(Direction::Right, right);
            }
            if let Some(r) = right.and_then(|r| self.cells.get_mut(&r)) {
                r.set_neighbor(Direction::Left, left);
            }
        }

        if self.head == Some(id) {
            self.head = right.or(left).filter(|c| self.cells.contains_key(c));
        }

        Ok(cell.occupant())
    }

    /// Remove the most recently created cell still present
    pub fn remove_newest_cell(&mut self) -> Result<(CellId, Option<RobotId>), TopologyError> {
        let newest = self.newest().ok_or(TopologyError::Empty)?;
        let freed = self.remove_cell(newest)?;
        Ok((newest, freed))
    }

    /// Switch closure, joining or opening the ends explicitly
    pub fn set_closure(&mut self, closure: Closure) {
        self.closure = closure;
        match closure {
            Closure::Ring => self.close_ring(),
            Closure::Chain => self.open_ring(),
        }
    }

    fn close_ring(&mut self) {
        let Some(head) = self.head else { return };
        if self.cells.len() < 2 {
            return;
        }
        if self.cells[&head].left().is_some() {
            return;
        }
        let Some(tail) = self.ordered().last().copied() else { return };
        if tail == head {
            return;
        }
        if let Some(t) = self.cells.get_mut(&tail) {
            t.set_neighbor(Direction::Right, Some(head));
        }
        if let Some(h) = self.cells.get_mut(&head) {
            h.set_neighbor(Direction::Left, Some(tail));
        }
    }

    fn open_ring(&mut self) {
        let Some(head) = self.head else { return };
        let Some(tail) = self.cells.get(&head).and_then(|h| h.left()) else {
            return;
        };
        if let Some(t) = self.cells.get_mut(&tail) {
            t.set_neighbor(Direction::Right, None);
        }
        if let Some(h) = self.cells.get_mut(&head) {
            h.set_neighbor(Direction::Left, None);
        }
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Hops from `id` walking strictly in `direction` until an open end
    /// (chain) or until the next hop would return to `id` (ring).
    ///
    /// Always in `[0, len - 1]`.
    pub fn hop_count(&self, id: CellId, direction: Direction) -> Result<usize, TopologyError> {
        if !self.cells.contains_key(&id) {
            return Err(TopologyError::UnknownCell(id));
        }

        let limit = self.cells.len() - 1;
        let mut hops = 0;
        let mut current = id;

        while hops < limit {
            match self.cells[&current].neighbor(direction) {
                Some(next) if next != id && self.cells.contains_key(&next) => {
                    hops += 1;
                    current = next;
                }
                _ => break,
            }
        }

        Ok(hops)
    }

    /// Topological distance between two cells: index difference on a chain,
    /// the shorter way round on a ring.
    pub fn hops_between(&self, a: CellId, b: CellId) -> Result<usize, TopologyError> {
        let order = self.ordered();
        let pa = order
            .iter()
            .position(|&c| c == a)
            .ok_or(TopologyError::UnknownCell(a))?;
        let pb = order
            .iter()
            .position(|&c| c == b)
            .ok_or(TopologyError::UnknownCell(b))?;

        let direct = pa.abs_diff(pb);
        Ok(match self.closure {
            Closure::Chain => direct,
            Closure::Ring => direct.min(order.len() - direct),
        })
    }

    // ========================================================================
    // Invariant checking
    // ========================================================================

    /// Report every broken invariant. An empty result means the topology is
    /// consistent.
    pub fn verify(&self) -> Vec<TopologyViolation> {
        let mut violations = Vec::new();

        for (&id, cell) in &self.cells {
            for direction in [Direction::Left, Direction::Right] {
                let Some(neighbor) = cell.neighbor(direction) else {
                    continue;
                };
                match self.cells.get(&neighbor) {
                    None => violations.push(TopologyViolation::DanglingLink { cell: id, neighbor }),
                    Some(n) if n.neighbor(direction.opposite()) != Some(id) || neighbor == id => {
                        violations.push(TopologyViolation::NonMutualLink {
                            cell: id,
                            direction,
                            neighbor,
                        })
                    }
                    Some(_) => {}
                }
            }
            if !cell.target().is_finite() {
                violations.push(TopologyViolation::NonFiniteTarget { cell: id });
            }
        }

        let reachable: BTreeSet<CellId> = self.ordered().into_iter().collect();
        for &id in self.cells.keys() {
            if !reachable.contains(&id) {
                violations.push(TopologyViolation::Unreachable { cell: id });
            }
        }

        if let Some(head) = self.head.filter(|h| self.cells.contains_key(h)) {
            let head_cell = &self.cells[&head];
            let closed = head_cell.left().is_some();
            let expect_closed = self.closure == Closure::Ring && self.cells.len() >= 2;
            if closed != expect_closed {
                violations.push(TopologyViolation::ClosureMismatch { cell: head });
            }
        }

        violations
    }

    /// Forcibly remove `id` and relink the survivors into a consistent
    /// topology (reachable order first, stragglers after in id order).
    ///
    /// Returns the removed cell's occupant.
    pub fn excise(&mut self, id: CellId) -> Option<RobotId> {
        let mut order: Vec<CellId> = self.ordered().into_iter().filter(|&c| c != id).collect();
        let seen: BTreeSet<CellId> = order.iter().copied().collect();
        order.extend(
            self.cells
                .keys()
                .copied()
                .filter(|c| *c != id && !seen.contains(c)),
        );

        let occupant = self.cells.remove(&id).and_then(|c| c.occupant());
        self.relink(&order);
        occupant
    }

    fn relink(&mut self, order: &[CellId]) {
        for (i, id) in order.iter().enumerate() {
            let left = if i > 0 { Some(order[i - 1]) } else { None };
            let right = order.get(i + 1).copied();
            if let Some(cell) = self.cells.get_mut(id) {
                cell.set_neighbor(Direction::Left, left);
                cell.set_neighbor(Direction::Right, right);
            }
        }
        self.head = order.first().copied();
        if self.closure == Closure::Ring {
            self.close_ring();
        }
    }
}

impl fmt::Display for CellTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = self.ordered();
        write!(f, "[")?;
        for (i, id) in order.iter().enumerate() {
            if i > 0 {
                write!(f, " <-> ")?;
            }
            match self.cells[id].occupant() {
                Some(robot) => write!(f, "{}({})", id, robot)?,
                None => write!(f, "{}", id)?,
            }
        }
        if self.closure == Closure::Ring && order.len() >= 2 {
            write!(f, " <-> ...")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_of(n: usize) -> (CellTopology, Vec<CellId>) {
        let mut topology = CellTopology::new(Closure::Chain, None);
        let ids = (0..n).map(|_| topology.add_cell(None).unwrap()).collect();
        (topology, ids)
    }

    fn ring_of(n: usize) -> (CellTopology, Vec<CellId>) {
        let mut topology = CellTopology::new(Closure::Ring, None);
        let ids = (0..n).map(|_| topology.add_cell(None).unwrap()).collect();
        (topology, ids)
    }

    #[test]
    fn test_three_anchorless_adds_leave_open_ends() {
        let (topology, ids) = chain_of(3);

        assert_eq!(topology.len(), 3);
        assert_eq!(topology.get(ids[0]).unwrap().left(), None);
        assert_eq!(topology.get(ids[2]).unwrap().right(), None);
        assert_eq!(topology.ordered(), ids);
        assert!(topology.verify().is_empty());
    }

    #[test]
    fn test_add_with_anchor_goes_right_of_anchor() {
        let (mut topology, ids) = chain_of(2);
        let c = topology.add_cell(Some(ids[0])).unwrap();

        assert_eq!(topology.ordered(), vec![ids[0], c, ids[1]]);
        assert!(topology.verify().is_empty());
    }

    #[test]
    fn test_add_left_of_head_moves_head() {
        let (mut topology, ids) = chain_of(2);
        let c = topology.add_cell_beside(ids[0], Direction::Left).unwrap();

        assert_eq!(topology.head(), Some(c));
        assert_eq!(topology.ordered(), vec![c, ids[0], ids[1]]);
    }

    #[test]
    fn test_capacity_exhausted() {
        let mut topology = CellTopology::new(Closure::Chain, Some(2));
        topology.add_cell(None).unwrap();
        topology.add_cell(None).unwrap();

        assert_eq!(
            topology.add_cell(None),
            Err(TopologyError::CapacityExhausted { max: 2 })
        );
        assert_eq!(topology.len(), 2);
    }

    #[test]
    fn test_unknown_anchor() {
        let (mut topology, _) = chain_of(1);
        assert_eq!(
            topology.add_cell(Some(CellId(99))),
            Err(TopologyError::UnknownCell(CellId(99)))
        );
    }

    #[test]
    fn test_remove_relinks_neighbors() {
        let (mut topology, ids) = chain_of(3);
        topology.remove_cell(ids[1]).unwrap();

        assert_eq!(topology.get(ids[0]).unwrap().right(), Some(ids[2]));
        assert_eq!(topology.get(ids[2]).unwrap().left(), Some(ids[0]));
        assert!(topology.verify().is_empty());
    }

    #[test]
    fn test_remove_head_promotes_right_neighbor() {
        let (mut topology, ids) = chain_of(3);
        topology.remove_cell(ids[0]).unwrap();

        assert_eq!(topology.head(), Some(ids[1]));
        assert!(topology.verify().is_empty());
    }

    #[test]
    fn test_remove_newest() {
        let (mut topology, ids) = chain_of(3);
        let (removed, freed) = topology.remove_newest_cell().unwrap();

        assert_eq!(removed, ids[2]);
        assert_eq!(freed, None);
        assert_eq!(topology.tail(), Some(ids[1]));

        let mut empty = CellTopology::new(Closure::Chain, None);
        assert_eq!(empty.remove_newest_cell(), Err(TopologyError::Empty));
    }

    #[test]
    fn test_insert_between_adjacent() {
        let (mut topology, ids) = chain_of(2);
        let cell = topology.new_cell();
        let c = topology.insert_cell(ids[1], ids[0], cell).unwrap();

        assert_eq!(topology.ordered(), vec![ids[0], c, ids[1]]);
        assert!(topology.verify().is_empty());
    }

    #[test]
    fn test_insert_between_non_adjacent_fails_without_mutation() {
        let (mut topology, ids) = chain_of(3);
        let before = topology.ordered();
        let cell = topology.new_cell();
        let cell_id = cell.id();

        assert_eq!(
            topology.insert_cell(ids[0], ids[2], cell),
            Err(TopologyError::NotAdjacent { a: ids[0], b: ids[2] })
        );
        assert_eq!(topology.ordered(), before);
        assert!(!topology.contains(cell_id));
    }

    #[test]
    fn test_ring_wraps_and_hop_counts_are_bounded() {
        let (topology, ids) = ring_of(5);

        assert_eq!(topology.get(ids[4]).unwrap().right(), Some(ids[0]));
        assert_eq!(topology.get(ids[0]).unwrap().left(), Some(ids[4]));
        for id in &ids {
            assert_eq!(topology.hop_count(*id, Direction::Left).unwrap(), 4);
            assert_eq!(topology.hop_count(*id, Direction::Right).unwrap(), 4);
        }
        assert!(topology.verify().is_empty());
    }

    #[test]
    fn test_chain_hop_counts() {
        let (topology, ids) = chain_of(4);
        assert_eq!(topology.hop_count(ids[1], Direction::Left).unwrap(), 1);
        assert_eq!(topology.hop_count(ids[1], Direction::Right).unwrap(), 2);
        assert_eq!(topology.hops_between(ids[0], ids[3]).unwrap(), 3);
    }

    #[test]
    fn test_ring_hops_between_takes_short_way() {
        let (topology, ids) = ring_of(6);
        assert_eq!(topology.hops_between(ids[0], ids[5]).unwrap(), 1);
        assert_eq!(topology.hops_between(ids[1], ids[4]).unwrap(), 3);
    }

    #[test]
    fn test_two_cell_ring_removal_leaves_lone_cell() {
        let (mut topology, ids) = ring_of(2);
        topology.remove_cell(ids[0]).unwrap();

        let lone = topology.get(ids[1]).unwrap();
        assert_eq!(lone.left(), None);
        assert_eq!(lone.right(), None);
        assert_eq!(topology.hop_count(ids[1], Direction::Right).unwrap(), 0);
        assert!(topology.verify().is_empty());
    }

    #[test]
    fn test_set_closure_opens_and_closes() {
        let (mut topology, ids) = chain_of(3);

        topology.set_closure(Closure::Ring);
        assert_eq!(topology.get(ids[2]).unwrap().right(), Some(ids[0]));
        assert!(topology.verify().is_empty());

        topology.set_closure(Closure::Chain);
        assert_eq!(topology.get(ids[2]).unwrap().right(), None);
        assert_eq!(topology.get(ids[0]).unwrap().left(), None);
        assert!(topology.verify().is_empty());
    }

    #[test]
    fn test_verify_detects_non_mutual_link_and_excise_repairs() {
        let (mut topology, ids) = chain_of(4);
        // Corrupt: cell 1 forgets its right neighbor
        topology
            .get_mut(ids[1])
            .unwrap()
            .set_neighbor(Direction::Right, None);

        let violations = topology.verify();
        assert!(!violations.is_empty());

        topology.excise(ids[1]);
        assert!(topology.verify().is_empty());
        assert_eq!(topology.len(), 3);
        assert_eq!(topology.ordered(), vec![ids[0], ids[2], ids[3]]);
    }

    #[test]
    fn test_verify_detects_non_finite_target() {
        let (mut topology, ids) = chain_of(2);
        topology
            .get_mut(ids[0])
            .unwrap()
            .set_target(crate::models::Vector::new(f64::NAN, 0.0));

        assert_eq!(
            topology.verify(),
            vec![TopologyViolation::NonFiniteTarget { cell: ids[0] }]
        );
    }
}
