//! Capability traits
//!
//! An environment is used through two capabilities rather than a class
//! hierarchy:
//!
//! - [`Steppable`]: advance, query quiescence, reset
//! - [`Renderable`]: produce a read-only [`Frame`] and walk it onto a
//!   [`Canvas`]
//!
//! [`Environment`] is the headless implementation. [`RecordingEnvironment`]
//! wraps any `Steppable + Renderable` and keeps the frame produced after
//! every step, which is what a viewer or an exporter consumes.

use crate::environment::engine::Environment;
use crate::models::{CellId, Pose, RobotId, Vector};
use serde::{Deserialize, Serialize};

pub trait Steppable {
    /// Run one tick; false once the run is over
    fn step(&mut self) -> bool;

    fn quiescence(&self) -> bool;

    fn clear(&mut self);
}

/// A cell as drawn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameCell {
    pub id: CellId,
    pub target: Vector,
    pub occupant: Option<RobotId>,
    pub right: Option<CellId>,
}

/// A robot as drawn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRobot {
    pub id: RobotId,
    pub pose: Pose,
    pub cell: Option<CellId>,
}

/// Read-only picture of an environment after a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub step: usize,
    pub formation_id: u32,
    pub quiescent: bool,
    /// Topology order, head first
    pub cells: Vec<FrameCell>,
    /// Id order
    pub robots: Vec<FrameRobot>,
}

impl Frame {
    pub fn cell(&self, id: CellId) -> Option<&FrameCell> {
        self.cells.iter().find(|c| c.id == id)
    }
}

/// Drawing surface supplied by a renderer
pub trait Canvas {
    fn draw_cell(&mut self, cell: &FrameCell);

    fn draw_robot(&mut self, robot: &FrameRobot);

    /// Line between two neighboring cell targets
    fn draw_link(&mut self, _from: Vector, _to: Vector) {}
}

pub trait Renderable {
    fn frame(&self) -> Frame;

    /// Walk the current frame: links, then cells, then robots
    fn draw(&self, canvas: &mut dyn Canvas) {
        let frame = self.frame();
        for cell in &frame.cells {
            if let Some(next) = cell.right.and_then(|id| frame.cell(id)) {
                canvas.draw_link(cell.target, next.target);
            }
        }
        for cell in &frame.cells {
            canvas.draw_cell(cell);
        }
        for robot in &frame.robots {
            canvas.draw_robot(robot);
        }
    }
}

impl Steppable for Environment {
    fn step(&mut self) -> bool {
        Environment::step(self)
    }

    fn quiescence(&self) -> bool {
        Environment::quiescence(self)
    }

    fn clear(&mut self) {
        Environment::clear(self)
    }
}

impl Renderable for Environment {
    fn frame(&self) -> Frame {
        Frame {
            step: self.step_count(),
            formation_id: self.formation().id(),
            quiescent: Environment::quiescence(self),
            cells: self
                .cells()
                .into_iter()
                .map(|c| FrameCell {
                    id: c.id(),
                    target: c.target(),
                    occupant: c.occupant(),
                    right: c.right(),
                })
                .collect(),
            robots: self
                .robots()
                .map(|r| FrameRobot {
                    id: r.id(),
                    pose: r.pose(),
                    cell: r.cell(),
                })
                .collect(),
        }
    }
}

/// Wraps an environment and captures a [`Frame`] after each step
#[derive(Debug)]
pub struct RecordingEnvironment<E> {
    inner: E,
    frames: Vec<Frame>,
}

impl<E: Steppable + Renderable> RecordingEnvironment<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            frames: Vec::new(),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut E {
        &mut self.inner
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn take_frames(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.frames)
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

impl<E: Steppable + Renderable> Steppable for RecordingEnvironment<E> {
    fn step(&mut self) -> bool {
        let active = self.inner.step();
        self.frames.push(self.inner.frame());
        active
    }

    fn quiescence(&self) -> bool {
        self.inner.quiescence()
    }

    fn clear(&mut self) {
        self.inner.clear();
        self.frames.clear();
    }
}

impl<E: Steppable + Renderable> Renderable for RecordingEnvironment<E> {
    fn frame(&self) -> Frame {
        self.inner.frame()
    }
}
