use anyhow::{Context, Result};

use crate::grid::GRID_STRIDE;
use crate::page::Overlay;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Active cell of the grid. `index` is always below the grid length it was last
/// checked against.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    index: usize,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Cell a move would land on, or `None` when the move is a no-op.
    pub fn target(&self, direction: Direction, len: usize) -> Option<usize> {
        let index = self.index;
        let target = match direction {
            Direction::Up => index.checked_sub(GRID_STRIDE)?,
            Direction::Down => index + GRID_STRIDE,
            Direction::Left if index % GRID_STRIDE == 1 => index - 1,
            Direction::Right if index % GRID_STRIDE == 0 => index + 1,
            Direction::Left | Direction::Right => return None,
        };
        (target < len).then_some(target)
    }

    /// Applies a directional move. Returns whether the active cell changed.
    pub fn step(
        &mut self,
        overlay: &dyn Overlay,
        direction: Direction,
        len: usize,
    ) -> Result<bool> {
        let Some(target) = self.target(direction, len) else {
            return Ok(false);
        };
        self.apply(overlay, target)?;
        Ok(true)
    }

    /// Makes `index` the active cell and moves the highlight to it.
    pub fn apply(&mut self, overlay: &dyn Overlay, index: usize) -> Result<()> {
        overlay
            .focus(index)
            .with_context(|| format!("highlight grid item {index}"))?;
        self.index = index;
        Ok(())
    }

    /// Index to restore after the grid grew: the old one, bounded by the last video.
    pub fn clamped_to(&self, last_video_index: Option<usize>) -> usize {
        match last_video_index {
            Some(last) => self.index.min(last),
            None => 0,
        }
    }
}
