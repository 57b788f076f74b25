//! Concentric corner geometry for bundled lines.
//!
//! When a bundle of parallel lines turns a corner, each line follows its own
//! arc. The line on the outside of the turn always gets the largest radius:
//!
//! ```text
//! radius = base_radius + k * offset_step     (k = 0 innermost .. n-1 outermost)
//! ```

/// Flips a line's offset within a bundle: outermost becomes innermost.
pub fn reversed_offset(offset: f32, max_offset: f32) -> f32 {
    max_offset - offset
}

/// Offset and radii of one line in a horizontal, vertical, horizontal
/// L-shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LShape {
    /// X offset from the channel center.
    pub delta: f32,
    /// Radius at the horizontal to vertical corner.
    pub first_radius: f32,
    /// Radius at the vertical to horizontal corner.
    pub second_radius: f32,
}

/// Computes the L-shape geometry of line `index` in a bundle of `count`.
///
/// Going down, the first line sits rightmost: outside of the first
/// (clockwise) turn and inside of the second. Going up, it sits leftmost
/// and the radii swap accordingly.
pub fn l_shape(index: usize, count: usize, going_down: bool, offset_step: f32, base_radius: f32) -> LShape {
    let i = index as f32;
    let last = count.saturating_sub(1) as f32;
    let outer = base_radius + (last - i) * offset_step;
    let inner = base_radius + i * offset_step;
    if going_down {
        LShape {
            delta: (last / 2.0 - i) * offset_step,
            first_radius: outer,
            second_radius: inner,
        }
    } else {
        LShape {
            delta: (i - last / 2.0) * offset_step,
            first_radius: inner,
            second_radius: outer,
        }
    }
}

/// Corner of a TB section leaving through a side exit: vertical drop, then
/// horizontal run to the port.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitCorner {
    pub vertical_offset: f32,
    pub horizontal_offset: f32,
    pub radius: f32,
}

/// Computes the exit corner of a line whose x offset in the TB section is
/// `offset`.
///
/// The horizontal run always uses the reversed offset so the outermost
/// vertical line keeps the largest radius. A right exit turns
/// counter-clockwise and keeps the vertical offset; a left exit turns
/// clockwise and reverses it.
pub fn tb_exit_corner(offset: f32, max_offset: f32, exit_right: bool, base_radius: f32) -> ExitCorner {
    let rev = reversed_offset(offset, max_offset);
    ExitCorner {
        vertical_offset: if exit_right { offset } else { rev },
        horizontal_offset: rev,
        radius: base_radius + rev,
    }
}

/// Computes the vertical x offset and radius of a line entering a TB
/// section through a side port.
pub fn tb_entry_corner(offset: f32, max_offset: f32, entry_right: bool, base_radius: f32) -> (f32, f32) {
    let rev = reversed_offset(offset, max_offset);
    let vertical = if entry_right { offset } else { rev };
    (vertical, base_radius + rev)
}
