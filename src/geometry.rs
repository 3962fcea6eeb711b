//! Sizes and positions
//!
//! Window geometry is exchanged with applications in logical units. Backends
//! convert to physical pixels with the window's scale factor at the protocol
//! boundary.

/// A size in logical units
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LogicalSize {
    pub width: f64,
    pub height: f64,
}

impl LogicalSize {
    /// Create a new logical size
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Convert to physical pixels, rounding to the nearest pixel
    pub fn to_physical(self, scale: f64) -> PhysicalSize {
        PhysicalSize {
            width: (self.width * scale).round().max(1.0) as u32,
            height: (self.height * scale).round().max(1.0) as u32,
        }
    }
}

impl From<(u32, u32)> for LogicalSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width as f64, height as f64)
    }
}

/// A size in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhysicalSize {
    pub width: u32,
    pub height: u32,
}

impl PhysicalSize {
    /// Create a new physical size
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Convert to logical units
    pub fn to_logical(self, scale: f64) -> LogicalSize {
        LogicalSize::new(self.width as f64 / scale, self.height as f64 / scale)
    }
}

/// A position in logical units
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LogicalPosition {
    pub x: f64,
    pub y: f64,
}

impl LogicalPosition {
    /// Create a new logical position
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Convert to physical pixels
    pub fn to_physical(self, scale: f64) -> PhysicalPosition {
        PhysicalPosition {
            x: (self.x * scale).round() as i32,
            y: (self.y * scale).round() as i32,
        }
    }
}

/// A position in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhysicalPosition {
    pub x: i32,
    pub y: i32,
}

impl PhysicalPosition {
    /// Create a new physical position
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Convert to logical units
    pub fn to_logical(self, scale: f64) -> LogicalPosition {
        LogicalPosition::new(self.x as f64 / scale, self.y as f64 / scale)
    }
}

/// A rectangle in logical units
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LogicalRect {
    pub origin: LogicalPosition,
    pub size: LogicalSize,
}

impl LogicalRect {
    /// Create a new rectangle
    pub const fn new(origin: LogicalPosition, size: LogicalSize) -> Self {
        Self { origin, size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_to_physical() {
        let size = LogicalSize::new(800.0, 600.0);
        assert_eq!(size.to_physical(1.0), PhysicalSize::new(800, 600));
        assert_eq!(size.to_physical(1.5), PhysicalSize::new(1200, 900));
    }

    #[test]
    fn test_physical_to_logical() {
        let size = PhysicalSize::new(2048, 1536);
        assert_eq!(size.to_logical(2.0), LogicalSize::new(1024.0, 768.0));

        let pos = PhysicalPosition::new(-20, 40);
        assert_eq!(pos.to_logical(2.0), LogicalPosition::new(-10.0, 20.0));
    }

    #[test]
    fn test_physical_size_never_zero() {
        let size = LogicalSize::new(0.0, 0.2);
        assert_eq!(size.to_physical(1.0), PhysicalSize::new(1, 1));
    }
}
