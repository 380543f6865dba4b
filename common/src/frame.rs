use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An acquired image.
pub trait Frame {
    fn size(&self) -> FrameSize;

    /// Mean gray level (0-255), `None` if the frame can't tell
    fn mean_brightness(&self) -> Option<f64> {
        None
    }
}
