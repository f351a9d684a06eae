use crate::frame::Frame;
use crate::planner::PageGeometry;
use crate::types::{Rect, Size};

#[derive(Clone)]
pub struct PageTemplate {
    pub name: String,
    pub page_size: Size,
    pub frame: Rect,
}

impl PageTemplate {
    pub fn new(name: impl Into<String>, page_size: Size, frame: Rect) -> Self {
        Self {
            name: name.into(),
            page_size,
            frame,
        }
    }

    /// Frame covering the area inside the margins.
    pub fn from_geometry(name: impl Into<String>, geometry: &PageGeometry) -> Self {
        Self::new(name, geometry.page_size, geometry.content_rect())
    }

    pub fn instantiate_frame(&self) -> Frame {
        Frame::new(self.frame)
    }
}
