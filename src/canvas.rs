use crate::types::{Color, Pt, Size};
use std::collections::BTreeMap;

/// One recorded draw instruction. Coordinates are absolute page coordinates
/// in the PDF's bottom-left origin; the box renderer performs the top-left
/// conversion before anything reaches the canvas.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetFillColor(Color),
    SetFontName(String),
    SetFontSize(Pt),
    DrawRect {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
    },
    Fill,
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
    },
    DrawImage {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct OverlayPage {
    pub commands: Vec<Command>,
}

/// A finished overlay: one page of draw instructions per template page plus
/// the raster resources (chart images) referenced by `DrawImage`.
#[derive(Debug, Clone)]
pub struct OverlayDocument {
    pub page_size: Size,
    pub pages: Vec<OverlayPage>,
    pub images: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone)]
struct DrawState {
    fill_color: Color,
    font_name: String,
    font_size: Pt,
}

impl DrawState {
    fn initial() -> Self {
        Self {
            fill_color: Color::BLACK,
            font_name: "Helvetica".to_string(),
            font_size: Pt::from_f32(12.0),
        }
    }
}

/// Records draw instructions page by page, suppressing redundant state
/// changes so stamped content streams stay small.
pub struct Canvas {
    page_size: Size,
    pages: Vec<OverlayPage>,
    current: OverlayPage,
    state: DrawState,
    images: BTreeMap<String, Vec<u8>>,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
            current: OverlayPage::default(),
            state: DrawState::initial(),
            images: BTreeMap::new(),
        }
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.state.fill_color == color {
            return;
        }
        self.state.fill_color = color;
        self.current.commands.push(Command::SetFillColor(color));
    }

    pub fn set_font_name(&mut self, name: &str) {
        if self.state.font_name == name {
            return;
        }
        self.state.font_name = name.to_string();
        self.current
            .commands
            .push(Command::SetFontName(self.state.font_name.clone()));
    }

    pub fn set_font_size(&mut self, size: Pt) {
        if self.state.font_size == size {
            return;
        }
        self.state.font_size = size;
        self.current.commands.push(Command::SetFontSize(size));
    }

    pub fn draw_rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt) {
        self.current.commands.push(Command::DrawRect {
            x,
            y,
            width,
            height,
        });
    }

    pub fn fill(&mut self) {
        self.current.commands.push(Command::Fill);
    }

    pub fn draw_string(&mut self, x: Pt, y: Pt, text: impl Into<String>) {
        self.current.commands.push(Command::DrawString {
            x,
            y,
            text: text.into(),
        });
    }

    pub fn draw_image(
        &mut self,
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: impl Into<String>,
    ) {
        self.current.commands.push(Command::DrawImage {
            x,
            y,
            width,
            height,
            resource_id: resource_id.into(),
        });
    }

    /// Registers raster bytes under a resource id for later `DrawImage` use.
    /// Re-registering the same id replaces the bytes.
    pub fn add_image_resource(&mut self, resource_id: impl Into<String>, bytes: Vec<u8>) {
        self.images.insert(resource_id.into(), bytes);
    }

    pub fn is_current_empty(&self) -> bool {
        self.current.commands.is_empty()
    }

    pub fn show_page(&mut self) {
        let current = std::mem::take(&mut self.current);
        self.pages.push(current);
        self.state = DrawState::initial();
    }

    pub fn finish(mut self) -> OverlayDocument {
        if !self.current.commands.is_empty() {
            self.show_page();
        }
        OverlayDocument {
            page_size: self.page_size,
            pages: self.pages,
            images: self.images,
        }
    }
}
