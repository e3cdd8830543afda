use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

impl Align {
    /// Accepts the British spelling alongside the canonical three values.
    pub fn parse(raw: &str) -> Option<Align> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "left" => Some(Align::Left),
            "center" | "centre" => Some(Align::Center),
            "right" => Some(Align::Right),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Align::Left => "left",
            Align::Center => "center",
            Align::Right => "right",
        }
    }
}

/// A named rectangular region on one page, described top-left-origin in
/// points. `w > 0` always; `h >= 0`. A box with `max_lines == 0` is a no-op
/// for the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub size: f32,
    pub align: Align,
    pub max_lines: u32,
    pub line_gap: f32,
    pub pad: f32,
    /// Paint an opaque background before drawing, masking template artwork.
    pub bg: bool,
}

impl Default for LayoutBox {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: 1.0,
            h: 0.0,
            size: 12.0,
            align: Align::Left,
            max_lines: 1,
            line_gap: 3.0,
            pad: 0.0,
            bg: false,
        }
    }
}

impl LayoutBox {
    fn body(x: f32, y: f32, w: f32, size: f32, max_lines: u32) -> LayoutBox {
        let line_gap = size * 0.25;
        let pad = 6.0;
        LayoutBox {
            x,
            y,
            w,
            h: max_lines as f32 * (size + line_gap) + 2.0 * pad,
            size,
            align: Align::Left,
            max_lines,
            line_gap,
            pad,
            bg: false,
        }
    }

    pub fn line_height(&self) -> f32 {
        self.size + self.line_gap
    }
}

/// Page key -> box key -> layout box. Box names are unique per page by
/// construction of the map; overrides never create pages or boxes that the
/// base does not declare.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pages: BTreeMap<String, BTreeMap<String, LayoutBox>>,
}

impl PageLayout {
    /// Built-in defaults covering every page and box the assembler renders.
    /// All geometry assumes the report template's 1060 x 850 pt pages; flat
    /// or structured overrides adjust per request.
    pub fn base() -> PageLayout {
        let mut layout = PageLayout::default();

        // Cover page overlays.
        layout.set(
            "p1",
            "name",
            LayoutBox {
                align: Align::Center,
                ..LayoutBox::body(270.0, 330.0, 520.0, 18.0, 1)
            },
        );
        layout.set(
            "p1",
            "date",
            LayoutBox {
                align: Align::Center,
                ..LayoutBox::body(270.0, 520.0, 520.0, 16.0, 1)
            },
        );

        // Header line stamped onto every non-cover page.
        layout.set("header", "line", {
            let mut b = LayoutBox::body(60.0, 14.0, 950.0, 14.0, 1);
            b.pad = 4.0;
            b.h = 26.0;
            b
        });

        // Section pages: a summary strip, the main body, and a tip/action
        // footer where the template reserves one.
        layout.set("p3", "tldr", LayoutBox::body(55.0, 120.0, 950.0, 18.0, 4));
        layout.set("p3", "exec", LayoutBox::body(55.0, 235.0, 950.0, 18.0, 20));
        layout.set("p3", "tip", LayoutBox::body(55.0, 710.0, 950.0, 18.0, 5));

        layout.set("p4", "tldr", LayoutBox::body(55.0, 120.0, 950.0, 18.0, 4));
        layout.set("p4", "main", LayoutBox::body(55.0, 235.0, 950.0, 18.0, 20));
        layout.set("p4", "act", LayoutBox::body(55.0, 710.0, 950.0, 18.0, 5));

        layout.set("p5", "tldr", LayoutBox::body(55.0, 120.0, 950.0, 18.0, 4));
        layout.set("p5", "main", LayoutBox::body(55.0, 235.0, 600.0, 18.0, 20));
        layout.set(
            "p5",
            "chart",
            LayoutBox {
                x: 680.0,
                y: 280.0,
                w: 340.0,
                h: 340.0,
                size: 12.0,
                align: Align::Left,
                max_lines: 1,
                line_gap: 3.0,
                pad: 0.0,
                bg: false,
            },
        );

        layout.set("p6", "tldr", LayoutBox::body(55.0, 120.0, 950.0, 18.0, 4));
        layout.set("p6", "main", LayoutBox::body(55.0, 235.0, 950.0, 18.0, 20));
        layout.set("p6", "act", LayoutBox::body(55.0, 710.0, 950.0, 18.0, 5));

        layout.set("p7", "tldr", LayoutBox::body(55.0, 120.0, 950.0, 18.0, 4));
        layout.set("p7", "top", LayoutBox::body(55.0, 235.0, 950.0, 18.0, 20));
        layout.set("p7", "tip", LayoutBox::body(55.0, 710.0, 950.0, 18.0, 5));

        // Work-with page: four labeled columns, one per category.
        for (index, key) in ["concealed", "triggered", "regulated", "lead"]
            .into_iter()
            .enumerate()
        {
            let mut b = LayoutBox::body(60.0 + 245.0 * index as f32, 270.0, 225.0, 14.0, 16);
            b.pad = 4.0;
            layout.set("p8", key, b);
        }

        layout.set("p9", "anchor", LayoutBox::body(55.0, 235.0, 950.0, 18.0, 14));

        layout
    }

    pub fn set(&mut self, page: &str, name: &str, value: LayoutBox) {
        self.pages
            .entry(page.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    pub fn page(&self, page: &str) -> Option<&BTreeMap<String, LayoutBox>> {
        self.pages.get(page)
    }

    pub fn get(&self, page: &str, name: &str) -> Option<&LayoutBox> {
        self.pages.get(page).and_then(|boxes| boxes.get(name))
    }

    pub fn get_mut(&mut self, page: &str, name: &str) -> Option<&mut LayoutBox> {
        self.pages.get_mut(page).and_then(|boxes| boxes.get_mut(name))
    }

    pub fn contains_page(&self, page: &str) -> bool {
        self.pages.contains_key(page)
    }

    pub fn ensure_page(&mut self, page: &str) -> &mut BTreeMap<String, LayoutBox> {
        self.pages.entry(page.to_string()).or_default()
    }

    pub fn page_keys(&self) -> impl Iterator<Item = &str> {
        self.pages.keys().map(|k| k.as_str())
    }
}
