use crate::canvas::Canvas;
use crate::layout::{Align, LayoutBox};
use crate::metrics::TextMeasurer;
use crate::types::{Color, Pt};

pub const BODY_FONT: &str = "Helvetica";
pub const LABEL_FONT: &str = "Helvetica-Bold";

/// Collapses runs of blanks within each line and drops carriage returns.
/// Explicit line breaks survive as paragraph boundaries; an empty line stays
/// an empty line (it consumes one line slot when rendered).
pub fn normalize_text(raw: &str) -> String {
    let mut paragraphs = Vec::new();
    for line in raw.replace('\r', "").split('\n') {
        let collapsed: Vec<&str> = line.split_whitespace().collect();
        paragraphs.push(collapsed.join(" "));
    }
    while paragraphs.last().is_some_and(|p| p.is_empty()) {
        paragraphs.pop();
    }
    while paragraphs.first().is_some_and(|p| p.is_empty()) {
        paragraphs.remove(0);
    }
    paragraphs.join("\n")
}

/// Wraps and clips text into layout boxes, converting the boxes' top-left
/// coordinates into the page's bottom-left coordinate system as it emits
/// draw instructions.
pub struct BoxRenderer<'a> {
    measurer: &'a dyn TextMeasurer,
    page_height: f32,
}

impl<'a> BoxRenderer<'a> {
    pub fn new(measurer: &'a dyn TextMeasurer, page_height: f32) -> Self {
        Self {
            measurer,
            page_height,
        }
    }

    /// Draws `text` into `b`, returning the number of line slots consumed.
    /// Whitespace-only text renders nothing at all, background included.
    pub fn render(&self, canvas: &mut Canvas, text: &str, font: &str, b: &LayoutBox) -> usize {
        let text = normalize_text(text);
        if text.is_empty() || b.w <= 0.0 || b.max_lines == 0 {
            return 0;
        }
        let avail = b.w - 2.0 * b.pad;
        if avail <= 0.0 {
            return 0;
        }

        let size = Pt::from_f32(b.size);
        let lines = self.wrap(&text, size, avail);

        // Box origin in the drawing surface's bottom-left system.
        let box_bottom = self.page_height - b.y - b.h;

        if b.bg {
            canvas.set_fill_color(Color::WHITE);
            canvas.draw_rect(
                Pt::from_f32(b.x),
                Pt::from_f32(box_bottom),
                Pt::from_f32(b.w),
                Pt::from_f32(b.h),
            );
            canvas.fill();
        }

        canvas.set_fill_color(Color::BLACK);
        canvas.set_font_name(font);
        canvas.set_font_size(size);

        let line_height = b.size + b.line_gap;
        let mut baseline = self.page_height - b.y - b.pad - b.size;
        let mut consumed = 0usize;

        for line in lines {
            if consumed as u32 >= b.max_lines {
                break;
            }
            // Baseline fell past the box's padded bottom edge: stop even if
            // max_lines has headroom. Both limits are independent.
            if baseline < box_bottom + b.pad {
                break;
            }
            if !line.is_empty() {
                let line_width = self.measurer.text_width(size, &line).to_f32();
                let x = match b.align {
                    Align::Left => b.x + b.pad,
                    Align::Center => b.x + b.pad + (avail - line_width) / 2.0,
                    Align::Right => b.x + b.w - b.pad - line_width,
                };
                canvas.draw_string(Pt::from_f32(x), Pt::from_f32(baseline), line);
            }
            baseline -= line_height;
            consumed += 1;
        }
        consumed
    }

    /// A bold single-line label over wrapped body text: two renders into
    /// vertically adjacent sub-boxes. When the label actually drew, the body
    /// sub-box loses one line of height and one line slot.
    pub fn render_labeled(
        &self,
        canvas: &mut Canvas,
        label: &str,
        body: &str,
        b: &LayoutBox,
    ) -> usize {
        // One background for the whole composite, before either render.
        if b.bg && !(normalize_text(label).is_empty() && normalize_text(body).is_empty()) {
            canvas.set_fill_color(Color::WHITE);
            canvas.draw_rect(
                Pt::from_f32(b.x),
                Pt::from_f32(self.page_height - b.y - b.h),
                Pt::from_f32(b.w),
                Pt::from_f32(b.h),
            );
            canvas.fill();
        }

        let line_height = b.line_height();
        let mut label_box = b.clone();
        label_box.bg = false;
        label_box.max_lines = 1;
        label_box.h = line_height + 2.0 * b.pad;
        let label_lines = self.render(canvas, label, LABEL_FONT, &label_box);

        let mut body_box = b.clone();
        body_box.bg = false;
        if label_lines > 0 {
            body_box.y = b.y + line_height;
            body_box.h = (b.h - line_height).max(0.0);
            body_box.max_lines = b.max_lines.saturating_sub(1);
        }
        label_lines + self.render(canvas, body, BODY_FONT, &body_box)
    }

    /// Greedy word wrap per paragraph. A single word wider than the box is
    /// emitted as its own overflowing line rather than split mid-word.
    fn wrap(&self, text: &str, size: Pt, avail: f32) -> Vec<String> {
        let avail_pt = Pt::from_f32(avail);
        let mut lines = Vec::new();
        for paragraph in text.split('\n') {
            if paragraph.is_empty() {
                lines.push(String::new());
                continue;
            }
            let mut line = String::new();
            for word in paragraph.split(' ') {
                let candidate = if line.is_empty() {
                    word.to_string()
                } else {
                    format!("{} {}", line, word)
                };
                if self.measurer.text_width(size, &candidate) <= avail_pt {
                    line = candidate;
                } else {
                    if !line.is_empty() {
                        lines.push(line);
                    }
                    line = word.to_string();
                }
            }
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::metrics::HeuristicMetrics;
    use crate::types::Size;

    const PAGE_H: f32 = 850.0;

    fn test_box() -> LayoutBox {
        LayoutBox {
            x: 50.0,
            y: 100.0,
            w: 200.0,
            h: 120.0,
            size: 10.0,
            align: Align::Left,
            max_lines: 8,
            line_gap: 2.0,
            pad: 5.0,
            bg: false,
        }
    }

    fn render_into(text: &str, b: &LayoutBox) -> Vec<Command> {
        let metrics = HeuristicMetrics;
        let renderer = BoxRenderer::new(&metrics, PAGE_H);
        let mut canvas = Canvas::new(Size::from_f32(1060.0, PAGE_H));
        renderer.render(&mut canvas, text, BODY_FONT, b);
        canvas.finish().pages.into_iter().next().map(|p| p.commands).unwrap_or_default()
    }

    fn drawn_lines(commands: &[Command]) -> Vec<(f32, f32, String)> {
        commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawString { x, y, text } => {
                    Some((x.to_f32(), y.to_f32(), text.clone()))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn coordinate_conversion_is_self_inverse() {
        let b = test_box();
        let bottom_left_y = PAGE_H - b.y - b.h;
        let recovered_top_y = PAGE_H - bottom_left_y - b.h;
        assert_eq!(recovered_top_y, b.y);
    }

    #[test]
    fn first_line_sits_at_the_top_of_the_box() {
        let lines = drawn_lines(&render_into("hello", &test_box()));
        assert_eq!(lines.len(), 1);
        // Baseline = pageHeight - y - pad - size.
        assert_eq!(lines[0].1, PAGE_H - 100.0 - 5.0 - 10.0);
        assert_eq!(lines[0].0, 55.0);
    }

    #[test]
    fn lines_step_down_by_size_plus_gap() {
        let lines = drawn_lines(&render_into("one\ntwo\nthree", &test_box()));
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].1 - lines[1].1, 12.0);
        assert_eq!(lines[1].1 - lines[2].1, 12.0);
    }

    #[test]
    fn wrapped_lines_never_exceed_available_width() {
        let metrics = HeuristicMetrics;
        let b = test_box();
        let avail = Pt::from_f32(b.w - 2.0 * b.pad);
        let text = "several short words that must be wrapped into multiple lines cleanly";
        let lines = drawn_lines(&render_into(text, &b));
        assert!(lines.len() > 1);
        for (_, _, line) in &lines {
            assert!(
                metrics.text_width(Pt::from_f32(b.size), line) <= avail,
                "line too wide: {:?}",
                line
            );
        }
    }

    #[test]
    fn unsplittable_word_overflows_on_its_own_line() {
        let metrics = HeuristicMetrics;
        let b = test_box();
        // 40 chars * 6pt = 240pt > 190pt available.
        let long_word = "x".repeat(40);
        let text = format!("tiny {} tiny", long_word);
        let lines = drawn_lines(&render_into(&text, &b));
        assert!(lines.iter().any(|(_, _, l)| l == &long_word));
        let avail = Pt::from_f32(b.w - 2.0 * b.pad);
        let over: Vec<_> = lines
            .iter()
            .filter(|(_, _, l)| metrics.text_width(Pt::from_f32(b.size), l) > avail)
            .collect();
        assert_eq!(over.len(), 1, "only the unsplittable word may overflow");
    }

    #[test]
    fn max_lines_clips_emission() {
        let mut b = test_box();
        b.max_lines = 2;
        let lines = drawn_lines(&render_into("a\nb\nc\nd", &b));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].2, "a");
        assert_eq!(lines[1].2, "b");
    }

    #[test]
    fn bottom_edge_clips_before_max_lines_when_box_is_short() {
        let mut b = test_box();
        b.h = 30.0; // room for two 12pt line steps, max_lines still 8
        let lines = drawn_lines(&render_into("a\nb\nc\nd\ne", &b));
        assert!(lines.len() < 5);
        assert!(lines.len() <= 2, "short box must clip early, got {}", lines.len());
    }

    #[test]
    fn center_and_right_alignment_position_each_line_independently() {
        let metrics = HeuristicMetrics;
        let mut b = test_box();
        b.align = Align::Center;
        let lines = drawn_lines(&render_into("wide line here\nab", &b));
        assert_eq!(lines.len(), 2);
        let avail = b.w - 2.0 * b.pad;
        for (x, _, line) in &lines {
            let width = metrics.text_width(Pt::from_f32(b.size), line).to_f32();
            assert!((x - (b.x + b.pad + (avail - width) / 2.0)).abs() < 0.01);
        }

        b.align = Align::Right;
        let lines = drawn_lines(&render_into("wide line here\nab", &b));
        for (x, _, line) in &lines {
            let width = metrics.text_width(Pt::from_f32(b.size), line).to_f32();
            assert!((x - (b.x + b.w - b.pad - width)).abs() < 0.01);
        }
    }

    #[test]
    fn whitespace_only_text_renders_nothing_at_all() {
        let mut b = test_box();
        b.bg = true;
        let commands = render_into("   \n\t  ", &b);
        assert!(commands.is_empty(), "not even the background may paint");
    }

    #[test]
    fn background_paints_exactly_once_before_any_text() {
        let mut b = test_box();
        b.bg = true;
        let commands = render_into("hello world", &b);
        let rects: Vec<usize> = commands
            .iter()
            .enumerate()
            .filter_map(|(i, c)| matches!(c, Command::DrawRect { .. }).then_some(i))
            .collect();
        let first_text = commands
            .iter()
            .position(|c| matches!(c, Command::DrawString { .. }))
            .expect("text drawn");
        assert_eq!(rects.len(), 1);
        assert!(rects[0] < first_text);
        let Command::DrawRect { y, height, .. } = &commands[rects[0]] else {
            unreachable!()
        };
        assert_eq!(y.to_f32(), PAGE_H - b.y - b.h);
        assert_eq!(height.to_f32(), b.h);
    }

    #[test]
    fn labeled_render_reduces_body_by_one_line() {
        let metrics = HeuristicMetrics;
        let renderer = BoxRenderer::new(&metrics, PAGE_H);
        let mut b = test_box();
        b.max_lines = 3;

        let mut canvas = Canvas::new(Size::from_f32(1060.0, PAGE_H));
        let consumed = renderer.render_labeled(&mut canvas, "Label", "a\nb\nc\nd", &b);
        assert_eq!(consumed, 3, "label takes one of the three slots");
        let commands = canvas.finish().pages.remove(0).commands;
        let lines = drawn_lines(&commands);
        assert_eq!(lines[0].2, "Label");
        assert_eq!(lines.len(), 3);
        // Body starts one line step below the label.
        assert_eq!(lines[0].1 - lines[1].1, b.line_height());
    }

    #[test]
    fn labeled_render_with_empty_label_keeps_full_body_budget() {
        let metrics = HeuristicMetrics;
        let renderer = BoxRenderer::new(&metrics, PAGE_H);
        let mut b = test_box();
        b.max_lines = 3;
        let mut canvas = Canvas::new(Size::from_f32(1060.0, PAGE_H));
        let consumed = renderer.render_labeled(&mut canvas, "  ", "a\nb\nc\nd", &b);
        assert_eq!(consumed, 3);
        let lines = drawn_lines(&canvas.finish().pages.remove(0).commands);
        assert_eq!(lines[0].2, "a");
    }

    #[test]
    fn normalize_collapses_inner_whitespace_and_keeps_breaks() {
        assert_eq!(normalize_text("  a   b \r\n\n c  "), "a b\n\nc");
        assert_eq!(normalize_text(" \n \n"), "");
    }
}
