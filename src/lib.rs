//! Overprint stamps personalized report content onto fixed-layout PDF
//! template variants. A request payload resolves to a dominant/second state
//! pair, the pair selects one of twelve template PDFs, and the engine lays
//! out the payload's text (plus an optional radar chart) into named boxes and
//! stamps the result over the template's artwork.

pub mod canvas;
pub mod chart;
pub mod debug;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod merge;
pub mod metrics;
pub mod payload;
pub mod stamp;
pub mod state;
pub mod template;
pub mod textbox;
pub mod types;

pub use canvas::{Canvas, Command, OverlayDocument, OverlayPage};
pub use chart::{BandValueSet, ChartShape, Tier, build_chart_url};
pub use debug::DiagLogger;
pub use error::OverprintError;
pub use layout::{Align, LayoutBox, PageLayout};
pub use merge::{DiscardReason, DiscardedOverride, MergeOutcome, merge_layout};
pub use metrics::{FaceMetrics, HeuristicMetrics, TextMeasurer};
pub use payload::{Identity, ReportPayload, decode_data_param, normalize_payload};
pub use stamp::{StampedReport, TemplateInfo, inspect_template, stamp_report};
pub use state::{Category, CategoryScores, second_category};
pub use template::{TemplateAsset, TemplateCatalog, TemplateKey};
pub use textbox::{BODY_FONT, LABEL_FONT, BoxRenderer, normalize_text};
pub use types::{Color, Pt, Size};

use serde_json::{Value, json};
use std::time::Duration;

/// Set to skip the chart fetch entirely; reports assemble without a chart.
pub const NO_FETCH_ENV_VAR: &str = "OVERPRINT_NO_FETCH";

const CHART_RESOURCE_ID: &str = "OvpIm1";

#[derive(Debug, Clone)]
pub struct AssemblySummary {
    pub template_key: TemplateKey,
    pub dominant: Option<Category>,
    pub second: Option<Category>,
    pub discarded_overrides: Vec<DiscardedOverride>,
    pub chart_url: Option<String>,
    pub chart_embedded: bool,
    pub pages_stamped: usize,
    pub lines_drawn: usize,
}

#[derive(Debug, Clone)]
pub struct AssemblyOutput {
    pub pdf: Vec<u8>,
    pub summary: AssemblySummary,
}

/// The whole pipeline behind one struct: payload normalization, state and
/// template resolution, layout merge, text layout, chart fetch, and the final
/// stamp. One `Assembler` serves many requests; per-request state lives on
/// the stack of [`Assembler::assemble`].
pub struct Assembler {
    catalog: TemplateCatalog,
    base_layout: PageLayout,
    measurer: Box<dyn TextMeasurer>,
    chart_shape: ChartShape,
    fetch_timeout: Duration,
    fetch_enabled: bool,
    diag: Option<DiagLogger>,
}

impl Assembler {
    pub fn new(catalog: TemplateCatalog) -> Self {
        let fetch_enabled = std::env::var_os(NO_FETCH_ENV_VAR).is_none();
        Self {
            catalog,
            base_layout: PageLayout::base(),
            measurer: Box::new(HeuristicMetrics),
            chart_shape: ChartShape::TwelveSpoke,
            fetch_timeout: Duration::from_secs(10),
            fetch_enabled,
            diag: DiagLogger::from_env(),
        }
    }

    pub fn with_measurer(mut self, measurer: Box<dyn TextMeasurer>) -> Self {
        self.measurer = measurer;
        self
    }

    pub fn with_chart_shape(mut self, shape: ChartShape) -> Self {
        self.chart_shape = shape;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_fetch_enabled(mut self, enabled: bool) -> Self {
        self.fetch_enabled = enabled;
        self
    }

    pub fn with_base_layout(mut self, layout: PageLayout) -> Self {
        self.base_layout = layout;
        self
    }

    /// Decodes a base64url `data` query parameter and assembles from it.
    pub fn assemble_from_data_param<I, K, V>(
        &self,
        data: &str,
        flat_overrides: I,
    ) -> Result<AssemblyOutput, OverprintError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let raw = decode_data_param(data)?;
        self.assemble(&raw, flat_overrides)
    }

    pub fn assemble<I, K, V>(
        &self,
        raw: &Value,
        flat_overrides: I,
    ) -> Result<AssemblyOutput, OverprintError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if self.catalog.is_empty() {
            return Err(OverprintError::InvalidConfiguration(
                "template catalog is empty".to_string(),
            ));
        }
        let payload = normalize_payload(raw);

        let dominant = payload.dominant;
        let scores = payload.category_scores();
        let second = match (payload.second, dominant) {
            (Some(second), _) => Some(second),
            (None, Some(dominant)) if !scores.is_zero() => {
                Some(second_category(dominant, &scores))
            }
            _ => None,
        };
        let requested_key = payload
            .template_key
            .unwrap_or_else(|| TemplateKey::map(dominant, second));

        let (template_key, template_bytes) = self.load_template(requested_key)?;
        let info = inspect_template(&template_bytes)?;

        let merge = merge_layout(
            &self.base_layout,
            payload.layout_override.as_ref(),
            flat_overrides,
        );
        if let Some(diag) = &self.diag {
            for discard in &merge.discarded {
                diag.event(
                    "override.discarded",
                    json!({"token": discard.token, "reason": discard.reason.code()}),
                );
            }
            diag.increment("overrides.discarded", merge.discarded.len() as u64);
        }
        let layout = &merge.layout;

        let chart_url = build_chart_url(&payload.bands, self.chart_shape);
        let chart_image = match (&chart_url, self.fetch_enabled) {
            (Some(url), true) => fetch::fetch_chart_image(url, self.fetch_timeout),
            _ => None,
        };
        if chart_url.is_some() && chart_image.is_none() {
            if let Some(diag) = &self.diag {
                diag.event("chart.skipped", json!({"fetch_enabled": self.fetch_enabled}));
            }
        }

        let page_height = info.page_size.height.to_f32();
        let mut canvas = Canvas::new(info.page_size);
        if let Some(image) = &chart_image {
            canvas.add_image_resource(CHART_RESOURCE_ID, image.bytes.clone());
        }
        let renderer = BoxRenderer::new(self.measurer.as_ref(), page_height);

        let header = header_line(&payload.identity.full_name);
        let mut lines_drawn = 0;

        for page_index in 0..info.page_count {
            if page_index > 0 {
                if let (Some(text), Some(b)) = (header.as_deref(), layout.get("header", "line")) {
                    lines_drawn += renderer.render(&mut canvas, text, BODY_FONT, b);
                }
            }
            lines_drawn += self.render_page(
                &renderer,
                &mut canvas,
                layout,
                &payload,
                page_index,
                page_height,
                chart_image.is_some(),
            );
            canvas.show_page();
        }

        let overlay = canvas.finish();
        let stamped = stamp_report(&template_bytes, &overlay)?;

        if let Some(diag) = &self.diag {
            diag.increment("pages.stamped", stamped.pages_stamped as u64);
            diag.increment("lines.drawn", lines_drawn as u64);
            diag.emit_summary("assemble");
            diag.flush();
        }

        Ok(AssemblyOutput {
            pdf: stamped.pdf,
            summary: AssemblySummary {
                template_key,
                dominant,
                second,
                discarded_overrides: merge.discarded,
                chart_url,
                chart_embedded: stamped.images_embedded > 0,
                pages_stamped: stamped.pages_stamped,
                lines_drawn,
            },
        })
    }

    /// Reads the requested variant, degrading to the default variant when the
    /// requested one is missing or corrupt. Only when both fail does the
    /// assembly error out.
    fn load_template(
        &self,
        requested: TemplateKey,
    ) -> Result<(TemplateKey, Vec<u8>), OverprintError> {
        match self.catalog.read_verified(requested) {
            Ok(bytes) => Ok((requested, bytes)),
            Err(err) if requested != TemplateKey::DEFAULT => {
                if let Some(diag) = &self.diag {
                    diag.event(
                        "template.fallback",
                        json!({"requested": requested.to_string(), "error": err.to_string()}),
                    );
                }
                let bytes = self.catalog.read_verified(TemplateKey::DEFAULT)?;
                Ok((TemplateKey::DEFAULT, bytes))
            }
            Err(err) => Err(err),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_page(
        &self,
        renderer: &BoxRenderer<'_>,
        canvas: &mut Canvas,
        layout: &PageLayout,
        payload: &ReportPayload,
        page_index: usize,
        page_height: f32,
        chart_available: bool,
    ) -> usize {
        let page = format!("p{}", page_index + 1);
        let mut lines = 0;
        let draw = |canvas: &mut Canvas, name: &str, text: &str| -> usize {
            match layout.get(&page, name) {
                Some(b) => renderer.render(canvas, text, BODY_FONT, b),
                None => 0,
            }
        };

        match page.as_str() {
            "p1" => {
                lines += draw(canvas, "name", &payload.identity.full_name);
                lines += draw(canvas, "date", &payload.identity.date_label);
            }
            "p3" => {
                lines += draw(canvas, "tldr", payload.text_value("execSummary_tldr"));
                lines += draw(canvas, "exec", payload.text_value("execSummary"));
                lines += draw(canvas, "tip", payload.text_value("execSummary_tipact"));
            }
            "p4" => {
                lines += draw(canvas, "tldr", payload.text_value("state_tldr"));
                lines += draw(canvas, "main", &joined_state_body(payload));
                lines += draw(canvas, "act", payload.text_value("state_tipact"));
            }
            "p5" => {
                lines += draw(canvas, "tldr", payload.text_value("frequency_tldr"));
                lines += draw(canvas, "main", payload.text_value("frequency"));
                if chart_available {
                    if let Some(b) = layout.get("p5", "chart") {
                        canvas.draw_image(
                            Pt::from_f32(b.x),
                            Pt::from_f32(page_height - b.y - b.h),
                            Pt::from_f32(b.w),
                            Pt::from_f32(b.h),
                            CHART_RESOURCE_ID,
                        );
                    }
                }
            }
            "p6" => {
                lines += draw(canvas, "tldr", payload.text_value("sequence_tldr"));
                lines += draw(canvas, "main", payload.text_value("sequence"));
                lines += draw(canvas, "act", payload.text_value("sequence_tipact"));
            }
            "p7" => {
                lines += draw(canvas, "tldr", payload.text_value("theme_tldr"));
                lines += draw(canvas, "top", payload.text_value("theme"));
                lines += draw(canvas, "tip", payload.text_value("theme_tipact"));
            }
            "p8" => {
                for category in Category::ALL {
                    let name = category.display_name().to_ascii_lowercase();
                    if let Some(b) = layout.get("p8", &name) {
                        lines += renderer.render_labeled(
                            canvas,
                            category.display_name(),
                            payload.work_with_value(category),
                            b,
                        );
                    }
                }
            }
            "p9" => {
                lines += draw(canvas, "anchor", payload.text_value("act_anchor"));
            }
            _ => {}
        }
        lines
    }
}

/// "State Profile for <name>", absent entirely when no name resolved.
fn header_line(full_name: &str) -> Option<String> {
    let name = full_name.trim();
    if name.is_empty() {
        return None;
    }
    Some(format!("State Profile for {name}"))
}

/// Dominant-state body with the bottom-state paragraph appended when present.
fn joined_state_body(payload: &ReportPayload) -> String {
    let dom = payload.text_value("domState");
    let bottom = payload.text_value("bottomState");
    if bottom.trim().is_empty() {
        dom.to_string()
    } else {
        format!("{dom}\n\n{bottom}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Document as LoDocument, Object as LoObject, Stream as LoStream, dictionary};
    use serde_json::json;

    fn make_template_pdf(path: &std::path::Path, page_count: usize) {
        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let mut kids: Vec<LoObject> = Vec::new();
        for i in 0..page_count {
            let content = format!("BT /F1 18 Tf 72 720 Td (PAGE {}) Tj ET", i + 1).into_bytes();
            let content_id = doc.add_object(LoStream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 1060.into(), 850.into()],
            });
            kids.push(page_id.into());
        }
        doc.objects.insert(
            pages_id,
            LoObject::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();
        doc.save(path).expect("save template");
    }

    fn temp_template_dir(tag: &str, keys: &[&str]) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "overprint_assemble_{}_{}_{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("mkdir");
        for key in keys {
            make_template_pdf(&dir.join(format!("template_{key}.pdf")), 9);
        }
        dir
    }

    fn assembler_for(dir: &std::path::Path) -> Assembler {
        Assembler::new(TemplateCatalog::from_dir(dir)).with_fetch_enabled(false)
    }

    const NO_FLAT: [(&str, &str); 0] = [];

    #[test]
    fn assembles_the_resolved_variant_end_to_end() {
        let dir = temp_template_dir("resolved", &["RT"]);
        let assembler = assembler_for(&dir);
        let raw = json!({
            "identity": {"fullName": "Jordan Reyes", "dateLabel": "August 2026"},
            "domState": "Regulated",
            "ctrl": {
                "totals": {"C": 1, "T": 3, "R": 0, "L": 2},
                "bands": {"R_mid": 4, "T_high": 3}
            },
            "text": {
                "execSummary": "A measured profile under pressure.",
                "execSummary_tldr": "Calm, mostly.",
                "state_tldr": "Regulated leads.",
                "domState": "You tend to stay regulated.",
                "bottomState": "Concealed shows least."
            },
            "workWith": {"concealed": "Give them room.", "lead": "Be direct."}
        });

        let out = assembler.assemble(&raw, NO_FLAT).expect("assemble");
        // Dominant R; explicit totals make T (3) the runner-up.
        assert_eq!(out.summary.template_key.to_string(), "RT");
        assert_eq!(out.summary.dominant, Some(Category::Regulated));
        assert_eq!(out.summary.second, Some(Category::Triggered));
        assert_eq!(out.summary.pages_stamped, 9);
        assert!(out.summary.lines_drawn > 0);
        assert!(out.summary.chart_url.is_some());
        assert!(!out.summary.chart_embedded, "fetch disabled");

        let reloaded = LoDocument::load_mem(&out.pdf).expect("reload");
        assert_eq!(reloaded.get_pages().len(), 9);
    }

    #[test]
    fn unresolvable_payload_falls_back_to_the_default_variant() {
        let dir = temp_template_dir("default", &["CT"]);
        let assembler = assembler_for(&dir);
        let raw = json!({"identity": {"fullName": "Sam"}, "text": {"execSummary": "hello"}});
        let out = assembler.assemble(&raw, NO_FLAT).expect("assemble");
        assert_eq!(out.summary.template_key, TemplateKey::DEFAULT);
        assert_eq!(out.summary.dominant, None);
        assert!(out.summary.chart_url.is_none(), "no bands, no chart");
    }

    #[test]
    fn missing_variant_degrades_to_the_default_template() {
        // Catalog knows all twelve keys but only CT exists on disk.
        let dir = temp_template_dir("fallback", &["CT"]);
        let assembler = assembler_for(&dir);
        let raw = json!({"templateKey": "LR", "identity": {"fullName": "Sam"}});
        let out = assembler.assemble(&raw, NO_FLAT).expect("assemble");
        assert_eq!(out.summary.template_key, TemplateKey::DEFAULT);
        // The resolved categories still reflect the request, only the asset
        // degraded.
        assert_eq!(out.summary.dominant, Some(Category::Lead));
    }

    #[test]
    fn flat_overrides_apply_and_bad_ones_are_reported() {
        let dir = temp_template_dir("overrides", &["CT"]);
        let assembler = assembler_for(&dir);
        let raw = json!({"identity": {"fullName": "Sam"}, "text": {"execSummary": "body"}});
        let flat = [
            ("layout_p3_exec_size", "20"),
            ("layout_p3_exec_size", "oops"),
            ("layout_p3_nosuch_x", "5"),
        ];
        let out = assembler.assemble(&raw, flat).expect("assemble");
        let codes: Vec<&str> = out
            .summary
            .discarded_overrides
            .iter()
            .map(|d| d.reason.code())
            .collect();
        assert_eq!(codes, vec!["not_a_number", "unknown_box"]);
    }

    #[test]
    fn empty_catalog_is_a_configuration_error() {
        let assembler =
            Assembler::new(TemplateCatalog::default()).with_fetch_enabled(false);
        let err = assembler
            .assemble(&json!({}), NO_FLAT)
            .expect_err("must fail");
        assert!(matches!(err, OverprintError::InvalidConfiguration(_)));
    }

    #[test]
    fn data_param_entry_point_round_trips() {
        use base64::Engine;
        let dir = temp_template_dir("dataparam", &["CT"]);
        let assembler = assembler_for(&dir);
        let raw = json!({"identity": {"fullName": "Ada"}, "text": {"act_anchor": "anchor text"}});
        let data = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw.to_string());
        let out = assembler
            .assemble_from_data_param(&data, NO_FLAT)
            .expect("assemble");
        assert_eq!(out.summary.pages_stamped, 9);
    }
}
