use crate::layout::{Align, LayoutBox, PageLayout};
use serde_json::Value;

/// Leading token of a flat layout override key
/// (`layout_<page>_<box>_<property>`).
pub const OVERRIDE_PREFIX: &str = "layout";

/// The only box properties a request may mutate.
pub const ALLOWED_PROPS: [&str; 10] = [
    "x", "y", "w", "h", "size", "maxLines", "align", "pad", "lineGap", "bg",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    UnknownPage,
    UnknownBox,
    PropNotAllowed,
    NotANumber,
    BadAlign,
}

impl DiscardReason {
    pub fn code(self) -> &'static str {
        match self {
            DiscardReason::UnknownPage => "unknown_page",
            DiscardReason::UnknownBox => "unknown_box",
            DiscardReason::PropNotAllowed => "prop_not_allowed",
            DiscardReason::NotANumber => "not_a_number",
            DiscardReason::BadAlign => "bad_align",
        }
    }
}

/// One override that validation rejected. Rejection never aborts the merge;
/// the record exists for diagnostic surfacing only.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscardedOverride {
    pub token: String,
    pub reason: DiscardReason,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub layout: PageLayout,
    pub discarded: Vec<DiscardedOverride>,
}

/// Produces the effective per-request layout from the three tiers: the
/// shared base (deep-copied, never mutated), an optional structured override
/// from the payload, and flat key/value overrides from the request query.
pub fn merge_layout<I, K, V>(
    base: &PageLayout,
    structured: Option<&Value>,
    flat: I,
) -> MergeOutcome
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    // The base is shared process-wide; concurrent requests must never see
    // each other's overrides, so everything below works on this clone.
    let mut layout = base.clone();
    let mut discarded = Vec::new();

    if let Some(Value::Object(pages)) = structured {
        apply_structured(&mut layout, pages, &mut discarded);
    }

    for (key, value) in flat {
        apply_flat(&mut layout, key.as_ref(), value.as_ref(), &mut discarded);
    }

    MergeOutcome { layout, discarded }
}

fn apply_structured(
    layout: &mut PageLayout,
    pages: &serde_json::Map<String, Value>,
    discarded: &mut Vec<DiscardedOverride>,
) {
    for (page_key, boxes) in pages {
        let Value::Object(boxes) = boxes else {
            continue;
        };
        // Unknown pages are accepted for forward compatibility; the renderer
        // simply never consults them.
        layout.ensure_page(page_key);
        for (box_key, props) in boxes {
            let Value::Object(props) = props else {
                continue;
            };
            if layout.get(page_key, box_key).is_none() {
                layout.set(page_key, box_key, LayoutBox::default());
            }
            for (prop, value) in props {
                let token = format!("{}.{}.{}", page_key, box_key, prop);
                let target = match layout.get_mut(page_key, box_key) {
                    Some(target) => target,
                    None => continue,
                };
                if let Err(reason) = apply_prop(target, prop, &JsonOrText::Json(value)) {
                    discarded.push(DiscardedOverride { token, reason });
                }
            }
        }
    }
}

fn apply_flat(
    layout: &mut PageLayout,
    key: &str,
    value: &str,
    discarded: &mut Vec<DiscardedOverride>,
) {
    // Tokens that do not even look like layout overrides are ignored, not
    // reported: the request query carries plenty of unrelated parameters.
    let parts: Vec<&str> = key.split('_').collect();
    let [prefix, page_key, box_key, prop] = parts.as_slice() else {
        return;
    };
    if *prefix != OVERRIDE_PREFIX {
        return;
    }

    let token = format!("{}={}", key, value);
    if !layout.contains_page(page_key) {
        discarded.push(DiscardedOverride {
            token,
            reason: DiscardReason::UnknownPage,
        });
        return;
    }
    let Some(target) = layout.get_mut(page_key, box_key) else {
        discarded.push(DiscardedOverride {
            token,
            reason: DiscardReason::UnknownBox,
        });
        return;
    };
    if let Err(reason) = apply_prop(target, prop, &JsonOrText::Text(value)) {
        discarded.push(DiscardedOverride { token, reason });
    }
}

enum JsonOrText<'a> {
    Json(&'a Value),
    Text(&'a str),
}

impl JsonOrText<'_> {
    fn as_number(&self) -> Option<f64> {
        let value = match self {
            JsonOrText::Json(Value::Number(n)) => n.as_f64(),
            JsonOrText::Json(Value::String(s)) => s.trim().parse::<f64>().ok(),
            JsonOrText::Json(_) => None,
            JsonOrText::Text(s) => s.trim().parse::<f64>().ok(),
        };
        value.filter(|v| v.is_finite())
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            JsonOrText::Json(Value::String(s)) => Some(s.as_str()),
            JsonOrText::Json(_) => None,
            JsonOrText::Text(s) => Some(s),
        }
    }

    fn as_bool(&self) -> Option<bool> {
        if let JsonOrText::Json(Value::Bool(b)) = self {
            return Some(*b);
        }
        let raw = match self {
            JsonOrText::Json(Value::Number(n)) => return Some(n.as_f64() != Some(0.0)),
            _ => self.as_text()?,
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        }
    }
}

fn apply_prop(
    target: &mut LayoutBox,
    prop: &str,
    value: &JsonOrText<'_>,
) -> Result<(), DiscardReason> {
    if !ALLOWED_PROPS.contains(&prop) {
        return Err(DiscardReason::PropNotAllowed);
    }
    match prop {
        "align" => {
            let raw = value.as_text().ok_or(DiscardReason::BadAlign)?;
            target.align = Align::parse(raw).ok_or(DiscardReason::BadAlign)?;
        }
        "bg" => {
            // The reason taxonomy is closed; a malformed boolean rides the
            // value-coercion code.
            target.bg = value.as_bool().ok_or(DiscardReason::NotANumber)?;
        }
        "maxLines" => {
            let number = value.as_number().ok_or(DiscardReason::NotANumber)?;
            if number < 0.0 {
                return Err(DiscardReason::NotANumber);
            }
            target.max_lines = number.round() as u32;
        }
        _ => {
            let number = value.as_number().ok_or(DiscardReason::NotANumber)? as f32;
            match prop {
                "x" => target.x = number,
                "y" => target.y = number,
                "w" => target.w = number,
                "h" => target.h = number,
                "size" => target.size = number,
                "pad" => target.pad = number,
                "lineGap" => target.line_gap = number,
                _ => return Err(DiscardReason::PropNotAllowed),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_flat() -> Vec<(String, String)> {
        Vec::new()
    }

    #[test]
    fn structured_override_is_box_level_shallow_replace() {
        let base = PageLayout::base();
        let structured = json!({
            "p3": { "exec": { "x": 100, "size": 20 } }
        });
        let outcome = merge_layout(&base, Some(&structured), no_flat());
        assert!(outcome.discarded.is_empty());
        let merged = outcome.layout.get("p3", "exec").expect("box");
        let original = base.get("p3", "exec").expect("box");
        assert_eq!(merged.x, 100.0);
        assert_eq!(merged.size, 20.0);
        // Properties absent from the override are retained from base.
        assert_eq!(merged.y, original.y);
        assert_eq!(merged.max_lines, original.max_lines);
    }

    #[test]
    fn structured_override_adds_boxes_and_accepts_unknown_pages() {
        let base = PageLayout::base();
        let structured = json!({
            "p3": { "extra": { "x": 10, "y": 20, "w": 100 } },
            "p99": { "future": { "x": 1 } }
        });
        let outcome = merge_layout(&base, Some(&structured), no_flat());
        let extra = outcome.layout.get("p3", "extra").expect("added box");
        assert_eq!(extra.x, 10.0);
        assert_eq!(extra.w, 100.0);
        assert!(outcome.layout.contains_page("p99"));
    }

    #[test]
    fn flat_override_applies_whitelisted_numeric_props() {
        let base = PageLayout::base();
        let flat = vec![
            ("layout_p3_exec_x".to_string(), "200".to_string()),
            ("layout_p3_exec_maxLines".to_string(), "7".to_string()),
            ("layout_p3_exec_lineGap".to_string(), "5.5".to_string()),
            ("layout_p8_lead_bg".to_string(), "1".to_string()),
        ];
        let outcome = merge_layout(&base, None, flat);
        assert!(outcome.discarded.is_empty());
        let exec = outcome.layout.get("p3", "exec").expect("box");
        assert_eq!(exec.x, 200.0);
        assert_eq!(exec.max_lines, 7);
        assert_eq!(exec.line_gap, 5.5);
        assert!(outcome.layout.get("p8", "lead").expect("box").bg);
    }

    #[test]
    fn unknown_box_discards_and_leaves_the_page_untouched() {
        let base = PageLayout::base();
        let flat = vec![("layout_p3_box1_x".to_string(), "100".to_string())];
        let outcome = merge_layout(&base, None, flat);
        assert_eq!(outcome.discarded.len(), 1);
        assert_eq!(outcome.discarded[0].reason, DiscardReason::UnknownBox);
        assert_eq!(outcome.discarded[0].reason.code(), "unknown_box");
        assert_eq!(
            outcome.layout.page("p3"),
            base.page("p3"),
            "rejected override must not perturb the page"
        );
    }

    #[test]
    fn discard_reasons_cover_the_taxonomy() {
        let base = PageLayout::base();
        let flat = vec![
            ("layout_p0_exec_x".to_string(), "1".to_string()),
            ("layout_p3_exec_font".to_string(), "1".to_string()),
            ("layout_p3_exec_x".to_string(), "wide".to_string()),
            ("layout_p3_exec_align".to_string(), "justify".to_string()),
            ("layout_p3_exec_bg".to_string(), "maybe".to_string()),
        ];
        let outcome = merge_layout(&base, None, flat);
        let reasons: Vec<DiscardReason> =
            outcome.discarded.iter().map(|d| d.reason).collect();
        assert_eq!(
            reasons,
            vec![
                DiscardReason::UnknownPage,
                DiscardReason::PropNotAllowed,
                DiscardReason::NotANumber,
                DiscardReason::BadAlign,
                DiscardReason::NotANumber,
            ]
        );
    }

    #[test]
    fn malformed_tokens_are_silently_ignored() {
        let base = PageLayout::base();
        let flat = vec![
            ("debug".to_string(), "1".to_string()),
            ("layout_p3_exec".to_string(), "1".to_string()),
            ("style_p3_exec_x".to_string(), "1".to_string()),
            ("layout_p3_exec_x_extra".to_string(), "1".to_string()),
        ];
        let outcome = merge_layout(&base, None, flat);
        assert!(outcome.discarded.is_empty());
        assert_eq!(outcome.layout, base);
    }

    #[test]
    fn centre_normalizes_to_center() {
        let base = PageLayout::base();
        let flat = vec![("layout_p3_exec_align".to_string(), "centre".to_string())];
        let outcome = merge_layout(&base, None, flat);
        assert_eq!(
            outcome.layout.get("p3", "exec").expect("box").align,
            Align::Center
        );
    }

    #[test]
    fn merges_never_observe_each_other() {
        let base = PageLayout::base();
        let first = merge_layout(
            &base,
            None,
            vec![("layout_p3_exec_x".to_string(), "111".to_string())],
        );
        let second = merge_layout(
            &base,
            None,
            vec![("layout_p3_exec_y".to_string(), "222".to_string())],
        );
        assert_eq!(first.layout.get("p3", "exec").expect("box").x, 111.0);
        let exec = second.layout.get("p3", "exec").expect("box");
        assert_eq!(
            exec.x,
            base.get("p3", "exec").expect("box").x,
            "first merge leaked into the second"
        );
        assert_eq!(exec.y, 222.0);
        assert_eq!(base, PageLayout::base(), "base itself must stay pristine");
    }
}
