use crate::chart::BandValueSet;
use crate::error::OverprintError;
use crate::state::{Category, CategoryScores};
use crate::template::TemplateKey;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use serde_json::Value;
use std::collections::BTreeMap;

/// Subject identity lifted from the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub full_name: String,
    pub email: String,
    pub date_label: String,
}

/// The normalized export payload. Every incoming alias spelling has been
/// collapsed into one field here, so nothing downstream ever re-reads the raw
/// JSON except the structured layout override, which is kept verbatim.
#[derive(Debug, Clone, Default)]
pub struct ReportPayload {
    pub identity: Identity,
    pub dominant: Option<Category>,
    pub second: Option<Category>,
    pub template_key: Option<TemplateKey>,
    pub bands: BandValueSet,
    pub totals: Option<CategoryScores>,
    pub text: BTreeMap<String, String>,
    pub work_with: BTreeMap<String, String>,
    pub layout_override: Option<Value>,
}

impl ReportPayload {
    pub fn text_value(&self, key: &str) -> &str {
        self.text.get(key).map(String::as_str).unwrap_or("")
    }

    /// Work-with copy for a category, matching the key by state resolution so
    /// `concealed`, `Concealed` and even `C` all land on the same column.
    pub fn work_with_value(&self, category: Category) -> &str {
        self.work_with
            .iter()
            .find(|(key, _)| Category::resolve(key) == Some(category))
            .map(|(_, value)| value.as_str())
            .unwrap_or("")
    }

    /// Per-category scores used for second-category selection: explicit totals
    /// when the payload carried them, otherwise band sums.
    pub fn category_scores(&self) -> CategoryScores {
        self.totals.unwrap_or_else(|| self.bands.scores())
    }
}

/// Decodes the base64url `data` query parameter into a JSON value. Plain
/// (padded, `+/`) base64 is accepted as a fallback since some callers send it.
pub fn decode_data_param(raw: &str) -> Result<Value, OverprintError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(OverprintError::Payload("empty data parameter".to_string()));
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed.trim_end_matches('='))
        .or_else(|_| STANDARD.decode(trimmed))
        .map_err(|e| OverprintError::Payload(format!("data parameter is not base64: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| OverprintError::Payload(format!("data parameter is not JSON: {e}")))
}

fn get_path<'a>(value: &'a Value, dotted: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in dotted.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// First path whose value stringifies to something non-blank.
fn pick_first_path(value: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| get_path(value, path))
        .filter_map(value_to_text)
        .find(|text| !text.trim().is_empty())
}

fn pick_first_object<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths
        .iter()
        .filter_map(|path| get_path(value, path))
        .find(|v| v.is_object())
}

const IDENTITY_PATHS: &[&str] = &[
    "identity",
    "ctrl.summary.identity",
    "ctrl.identity",
    "summary.identity",
];

const DOMINANT_PATHS: &[&str] = &[
    "ctrl.summary.dominantKey",
    "ctrl.summary.domKey",
    "ctrl.summary.dominantState",
    "ctrl.summary.domState",
    "ctrl.dominantKey",
    "ctrl.domKey",
    "summary.dominantKey",
    "summary.domKey",
    "domSecond.domKey",
    "dominantKey",
    "domKey",
    "dominantState",
    "domState",
];

const SECOND_PATHS: &[&str] = &[
    "ctrl.summary.secondKey",
    "ctrl.summary.secondState",
    "ctrl.secondKey",
    "summary.secondKey",
    "domSecond.secondKey",
    "secondKey",
    "secondState",
];

const TEMPLATE_PATHS: &[&str] = &[
    "ctrl.summary.templateKey",
    "ctrl.templateKey",
    "summary.templateKey",
    "domSecond.templateKey",
    "templateKey",
    "tplKey",
];

const BAND_PATHS: &[&str] = &["ctrl.bands", "bands", "ctrl12"];
const TOTAL_PATHS: &[&str] = &["ctrl.totals", "totals"];
const TEXT_PATHS: &[&str] = &["text", "gen", "copy"];
const WORK_WITH_PATHS: &[&str] = &["workWith", "workwith", "work_with"];

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if let Some(Value::Object(object)) = value {
        for (key, entry) in object {
            if let Some(text) = value_to_text(entry) {
                map.insert(key.clone(), text);
            }
        }
    }
    map
}

fn totals_from_json(value: &Value) -> Option<CategoryScores> {
    let object = value.as_object()?;
    let mut scores = CategoryScores::default();
    let mut any = false;
    for (key, entry) in object {
        let Some(category) = Category::resolve(key) else {
            continue;
        };
        let number = match entry {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        if let Some(number) = number {
            scores.add(category, number);
            any = true;
        }
    }
    any.then_some(scores)
}

/// Collapses the raw payload into a [`ReportPayload`], tolerating every alias
/// spelling the export pipeline has historically produced. Never fails: absent
/// or unusable fields come back empty and the caller degrades from there.
pub fn normalize_payload(raw: &Value) -> ReportPayload {
    let identity_obj = pick_first_object(raw, IDENTITY_PATHS);
    let identity = Identity {
        full_name: identity_obj
            .and_then(|o| pick_first_path(o, &["fullName", "FullName", "name", "Name"]))
            .unwrap_or_default(),
        email: identity_obj
            .and_then(|o| pick_first_path(o, &["email", "Email"]))
            .unwrap_or_default(),
        date_label: identity_obj
            .and_then(|o| pick_first_path(o, &["dateLabel", "dateLbl", "date", "Date"]))
            .or_else(|| pick_first_path(raw, &["dateLbl"]))
            .unwrap_or_default(),
    };

    let mut dominant =
        pick_first_path(raw, DOMINANT_PATHS).and_then(|text| Category::resolve(&text));
    let mut second = pick_first_path(raw, SECOND_PATHS).and_then(|text| Category::resolve(&text));
    let mut template_key =
        pick_first_path(raw, TEMPLATE_PATHS).and_then(|text| TemplateKey::parse(&text));

    // Mutual repair: a key fills in missing categories, and a complete
    // category pair rebuilds a missing key.
    if let Some(key) = template_key {
        dominant = dominant.or(Some(key.dominant()));
        second = second.or(Some(key.second()));
    } else if let (Some(d), Some(s)) = (dominant, second) {
        template_key = TemplateKey::new(d, s);
    }

    let bands = pick_first_object(raw, BAND_PATHS)
        .map(BandValueSet::from_json)
        .unwrap_or_default();
    let totals = pick_first_object(raw, TOTAL_PATHS).and_then(totals_from_json);

    ReportPayload {
        identity,
        dominant,
        second,
        template_key,
        bands,
        totals,
        text: string_map(pick_first_object(raw, TEXT_PATHS)),
        work_with: string_map(pick_first_object(raw, WORK_WITH_PATHS)),
        layout_override: raw.get("layout").filter(|v| v.is_object()).cloned(),
    }
}
