use crate::state::{Category, CategoryScores};
use serde::Serialize;
use serde_json::Value;
use url::Url;

/// External rendering endpoint. The chart arrives as one URL-encoded JSON
/// configuration in the `c` query parameter.
pub const CHART_ENDPOINT: &str = "https://quickchart.io/chart";
pub const CHART_PIXELS: u32 = 500;

/// Full-scale divisor for the directional eight-spoke variant, which uses a
/// fixed scale instead of the set's own maximum.
pub const EIGHT_SPOKE_SCALE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Low,
    Mid,
    High,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Low, Tier::Mid, Tier::High];

    fn suffix(self) -> &'static str {
        match self {
            Tier::Low => "low",
            Tier::Mid => "mid",
            Tier::High => "high",
        }
    }

    fn index(self) -> usize {
        match self {
            Tier::Low => 0,
            Tier::Mid => 1,
            Tier::High => 2,
        }
    }
}

/// The twelve named band values (four categories x three sub-tiers).
/// Entries the payload never supplied stay zero. Values are clamped at zero
/// on ingest; band masses are non-negative and a negative stray must not
/// poison the normalization divisors.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandValueSet {
    values: [f64; 12],
}

impl BandValueSet {
    pub fn set(&mut self, category: Category, tier: Tier, value: f64) {
        if value.is_finite() {
            self.values[Self::slot(category, tier)] = value.max(0.0);
        }
    }

    pub fn get(&self, category: Category, tier: Tier) -> f64 {
        self.values[Self::slot(category, tier)]
    }

    fn slot(category: Category, tier: Tier) -> usize {
        let category_index = Category::ALL
            .iter()
            .position(|c| *c == category)
            .unwrap_or(0);
        category_index * 3 + tier.index()
    }

    /// Band key as the payload spells it: `C_low`, `T_high`, ...
    pub fn key(category: Category, tier: Tier) -> String {
        format!("{}_{}", category.letter(), tier.suffix())
    }

    pub fn from_json(value: &Value) -> BandValueSet {
        let mut bands = BandValueSet::default();
        let Value::Object(map) = value else {
            return bands;
        };
        for category in Category::ALL {
            for tier in Tier::ALL {
                if let Some(raw) = map.get(&Self::key(category, tier)) {
                    let number = match raw {
                        Value::Number(n) => n.as_f64(),
                        Value::String(s) => s.trim().parse::<f64>().ok(),
                        _ => None,
                    };
                    if let Some(number) = number {
                        bands.set(category, tier, number);
                    }
                }
            }
        }
        bands
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    pub fn category_total(&self, category: Category) -> f64 {
        Tier::ALL
            .iter()
            .map(|tier| self.get(category, *tier))
            .sum()
    }

    /// Category scores derived from the bands, for the second-category
    /// tie-break when the payload has no explicit totals.
    pub fn scores(&self) -> CategoryScores {
        let mut scores = CategoryScores::default();
        for category in Category::ALL {
            scores.add(category, self.category_total(category));
        }
        scores
    }
}

/// The two chart layouts: the plain twelve-axis radar, and the directional
/// variant that folds each category's sub-tiers onto category and transition
/// axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartShape {
    TwelveSpoke,
    EightSpokeDirectional,
}

#[derive(Debug, Serialize)]
struct ChartConfig {
    #[serde(rename = "type")]
    chart_type: &'static str,
    data: ChartData,
    options: ChartOptions,
}

#[derive(Debug, Serialize)]
struct ChartData {
    labels: Vec<String>,
    datasets: Vec<ChartDataset>,
}

#[derive(Debug, Serialize)]
struct ChartDataset {
    data: Vec<f64>,
    fill: bool,
    #[serde(rename = "backgroundColor")]
    background_color: &'static str,
    #[serde(rename = "borderColor")]
    border_color: &'static str,
    #[serde(rename = "borderWidth")]
    border_width: u32,
    #[serde(rename = "pointRadius")]
    point_radius: u32,
    #[serde(rename = "pointBackgroundColor")]
    point_background_color: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct ChartOptions {
    legend: LegendOptions,
    scale: ScaleOptions,
}

#[derive(Debug, Serialize)]
struct LegendOptions {
    display: bool,
}

#[derive(Debug, Serialize)]
struct ScaleOptions {
    ticks: TickOptions,
}

#[derive(Debug, Serialize)]
struct TickOptions {
    min: f64,
    max: f64,
    display: bool,
}

fn category_color(category: Category) -> &'static str {
    match category {
        Category::Concealed => "#8e9bac",
        Category::Triggered => "#e2574c",
        Category::Regulated => "#4ca66b",
        Category::Lead => "#3c7dd9",
    }
}

/// Builds the chart request URL, or `None` when there is nothing to chart
/// (every band zero). The URL never fails to build for non-zero input.
pub fn build_chart_url(bands: &BandValueSet, shape: ChartShape) -> Option<String> {
    if bands.is_zero() {
        return None;
    }
    let (labels, data, point_colors) = match shape {
        ChartShape::TwelveSpoke => twelve_spoke(bands),
        ChartShape::EightSpokeDirectional => eight_spoke(bands),
    };

    let config = ChartConfig {
        chart_type: "radar",
        data: ChartData {
            labels,
            datasets: vec![ChartDataset {
                data: data.into_iter().map(round4).collect(),
                fill: true,
                background_color: "rgba(60,125,217,0.25)",
                border_color: "#3c7dd9",
                border_width: 1,
                point_radius: 2,
                point_background_color: point_colors,
            }],
        },
        options: ChartOptions {
            legend: LegendOptions { display: false },
            scale: ScaleOptions {
                ticks: TickOptions {
                    min: 0.0,
                    max: 1.0,
                    display: false,
                },
            },
        },
    };
    let encoded = serde_json::to_string(&config).ok()?;

    let mut endpoint = Url::parse(CHART_ENDPOINT).ok()?;
    endpoint
        .query_pairs_mut()
        .append_pair("c", &encoded)
        .append_pair("w", &CHART_PIXELS.to_string())
        .append_pair("h", &CHART_PIXELS.to_string())
        .append_pair("format", "png")
        .append_pair("backgroundColor", "transparent");
    Some(endpoint.into())
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn twelve_spoke(bands: &BandValueSet) -> (Vec<String>, Vec<f64>, Vec<&'static str>) {
    let max = bands.max();
    let mut labels = Vec::with_capacity(12);
    let mut data = Vec::with_capacity(12);
    let mut colors = Vec::with_capacity(12);
    for category in Category::ALL {
        for tier in Tier::ALL {
            labels.push(BandValueSet::key(category, tier));
            data.push(bands.get(category, tier) / max);
            colors.push(category_color(category));
        }
    }
    (labels, data, colors)
}

/// Directional axes in circle order: each category followed by its outgoing
/// transition. A category's own axis carries the `mid` tier, the incoming
/// transition carries `low`, the outgoing transition carries `high`.
fn eight_spoke(bands: &BandValueSet) -> (Vec<String>, Vec<f64>, Vec<&'static str>) {
    let labels: Vec<String> = vec![
        "C".into(),
        "C\u{2192}T".into(),
        "T".into(),
        "T\u{2192}R".into(),
        "R".into(),
        "R\u{2192}L".into(),
        "L".into(),
        "L\u{2192}C".into(),
    ];
    let mut axes = [0.0f64; 8];

    for (category_index, category) in Category::ALL.into_iter().enumerate() {
        let own_axis = category_index * 2;
        let outgoing = (own_axis + 1) % 8;
        let incoming = (own_axis + 7) % 8;
        let tier_axes = [incoming, own_axis, outgoing];

        let values = [
            bands.get(category, Tier::Low),
            bands.get(category, Tier::Mid),
            bands.get(category, Tier::High),
        ];
        let mass: f64 = values.iter().sum();
        if mass == 0.0 {
            continue;
        }
        // Max/tie rule: the winning sub-tier carries the category's whole
        // mass; tied sub-tiers split it evenly across their mapped axes.
        let top = values.iter().copied().fold(f64::MIN, f64::max);
        let winners: Vec<usize> = (0..3).filter(|i| values[*i] == top).collect();
        let share = mass / winners.len() as f64;
        for winner in winners {
            axes[tier_axes[winner]] += share;
        }
    }

    let data: Vec<f64> = axes
        .iter()
        .map(|v| (v / EIGHT_SPOKE_SCALE).clamp(0.0, 1.0))
        .collect();
    let colors: Vec<&'static str> = Category::ALL
        .into_iter()
        .flat_map(|c| [category_color(c), category_color(c)])
        .collect();
    (labels, data, colors)
}
