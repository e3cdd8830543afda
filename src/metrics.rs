use crate::types::Pt;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Rendered-width oracle for the box renderer. Implementations must be pure:
/// the same text at the same size always measures the same width.
pub trait TextMeasurer: Send + Sync {
    fn text_width(&self, font_size: Pt, text: &str) -> Pt;
}

/// Width table used when no font program is registered: 0.6 em per glyph,
/// floored at one point. Matches Helvetica closely enough for wrap decisions
/// against generously sized boxes.
#[derive(Debug, Default)]
pub struct HeuristicMetrics;

impl TextMeasurer for HeuristicMetrics {
    fn text_width(&self, font_size: Pt, text: &str) -> Pt {
        let char_width = (font_size * 0.6).max(Pt::from_f32(1.0));
        char_width * (text.chars().count() as i32)
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct WidthKey {
    size_milli: i64,
    text: String,
}

#[derive(Debug)]
struct WidthCache {
    map: HashMap<WidthKey, Pt>,
    order: VecDeque<WidthKey>,
    max_entries: usize,
}

impl WidthCache {
    fn new(max_entries: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn get(&self, key: &WidthKey) -> Option<Pt> {
        self.map.get(key).copied()
    }

    fn insert(&mut self, key: WidthKey, value: Pt) {
        if self.map.contains_key(&key) {
            return;
        }
        self.map.insert(key.clone(), value);
        self.order.push_back(key);
        while self.map.len() > self.max_entries {
            if let Some(old) = self.order.pop_front() {
                self.map.remove(&old);
            } else {
                break;
            }
        }
    }
}

/// Measures via horizontal advances of a parsed font face. Whole strings are
/// cached because the wrapper re-measures accumulated line prefixes.
pub struct FaceMetrics {
    data: Vec<u8>,
    units_per_em: u16,
    missing_advance: u16,
    cache: Mutex<WidthCache>,
}

impl FaceMetrics {
    pub fn from_bytes(data: Vec<u8>) -> Option<Self> {
        let face = ttf_parser::Face::parse(&data, 0).ok()?;
        let units_per_em = face.units_per_em();
        if units_per_em == 0 {
            return None;
        }
        // Advance of the missing glyph, for characters outside the cmap.
        let missing_advance = face
            .glyph_hor_advance(ttf_parser::GlyphId(0))
            .unwrap_or(units_per_em / 2);
        Some(Self {
            data,
            units_per_em,
            missing_advance,
            cache: Mutex::new(WidthCache::new(20_000)),
        })
    }

    fn advance_units(&self, text: &str) -> u64 {
        let Ok(face) = ttf_parser::Face::parse(&self.data, 0) else {
            return 0;
        };
        let mut total: u64 = 0;
        for ch in text.chars() {
            let advance = face
                .glyph_index(ch)
                .and_then(|gid| face.glyph_hor_advance(gid))
                .unwrap_or(self.missing_advance);
            total += advance as u64;
        }
        total
    }
}

impl TextMeasurer for FaceMetrics {
    fn text_width(&self, font_size: Pt, text: &str) -> Pt {
        let key = WidthKey {
            size_milli: font_size.to_milli_i64(),
            text: text.to_string(),
        };
        if let Ok(cache) = self.cache.lock() {
            if let Some(value) = cache.get(&key) {
                return value;
            }
        }
        let units = self.advance_units(text);
        let width = font_size * (units as f32 / self.units_per_em as f32);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, width);
        }
        width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_scales_with_char_count_and_size() {
        let metrics = HeuristicMetrics;
        let size = Pt::from_f32(10.0);
        let one = metrics.text_width(size, "a");
        let five = metrics.text_width(size, "abcde");
        assert_eq!(one.to_milli_i64(), 6_000);
        assert_eq!(five.to_milli_i64(), 30_000);
    }

    #[test]
    fn heuristic_counts_chars_not_bytes() {
        let metrics = HeuristicMetrics;
        let size = Pt::from_f32(10.0);
        assert_eq!(
            metrics.text_width(size, "éé"),
            metrics.text_width(size, "ab")
        );
    }

    #[test]
    fn heuristic_empty_text_is_zero_width() {
        let metrics = HeuristicMetrics;
        assert_eq!(metrics.text_width(Pt::from_f32(18.0), ""), Pt::ZERO);
    }

    #[test]
    fn width_cache_evicts_oldest_entry() {
        let mut cache = WidthCache::new(2);
        let key = |text: &str| WidthKey {
            size_milli: 18_000,
            text: text.to_string(),
        };
        cache.insert(key("a"), Pt::from_f32(1.0));
        cache.insert(key("b"), Pt::from_f32(2.0));
        cache.insert(key("c"), Pt::from_f32(3.0));
        assert!(cache.get(&key("a")).is_none());
        assert!(cache.get(&key("b")).is_some());
        assert!(cache.get(&key("c")).is_some());
    }

    #[test]
    fn face_metrics_rejects_garbage_font_data() {
        assert!(FaceMetrics::from_bytes(vec![0, 1, 2, 3]).is_none());
    }
}
