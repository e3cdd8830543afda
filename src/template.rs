use crate::error::OverprintError;
use crate::state::Category;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Two-letter template variant identifier: ordered dominant/second pair of
/// distinct categories. Twelve values exist; nothing outside that set can be
/// constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TemplateKey {
    dominant: Category,
    second: Category,
}

impl TemplateKey {
    /// Identifier used when nothing about the subject resolved at all.
    pub const DEFAULT: TemplateKey = TemplateKey {
        dominant: Category::Concealed,
        second: Category::Triggered,
    };

    pub fn new(dominant: Category, second: Category) -> Option<TemplateKey> {
        if dominant == second {
            return None;
        }
        Some(TemplateKey { dominant, second })
    }

    /// Maps a resolved dominant/second pair to a legal identifier, degrading
    /// instead of failing: a missing or degenerate second is replaced by the
    /// first category in C, T, R, L order that differs from the dominant, and
    /// a missing dominant yields [`TemplateKey::DEFAULT`].
    pub fn map(dominant: Option<Category>, second: Option<Category>) -> TemplateKey {
        let Some(dominant) = dominant else {
            return TemplateKey::DEFAULT;
        };
        let second = match second {
            Some(second) if second != dominant => second,
            _ => alternate_for(dominant),
        };
        TemplateKey { dominant, second }
    }

    /// Parses a raw identifier the way the export payload supplies it:
    /// non-letters stripped, first two letters taken, membership in the
    /// twelve-key set required.
    pub fn parse(raw: &str) -> Option<TemplateKey> {
        let cleaned: String = raw
            .trim()
            .to_uppercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        let mut chars = cleaned.chars();
        let dominant = Category::from_letter(chars.next()?)?;
        let second = Category::from_letter(chars.next()?)?;
        TemplateKey::new(dominant, second)
    }

    pub fn dominant(self) -> Category {
        self.dominant
    }

    pub fn second(self) -> Category {
        self.second
    }

    pub fn all() -> impl Iterator<Item = TemplateKey> {
        Category::ALL.into_iter().flat_map(|dominant| {
            Category::ALL
                .into_iter()
                .filter_map(move |second| TemplateKey::new(dominant, second))
        })
    }

    /// Resource filename convention used by the template catalog.
    pub fn filename(self) -> String {
        format!("template_{}.pdf", self)
    }
}

impl std::fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.dominant.letter(), self.second.letter())
    }
}

fn alternate_for(dominant: Category) -> Category {
    for category in Category::ALL {
        if category != dominant {
            return category;
        }
    }
    Category::Triggered
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateAsset {
    pub key: TemplateKey,
    pub pdf_path: PathBuf,
    /// Lowercase hex digest; verified against the file when present.
    pub sha256: Option<String>,
    pub page_count: Option<usize>,
}

/// The set of template variant PDFs the assembler may stamp onto.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    by_key: BTreeMap<TemplateKey, TemplateAsset>,
}

impl TemplateCatalog {
    /// Catalog following the `template_<KEY>.pdf` convention under one
    /// directory, one entry per legal key. Paths are not checked here; a
    /// missing file surfaces when the variant is actually requested.
    pub fn from_dir(dir: impl AsRef<Path>) -> TemplateCatalog {
        let dir = dir.as_ref();
        let mut catalog = TemplateCatalog::default();
        for key in TemplateKey::all() {
            let asset = TemplateAsset {
                key,
                pdf_path: dir.join(key.filename()),
                sha256: None,
                page_count: None,
            };
            catalog.by_key.insert(key, asset);
        }
        catalog
    }

    pub fn insert(&mut self, asset: TemplateAsset) -> Result<(), OverprintError> {
        if self.by_key.contains_key(&asset.key) {
            return Err(OverprintError::InvalidConfiguration(format!(
                "duplicate template key in catalog: {}",
                asset.key
            )));
        }
        self.by_key.insert(asset.key, asset);
        Ok(())
    }

    pub fn get(&self, key: TemplateKey) -> Option<&TemplateAsset> {
        self.by_key.get(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Reads the asset's PDF bytes, enforcing the recorded sha256 when one
    /// is present.
    pub fn read_verified(&self, key: TemplateKey) -> Result<Vec<u8>, OverprintError> {
        let Some(asset) = self.get(key) else {
            return Err(OverprintError::Template(format!(
                "no template asset for key {}",
                key
            )));
        };
        let bytes = std::fs::read(&asset.pdf_path).map_err(|err| {
            OverprintError::Template(format!(
                "cannot read template {}: {}",
                asset.pdf_path.display(),
                err
            ))
        })?;
        if let Some(expected) = asset.sha256.as_deref() {
            let digest = Sha256::digest(&bytes);
            let actual: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(OverprintError::Template(format!(
                    "sha256 mismatch for template {}: expected {} found {}",
                    key, expected, actual
                )));
            }
        }
        Ok(bytes)
    }
}
