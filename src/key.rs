//! Entity keys identifying one historical series and its cached model

use std::fmt;

/// Composite identifier for the series a model was trained on.
///
/// Keys appear verbatim in user-facing messages but never in file paths;
/// [`EntityKey::file_stem`] produces the sanitized artifact stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    /// A country or geographic grouping in the by-region export table
    Region { region: String },
    /// A car model plus transaction/segment code in the by-car sales table
    Car { model: String, segment: String },
    /// A plant, car model and transaction/segment code in the by-plant table
    Plant {
        plant: String,
        model: String,
        segment: String,
    },
}

impl EntityKey {
    pub fn region(region: impl Into<String>) -> Self {
        EntityKey::Region {
            region: region.into(),
        }
    }

    pub fn car(model: impl Into<String>, segment: impl Into<String>) -> Self {
        EntityKey::Car {
            model: model.into(),
            segment: segment.into(),
        }
    }

    pub fn plant(
        plant: impl Into<String>,
        model: impl Into<String>,
        segment: impl Into<String>,
    ) -> Self {
        EntityKey::Plant {
            plant: plant.into(),
            model: model.into(),
            segment: segment.into(),
        }
    }

    /// Short tag used in artifact names, one per key variant
    pub fn kind(&self) -> &'static str {
        match self {
            EntityKey::Region { .. } => "region",
            EntityKey::Car { .. } => "car",
            EntityKey::Plant { .. } => "plant",
        }
    }

    /// Key components in their fixed order
    pub fn components(&self) -> Vec<&str> {
        match self {
            EntityKey::Region { region } => vec![region],
            EntityKey::Car { model, segment } => vec![model, segment],
            EntityKey::Plant {
                plant,
                model,
                segment,
            } => vec![plant, model, segment],
        }
    }

    /// Human-readable label, components joined with `-`
    pub fn label(&self) -> String {
        self.components().join("-")
    }

    /// Filesystem-safe artifact stem: `lstm_<kind>_<sanitized>_<hash>`.
    ///
    /// Raw components are interpolated through an allow-list so names
    /// containing separators or other unsafe characters cannot escape the
    /// models directory; the hash of the raw label keeps distinct keys
    /// distinct even when sanitization folds them together.
    pub fn file_stem(&self) -> String {
        let label = self.label();
        let sanitized: String = label
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
                _ => '_',
            })
            .collect();
        format!("lstm_{}_{}_{:08x}", self.kind(), sanitized, fnv1a(&label))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.label())
    }
}

/// 32-bit FNV-1a over the raw label bytes
fn fnv1a(s: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in s.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}
