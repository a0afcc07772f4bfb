//! Marker colour by accessibility status.

pub const OPERATIONAL: &str = "#28a745";
pub const DIFFICULT: &str = "#ffc107";
pub const INACCESSIBLE: &str = "#dc3545";
pub const INFERRED: &str = "#6c757d";
pub const DEFAULT_COLOR: &str = "#808080";

/// Checked top to bottom; the first rule with a matching keyword wins.
const RULES: &[(&[&str], &str)] = &[
    (&["OPERATIVO"], OPERATIONAL),
    (&["DIFICULTAD"], DIFFICULT),
    (&["NO ACCESIBLE", "INACCESIBLE"], INACCESSIBLE),
    (&["INFERIDO"], INFERRED),
];

#[derive(Debug, Clone)]
pub struct StyleClassifier {
    default_color: String,
}

impl Default for StyleClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_COLOR)
    }
}

impl StyleClassifier {
    pub fn new(default_color: impl Into<String>) -> Self {
        Self {
            default_color: default_color.into(),
        }
    }

    pub fn color(&self, status: Option<&str>) -> &str {
        let Some(status) = status.map(str::to_uppercase) else {
            return &self.default_color;
        };
        RULES
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| status.contains(k)))
            .map(|(_, color)| *color)
            .unwrap_or(self.default_color.as_str())
    }
}
