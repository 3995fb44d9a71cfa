//! Node colors.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use super::model::{Label, Properties};
use crate::config::DEFAULT_PALETTE;

/// Property the palette writes.
pub const COLOR_PROPERTY: &str = "color";

/// Immutable label-to-color table handed to the graph facade.
///
/// A configured `[palette]` table overrides individual labels; the rest keep
/// their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Palette {
    colors: BTreeMap<String, String>,
}

impl Palette {
    pub fn new(colors: BTreeMap<String, String>) -> Self {
        Self { colors }
    }

    pub fn color(&self, label: Label) -> Option<&str> {
        self.colors.get(label.as_str()).map(String::as_str)
    }

    /// Stamp the label's color onto `properties` unless one is already set.
    pub fn apply(&self, label: Label, properties: &mut Properties) {
        if let Some(color) = self.color(label) {
            properties
                .entry(COLOR_PROPERTY.to_string())
                .or_insert_with(|| color.to_string());
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::new(
            DEFAULT_PALETTE
                .iter()
                .map(|(label, color)| (label.to_string(), color.to_string()))
                .collect(),
        )
    }
}

impl<'de> Deserialize<'de> for Palette {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let overrides = BTreeMap::<String, String>::deserialize(deserializer)?;
        let mut palette = Palette::default();
        palette.colors.extend(overrides);
        Ok(palette)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let palette = Palette::default();
        assert_eq!(palette.color(Label::Root), Some("orange"));
        assert_eq!(palette.color(Label::Collection), Some("#8A2BE2"));
    }

    #[test]
    fn test_partial_override_from_toml() {
        let palette: Palette = toml::from_str("Root = \"red\"").unwrap();
        assert_eq!(palette.color(Label::Root), Some("red"));
        assert_eq!(palette.color(Label::Class), Some("#4287f5"));
    }

    #[test]
    fn test_apply_keeps_explicit_color() {
        let palette = Palette::default();
        let mut props = Properties::new();
        props.insert(COLOR_PROPERTY.to_string(), "black".to_string());
        palette.apply(Label::Struct, &mut props);
        assert_eq!(props[COLOR_PROPERTY], "black");
    }
}
