use std::fs;
use std::path::Path;

use ratatui::style::Color;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub(crate) struct Theme {
    pub(crate) name: String,
    pub(crate) bg: Color,
    pub(crate) bg_alt: Color,
    pub(crate) fg: Color,
    pub(crate) fg_muted: Color,
    pub(crate) border: Color,
    pub(crate) accent: Color,
    pub(crate) accent_secondary: Color,
    pub(crate) selection: Color,
    pub(crate) folder: Color,
    pub(crate) separator: Color,
    pub(crate) matched: Color,
    pub(crate) drop_indicator: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            bg: Color::Rgb(20, 22, 31),
            bg_alt: Color::Rgb(25, 28, 39),
            fg: Color::Rgb(215, 213, 189),
            fg_muted: Color::Rgb(100, 100, 120),
            border: Color::Rgb(127, 122, 88),
            accent: Color::Rgb(206, 198, 130),
            accent_secondary: Color::Rgb(86, 156, 214),
            selection: Color::Rgb(51, 70, 124),
            folder: Color::Rgb(206, 198, 130),
            separator: Color::Rgb(100, 100, 120),
            matched: Color::Rgb(210, 168, 75),
            drop_indicator: Color::Rgb(78, 201, 176),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ThemeFile {
    pub(crate) name: String,
    pub(crate) colors: ThemeColors,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ThemeColors {
    pub(crate) background: String,
    #[serde(rename = "backgroundAlt")]
    pub(crate) background_alt: String,
    pub(crate) foreground: String,
    #[serde(rename = "foregroundMuted")]
    pub(crate) foreground_muted: String,
    pub(crate) border: String,
    pub(crate) accent: String,
    #[serde(default, rename = "accentSecondary")]
    pub(crate) accent_secondary: Option<String>,
    pub(crate) selection: String,
    #[serde(default)]
    pub(crate) folder: Option<String>,
    #[serde(default)]
    pub(crate) separator: Option<String>,
    #[serde(default, rename = "match")]
    pub(crate) matched: Option<String>,
    #[serde(default, rename = "dropIndicator")]
    pub(crate) drop_indicator: Option<String>,
}

pub(crate) fn color_from_hex(input: &str, fallback: Color) -> Color {
    let s = input.trim();
    if let Some(stripped) = s.strip_prefix('#')
        && stripped.len() == 6
    {
        let r = u8::from_str_radix(&stripped[0..2], 16).ok();
        let g = u8::from_str_radix(&stripped[2..4], 16).ok();
        let b = u8::from_str_radix(&stripped[4..6], 16).ok();
        if let (Some(r), Some(g), Some(b)) = (r, g, b) {
            return Color::Rgb(r, g, b);
        }
    }
    fallback
}

fn optional_color(value: Option<&String>, fallback: Color) -> Color {
    value.map_or(fallback, |c| color_from_hex(c, fallback))
}

pub(crate) fn theme_from_file(tf: ThemeFile) -> Theme {
    let base = Theme::default();
    let c = &tf.colors;
    let fg_muted = color_from_hex(&c.foreground_muted, base.fg_muted);
    let accent = color_from_hex(&c.accent, base.accent);
    Theme {
        name: tf.name.clone(),
        bg: color_from_hex(&c.background, base.bg),
        bg_alt: color_from_hex(&c.background_alt, base.bg_alt),
        fg: color_from_hex(&c.foreground, base.fg),
        fg_muted,
        border: color_from_hex(&c.border, base.border),
        accent,
        accent_secondary: optional_color(c.accent_secondary.as_ref(), base.accent_secondary),
        selection: color_from_hex(&c.selection, base.selection),
        folder: optional_color(c.folder.as_ref(), accent),
        separator: optional_color(c.separator.as_ref(), fg_muted),
        matched: optional_color(c.matched.as_ref(), base.matched),
        drop_indicator: optional_color(c.drop_indicator.as_ref(), base.drop_indicator),
    }
}

/// Reads a theme file, falling back to the built-in palette when it is missing or invalid.
pub(crate) fn load_theme(path: &Path) -> Theme {
    let Ok(raw) = fs::read_to_string(path) else {
        return Theme::default();
    };
    match serde_json::from_str::<ThemeFile>(&raw) {
        Ok(tf) => {
            let theme = theme_from_file(tf);
            tracing::info!(name = %theme.name, "theme loaded");
            theme
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "ignoring invalid theme file");
            Theme::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r##"{"name":"Night","colors":{"background":"#1a1b26","backgroundAlt":"#16161e","foreground":"#a9b1d6","foregroundMuted":"#565f89","border":"#414868","accent":"#7aa2f7","selection":"#364a82","match":"#ff9e64"}}"##;

    #[test]
    fn theme_file_converts_and_derives_optional_colors() {
        let tf: ThemeFile = serde_json::from_str(FULL).unwrap();
        let theme = theme_from_file(tf);
        assert_eq!(theme.name, "Night");
        assert_eq!(theme.bg, Color::Rgb(26, 27, 38));
        assert_eq!(theme.matched, Color::Rgb(255, 158, 100));
        assert_eq!(theme.folder, theme.accent);
        assert_eq!(theme.separator, Color::Rgb(86, 95, 137));
    }

    #[test]
    fn invalid_colors_fall_back() {
        let json = r##"{"name":"Broken","colors":{"background":"nope","backgroundAlt":"#12","foreground":"#zzzzzz","foregroundMuted":"#000000","border":"","accent":"x","selection":"#ffffff"}}"##;
        let theme = theme_from_file(serde_json::from_str(json).unwrap());
        let base = Theme::default();
        assert_eq!(theme.bg, base.bg);
        assert_eq!(theme.fg, base.fg);
        assert_eq!(theme.selection, Color::Rgb(255, 255, 255));
    }

    #[test]
    fn missing_required_color_is_rejected() {
        let json = r##"{"name":"Partial","colors":{"background":"#1a1b26"}}"##;
        assert!(serde_json::from_str::<ThemeFile>(json).is_err());
    }

    #[test]
    fn load_theme_reads_file_or_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("theme.json");
        assert_eq!(load_theme(&path).name, "Default");
        fs::write(&path, FULL).unwrap();
        assert_eq!(load_theme(&path).name, "Night");
        fs::write(&path, "{").unwrap();
        assert_eq!(load_theme(&path).name, "Default");
    }
}
