//! Deterministic local stand-ins for unreachable remote seeds

use craft_element::{ImagePayload, MediaType};

/// A flat coloured tile with a centred label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    pub label: &'static str,
    pub fill: &'static str,
    pub text: &'static str,
}

/// Placeholders in slot order
pub const PLACEHOLDERS: [Placeholder; 4] = [
    Placeholder { label: "Fire", fill: "#ff6666", text: "#fff" },
    Placeholder { label: "Water", fill: "#66b3ff", text: "#fff" },
    Placeholder { label: "Earth", fill: "#8cd466", text: "#fff" },
    Placeholder { label: "Air", fill: "#ffdd66", text: "#333" },
];

impl Placeholder {
    /// Placeholder for seed slot `slot`
    #[must_use]
    pub fn for_slot(slot: usize) -> Self {
        PLACEHOLDERS[slot % PLACEHOLDERS.len()]
    }

    #[must_use]
    pub fn svg(&self) -> String {
        format!(
            r#"<svg width="200" height="200" xmlns="http://www.w3.org/2000/svg"><rect width="100%" height="100%" fill="{}"/><text x="50%" y="50%" font-family="Arial" font-size="14" fill="{}" text-anchor="middle" dy=".3em">{}</text></svg>"#,
            self.fill, self.text, self.label
        )
    }

    #[must_use]
    pub fn image(&self) -> ImagePayload {
        ImagePayload::new(self.svg().into_bytes(), MediaType::svg())
    }
}
