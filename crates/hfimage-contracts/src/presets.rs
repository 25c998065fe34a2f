#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePreset {
    pub key: &'static str,
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
}

pub const SIZE_PRESETS: &[SizePreset] = &[
    SizePreset {
        key: "square",
        name: "Square (768×768)",
        width: 768,
        height: 768,
    },
    SizePreset {
        key: "portrait",
        name: "Portrait (512×768)",
        width: 512,
        height: 768,
    },
    SizePreset {
        key: "landscape",
        name: "Landscape (768×512)",
        width: 768,
        height: 512,
    },
    SizePreset {
        key: "small-square",
        name: "Small Square (512×512)",
        width: 512,
        height: 512,
    },
];

pub const CUSTOM_SIZE_LABEL: &str = "Custom Size";

/// Accepts the short key (`portrait`) or the display name.
pub fn preset_by_name(name: &str) -> Option<SizePreset> {
    let wanted = name.trim().to_ascii_lowercase();
    SIZE_PRESETS
        .iter()
        .find(|preset| preset.key == wanted || preset.name.to_ascii_lowercase() == wanted)
        .copied()
}

pub fn preset_for_dims(width: u32, height: u32) -> Option<SizePreset> {
    SIZE_PRESETS
        .iter()
        .find(|preset| preset.width == width && preset.height == height)
        .copied()
}

pub fn size_label(width: u32, height: u32) -> &'static str {
    preset_for_dims(width, height)
        .map(|preset| preset.name)
        .unwrap_or(CUSTOM_SIZE_LABEL)
}
