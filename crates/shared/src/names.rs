pub const SCENE: &str = "scene";
pub const SCENE_HUMANNAME: &str = "scene_humanname";
pub const GALLERY_SIZE: &str = "gallerysize";
pub const GALLERY_CROP: &str = "gallerycrop";
pub const GALLERY_LAST_STATE: &str = "gallery_last_state";
pub const PLAYSOUND: &str = "playsound";
pub const NOTES_SCROLL: &str = "notes_scroll";
pub const SCREENSHARE_RESOLUTION: &str = "ss_resolution";
pub const MAINWINDOW_RESOLUTION: &str = "mainwindow_resolution";
pub const MIRROR_LIVE: &str = "mirror-live";

pub const NOTES_SCROLL_AUTO: &str = "notes_scroll_auto";

pub const MUTE_PREFIX: &str = "mute-";
pub const INDICATOR_PREFIX: &str = "indicator-";
pub const VOLUME_PREFIX: &str = "volume-";

pub fn mute_name(device: &str) -> String {
    format!("{MUTE_PREFIX}{device}")
}

pub fn volume_name(device: &str) -> String {
    format!("{VOLUME_PREFIX}{device}")
}

pub fn indicator_name(light: &str) -> String {
    format!("{INDICATOR_PREFIX}{light}")
}

pub fn preset_scene_name(preset: &str) -> String {
    format!("preset-{preset}-sbox")
}

pub fn preset_resolution_name(preset: &str) -> String {
    format!("preset-{preset}-rbox")
}

pub fn preset_label_name(preset: &str) -> String {
    format!("preset-{preset}-label")
}

/// Returns the member part of a family name, e.g. `cam1` for `mute-cam1`.
pub fn split_family<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    name.strip_prefix(prefix).filter(|member| !member.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_names_round_trip_through_split() {
        assert_eq!(split_family(&mute_name("cam1"), MUTE_PREFIX), Some("cam1"));
        assert_eq!(
            split_family(&volume_name("Instructors"), VOLUME_PREFIX),
            Some("Instructors")
        );
    }

    #[test]
    fn split_family_rejects_bare_prefix_and_other_families() {
        assert_eq!(split_family("mute-", MUTE_PREFIX), None);
        assert_eq!(split_family("volume-cam1", MUTE_PREFIX), None);
        assert_eq!(split_family(SCENE, MUTE_PREFIX), None);
    }
}
