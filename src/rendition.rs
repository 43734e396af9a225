use serde::{Deserialize, Serialize};

/// One encoded variant of an ad creative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRendition {
    pub url: String,
    /// Bitrate in kbps.
    pub bitrate: u32,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl MediaRendition {
    pub fn new(url: impl Into<String>, bitrate: u32) -> Self {
        MediaRendition {
            url: url.into(),
            bitrate,
            mime_type: None,
            width: None,
            height: None,
        }
    }
}

/// Pick the rendition with the highest bitrate.
///
/// Ties go to the earliest candidate. Returns `None` for an empty slice;
/// callers are expected to guard that case before binding an ad.
pub fn select_best_rendition(candidates: &[MediaRendition]) -> Option<&MediaRendition> {
    let mut best: Option<&MediaRendition> = None;
    for candidate in candidates {
        match best {
            Some(current) if candidate.bitrate <= current.bitrate => {}
            _ => best = Some(candidate),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renditions(bitrates: &[u32]) -> Vec<MediaRendition> {
        bitrates
            .iter()
            .enumerate()
            .map(|(i, br)| MediaRendition::new(format!("ad_{}.mp4", i), *br))
            .collect()
    }

    #[test]
    fn picks_highest_bitrate() {
        let list = renditions(&[500, 1200, 900]);
        let best = select_best_rendition(&list).unwrap();
        assert_eq!(best.bitrate, 1200);
        assert_eq!(best.url, "ad_1.mp4");
    }

    #[test]
    fn ties_resolve_to_first_candidate() {
        let list = renditions(&[800, 1200, 1200]);
        assert_eq!(select_best_rendition(&list).unwrap().url, "ad_1.mp4");
    }

    #[test]
    fn zero_bitrates_still_select_first() {
        let list = renditions(&[0, 0]);
        assert_eq!(select_best_rendition(&list).unwrap().url, "ad_0.mp4");
    }

    #[test]
    fn empty_input_yields_none() {
        assert!(select_best_rendition(&[]).is_none());
    }

    #[test]
    fn optional_attributes_default_when_missing_from_json() {
        let json = r#"{"url":"a.mp4","bitrate":300}"#;
        let r: MediaRendition = serde_json::from_str(json).unwrap();
        assert_eq!(r, MediaRendition::new("a.mp4", 300));
    }
}
