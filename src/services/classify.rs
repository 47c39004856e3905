//! Filename classification.
//!
//! Grammar: drop the final extension, split the stem on `_`, take the
//! first all-digit token as the year. The season is the first recognized
//! tag (in configured order) found anywhere in the title, ignoring case.
//! A title missing either part classifies as [`ArtifactLabel::Unknown`].

use crate::models::artifact::ArtifactLabel;
use crate::models::descriptor::Season;

pub const SEPARATOR: char = '_';

#[derive(Debug, Clone)]
pub struct ClassificationRule {
    season_tags: Vec<Season>,
}

impl Default for ClassificationRule {
    fn default() -> Self {
        Self::new(vec![Season::Jja, Season::Annual, Season::Summer])
    }
}

impl ClassificationRule {
    pub fn new(season_tags: Vec<Season>) -> Self {
        Self { season_tags }
    }

    pub fn classify(&self, title: &str) -> ArtifactLabel {
        match (self.season(title), year_token(title)) {
            (Some(season), Some(year)) => ArtifactLabel::Seasonal {
                season,
                year: year.to_string(),
            },
            _ => ArtifactLabel::Unknown,
        }
    }

    fn season(&self, title: &str) -> Option<Season> {
        let lowered = title.to_ascii_lowercase();
        self.season_tags
            .iter()
            .copied()
            .find(|tag| lowered.contains(tag.marker()))
    }
}

fn stem(title: &str) -> &str {
    match title.rfind('.') {
        Some(0) | None => title,
        Some(i) => &title[..i],
    }
}

fn year_token(title: &str) -> Option<&str> {
    stem(title)
        .split(SEPARATOR)
        .find(|token| !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()))
}

/// Whether `title` is an output this run expects: right extension and,
/// when prefixes are given, starting with one of them. `None` accepts
/// any prefix; an empty list accepts nothing.
pub fn matches_expected(title: &str, extension: &str, prefixes: Option<&[String]>) -> bool {
    let lowered = title.to_ascii_lowercase();
    if !lowered.ends_with(&extension.to_ascii_lowercase()) {
        return false;
    }
    match prefixes {
        None => true,
        Some(prefixes) => prefixes.iter().any(|p| has_prefix(title, p)),
    }
}

/// `prefix` followed by the extension, a tile suffix (`-0000...`), or
/// nothing. `ndvi_jja_2021_us` does not claim `ndvi_jja_2021_usa.tif`.
fn has_prefix(title: &str, prefix: &str) -> bool {
    match title.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.') || rest.starts_with('-'),
        None => false,
    }
}
