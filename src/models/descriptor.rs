use chrono::NaiveDate;
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// A recognized season window. Used both to plan exports and to
/// classify the exported files when they come back.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Season {
    Annual,
    Jja,
    Summer,
}

impl Season {
    /// Marker searched for in exported filenames (lower case).
    pub fn marker(&self) -> &'static str {
        match self {
            Season::Annual => "annual",
            Season::Jja => "jja",
            Season::Summer => "summer",
        }
    }

    /// Label used for local directory names and job labels.
    pub fn label(&self) -> &'static str {
        match self {
            Season::Annual => "Annual",
            Season::Jja => "JJA",
            Season::Summer => "Summer",
        }
    }

    /// Date window covered by this season in the given year.
    pub fn window(&self, year: i32) -> Option<TimeWindow> {
        let (start, end) = match self {
            Season::Annual => ((1, 1), (12, 31)),
            Season::Jja | Season::Summer => ((6, 1), (8, 31)),
        };
        Some(TimeWindow {
            start: NaiveDate::from_ymd_opt(year, start.0, start.1)?,
            end: NaiveDate::from_ymd_opt(year, end.0, end.1)?,
        })
    }
}

/// Inclusive date range passed to the compute service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Reference to a geometry held by the compute service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Region {
    /// Feature collection asset id (e.g. "USDOS/LSIB_SIMPLE/2017").
    #[garde(length(min = 1))]
    pub asset_id: String,

    /// Optional `property=value` filter applied to the collection.
    #[garde(skip)]
    pub filter: Option<String>,

    /// Short tag appended to export filenames (e.g. "us").
    #[garde(length(min = 1, max = 32))]
    pub tag: String,
}

/// Immutable specification of one export job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct JobDescriptor {
    /// Unique label, e.g. "NDVI_JJA_2021".
    #[garde(length(min = 1, max = 200))]
    pub label: String,

    #[garde(dive)]
    pub region: Region,

    #[garde(custom(window_is_ordered))]
    pub window: TimeWindow,

    /// Product computed by the remote service (e.g. "ndvi").
    #[garde(length(min = 1))]
    pub product: String,

    /// Source collection id. Opaque to this crate.
    #[garde(length(min = 1))]
    pub dataset: String,

    /// Remote folder the export is written into.
    #[garde(length(min = 1))]
    pub folder: String,

    #[garde(length(min = 1, max = 200))]
    pub filename_prefix: String,

    /// Ground units per pixel.
    #[garde(custom(is_positive))]
    pub resolution: f64,

    #[garde(range(min = 1))]
    pub max_pixels: u64,
}

fn window_is_ordered(value: &TimeWindow, _ctx: &()) -> garde::Result {
    if value.start > value.end {
        return Err(garde::Error::new(format!(
            "window start {} is after end {}",
            value.start, value.end
        )));
    }
    Ok(())
}

fn is_positive(value: &f64, _ctx: &()) -> garde::Result {
    if !value.is_finite() || *value <= 0.0 {
        return Err(garde::Error::new("must be a positive number"));
    }
    Ok(())
}
