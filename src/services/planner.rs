use crate::models::descriptor::{JobDescriptor, Region, Season};

/// Parameters for building one descriptor per (year, product, season).
#[derive(Debug, Clone)]
pub struct ExportPlan {
    pub start_year: i32,
    pub end_year: i32,
    pub products: Vec<String>,
    pub seasons: Vec<Season>,
    pub dataset: String,
    pub region: Region,
    pub folder: String,
    pub resolution: f64,
    pub max_pixels: u64,
}

impl ExportPlan {
    /// Years ascend, then products and seasons in configured order.
    pub fn descriptors(&self) -> Vec<JobDescriptor> {
        let mut out = Vec::new();
        for year in self.start_year..=self.end_year {
            for product in &self.products {
                for season in &self.seasons {
                    let Some(window) = season.window(year) else {
                        tracing::warn!(year, season = %season, "No calendar window for season");
                        continue;
                    };
                    out.push(JobDescriptor {
                        label: format!(
                            "{}_{}_{}",
                            product.to_uppercase(),
                            season.label().to_uppercase(),
                            year
                        ),
                        region: self.region.clone(),
                        window,
                        product: product.clone(),
                        dataset: self.dataset.clone(),
                        folder: self.folder.clone(),
                        filename_prefix: format!(
                            "{}_{}_{}_{}",
                            product.to_lowercase(),
                            season.marker(),
                            year,
                            self.region.tag.to_lowercase()
                        ),
                        resolution: self.resolution,
                        max_pixels: self.max_pixels,
                    });
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> ExportPlan {
        ExportPlan {
            start_year: 2020,
            end_year: 2021,
            products: vec!["ndvi".to_string()],
            seasons: vec![Season::Annual, Season::Jja],
            dataset: "MODIS/061/MOD13Q1".to_string(),
            region: Region {
                asset_id: "USDOS/LSIB_SIMPLE/2017".to_string(),
                filter: Some("country_na=United States".to_string()),
                tag: "US".to_string(),
            },
            folder: "US_MODIS_NDVI".to_string(),
            resolution: 250.0,
            max_pixels: 10_000_000_000_000,
        }
    }

    #[test]
    fn test_one_descriptor_per_year_and_season() {
        let descriptors = plan().descriptors();
        let labels: Vec<&str> = descriptors.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["NDVI_ANNUAL_2020", "NDVI_JJA_2020", "NDVI_ANNUAL_2021", "NDVI_JJA_2021"]
        );
    }

    #[test]
    fn test_prefix_and_window() {
        let descriptors = plan().descriptors();
        let jja = &descriptors[3];
        assert_eq!(jja.filename_prefix, "ndvi_jja_2021_us");
        assert_eq!(jja.window, Season::Jja.window(2021).unwrap());
        assert_eq!(jja.folder, "US_MODIS_NDVI");
    }

    #[test]
    fn test_empty_year_range() {
        let mut p = plan();
        p.start_year = 2022;
        p.end_year = 2021;
        assert!(p.descriptors().is_empty());
    }
}
