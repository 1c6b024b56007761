// Typed accessor for a source's crop filter.
// OBS replaces a filter's whole settings object on write, so every update is read-modify-write.

use serde_json::{Map, Value};

use crate::error::CamError;
use crate::obs::ObsClient;
use crate::types::CropRect;

/// Filter kind OBS Studio registers for "Crop/Pad".
pub const CROP_FILTER_TYPE: &str = "crop_filter";

/// Reads and writes crop rectangles. Nothing is cached: filter names are
/// resolved on every call that does not name one.
#[derive(Clone)]
pub struct CropAccessor {
    obs: ObsClient,
}

impl CropAccessor {
    pub fn new(obs: ObsClient) -> Self {
        CropAccessor { obs }
    }

    /// Name of the first filter on `source_name` whose type is `filter_type`.
    pub async fn resolve_filter(&self, source_name: &str, filter_type: &str) -> Result<String, CamError> {
        let filters = self.obs.source_filters(source_name).await?;
        filters
            .into_iter()
            .find(|filter| filter.kind == filter_type)
            .map(|filter| filter.name)
            .ok_or_else(|| CamError::NotFound {
                source_name: source_name.to_string(),
                filter_type: filter_type.to_string(),
            })
    }

    async fn filter_name(&self, source_name: &str, filter_name: Option<&str>) -> Result<String, CamError> {
        match filter_name {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            _ => self.resolve_filter(source_name, CROP_FILTER_TYPE).await,
        }
    }

    pub async fn get_crop(&self, source_name: &str, filter_name: Option<&str>) -> Result<CropRect, CamError> {
        let filter_name = self.filter_name(source_name, filter_name).await?;
        let settings = self.obs.filter_settings(source_name, &filter_name).await?;
        Ok(crop_from_settings(&settings))
    }

    pub async fn set_crop(
        &self,
        source_name: &str,
        filter_name: Option<&str>,
        rect: CropRect,
    ) -> Result<(), CamError> {
        let filter_name = self.filter_name(source_name, filter_name).await?;
        let mut settings = self.obs.filter_settings(source_name, &filter_name).await?;
        write_crop(&mut settings, rect);
        self.obs
            .set_filter_settings(source_name, &filter_name, settings)
            .await
    }
}

// OBS leaves default-valued settings out of the object, so absent means zero.
fn crop_from_settings(settings: &Map<String, Value>) -> CropRect {
    let field = |key: &str| {
        settings
            .get(key)
            .and_then(Value::as_i64)
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(0)
    };
    CropRect {
        x: field("left"),
        y: field("top"),
        w: field("cx"),
        h: field("cy"),
    }
}

fn write_crop(settings: &mut Map<String, Value>, rect: CropRect) {
    settings.insert("left".to_string(), Value::from(rect.x));
    settings.insert("top".to_string(), Value::from(rect.y));
    settings.insert("cx".to_string(), Value::from(rect.w));
    settings.insert("cy".to_string(), Value::from(rect.h));
}
