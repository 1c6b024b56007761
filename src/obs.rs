// OBS Studio remote-control surface: one untyped request seam plus typed wrappers.
// Request and event names follow obs-websocket 4.x, which the JS OBSWebSocket object speaks.

use std::rc::Rc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::CamError;

/// Realm of the custom message broadcast after a camera activation.
pub const ACTIVATE_CAMERA_REALM: &str = "obs-cam-control-activate-camera";

/// Request/response transport to OBS Studio. Implemented over the browser's
/// `OBSWebSocket` object, and by fakes in tests.
#[async_trait(?Send)]
pub trait ObsRequests {
    /// Send `request` with `args` and return the response payload.
    async fn call(&self, request: &str, args: Value) -> Result<Value, CamError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObsVersion {
    pub obs_studio_version: String,
    pub obs_websocket_version: String,
}

/// Entry of a source's filter list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FilterList {
    #[serde(default)]
    filters: Vec<FilterEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct FilterInfo {
    #[serde(default)]
    settings: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudioModeStatus {
    studio_mode: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct SceneName {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceActive {
    source_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct Screenshot {
    img: String,
}

/// Events the panel subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObsEvent {
    StudioModeSwitched { new_state: bool },
    SwitchScenes { scene_name: String },
    PreviewSceneChanged { scene_name: String },
    CustomMessage { realm: String },
    /// Anything the panel does not react to.
    Other(String),
}

impl ObsEvent {
    /// Decode an event by its update-type name and JSON payload.
    pub fn parse(name: &str, payload: &str) -> Result<ObsEvent, CamError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ModeSwitch {
            new_state: bool,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "kebab-case")]
        struct SceneEvent {
            #[serde(alias = "sceneName")]
            scene_name: String,
        }
        #[derive(Deserialize)]
        struct Custom {
            #[serde(default)]
            realm: String,
        }

        let event = match name {
            "StudioModeSwitched" => ObsEvent::StudioModeSwitched {
                new_state: serde_json::from_str::<ModeSwitch>(payload)?.new_state,
            },
            "SwitchScenes" => ObsEvent::SwitchScenes {
                scene_name: serde_json::from_str::<SceneEvent>(payload)?.scene_name,
            },
            "PreviewSceneChanged" => ObsEvent::PreviewSceneChanged {
                scene_name: serde_json::from_str::<SceneEvent>(payload)?.scene_name,
            },
            "BroadcastCustomMessage" => ObsEvent::CustomMessage {
                realm: serde_json::from_str::<Custom>(payload)?.realm,
            },
            other => ObsEvent::Other(other.to_string()),
        };
        Ok(event)
    }
}

/// Typed facade over [`ObsRequests`]. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct ObsClient {
    transport: Rc<dyn ObsRequests>,
}

impl ObsClient {
    pub fn new(transport: Rc<dyn ObsRequests>) -> Self {
        ObsClient { transport }
    }

    async fn request<T: DeserializeOwned>(&self, request: &str, args: Value) -> Result<T, CamError> {
        let value = self.transport.call(request, args).await?;
        serde_json::from_value(value).map_err(|e| CamError::remote(request, e.to_string()))
    }

    pub async fn version(&self) -> Result<ObsVersion, CamError> {
        self.request("GetVersion", json!({})).await
    }

    pub async fn source_filters(&self, source_name: &str) -> Result<Vec<FilterEntry>, CamError> {
        let list: FilterList = self
            .request("GetSourceFilters", json!({ "sourceName": source_name }))
            .await?;
        Ok(list.filters)
    }

    /// Full settings object of a filter.
    pub async fn filter_settings(
        &self,
        source_name: &str,
        filter_name: &str,
    ) -> Result<serde_json::Map<String, Value>, CamError> {
        let info: FilterInfo = self
            .request(
                "GetSourceFilterInfo",
                json!({ "sourceName": source_name, "filterName": filter_name }),
            )
            .await?;
        Ok(info.settings)
    }

    /// Replace the whole settings object of a filter.
    pub async fn set_filter_settings(
        &self,
        source_name: &str,
        filter_name: &str,
        settings: serde_json::Map<String, Value>,
    ) -> Result<(), CamError> {
        self.transport
            .call(
                "SetSourceFilterSettings",
                json!({
                    "sourceName": source_name,
                    "filterName": filter_name,
                    "filterSettings": settings,
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn studio_mode(&self) -> Result<bool, CamError> {
        let status: StudioModeStatus = self.request("GetStudioModeStatus", json!({})).await?;
        Ok(status.studio_mode)
    }

    pub async fn current_scene(&self) -> Result<String, CamError> {
        let scene: SceneName = self.request("GetCurrentScene", json!({})).await?;
        Ok(scene.name)
    }

    pub async fn preview_scene(&self) -> Result<String, CamError> {
        let scene: SceneName = self.request("GetPreviewScene", json!({})).await?;
        Ok(scene.name)
    }

    pub async fn source_active(&self, source_name: &str) -> Result<bool, CamError> {
        let active: SourceActive = self
            .request("GetSourceActive", json!({ "sourceName": source_name }))
            .await?;
        Ok(active.source_active)
    }

    pub async fn set_scene_item_visible(
        &self,
        scene_name: &str,
        item: &str,
        visible: bool,
    ) -> Result<(), CamError> {
        self.transport
            .call(
                "SetSceneItemProperties",
                json!({ "scene-name": scene_name, "item": item, "visible": visible }),
            )
            .await?;
        Ok(())
    }

    pub async fn broadcast(&self, realm: &str) -> Result<(), CamError> {
        self.transport
            .call("BroadcastCustomMessage", json!({ "realm": realm, "data": {} }))
            .await?;
        Ok(())
    }

    /// JPEG screenshot of a source as a data URL.
    pub async fn screenshot(&self, source_name: &str, width: u32, height: u32) -> Result<String, CamError> {
        let shot: Screenshot = self
            .request(
                "TakeSourceScreenshot",
                json!({
                    "sourceName": source_name,
                    "embedPictureFormat": "jpeg",
                    "compressionQuality": 30,
                    "width": width,
                    "height": height,
                }),
            )
            .await?;
        Ok(shot.img)
    }
}
