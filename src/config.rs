// Panel configuration from the page URL query (`?camera-name=CAM1&...`).
// Required parameters fail fast with a Config error; everything else has a default.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::animation::MAX_FPS;
use crate::error::CamError;
use crate::types::{CanvasSize, CropRect, PhysicalPreset, VirtualPreset};

fn default_websocket_address() -> String {
    "localhost:4444".to_string()
}

fn default_durations() -> [u32; 3] {
    [1000, 3000, 5000]
}

fn default_fps() -> u32 {
    30
}

/// Live preview of a source via periodic screenshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewConfig {
    pub source: String,
    pub fps: f64,
}

/// Everything the panel needs to know at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub transparent: bool,
    #[serde(default = "default_websocket_address")]
    pub websocket_address: String,
    #[serde(default)]
    pub websocket_password: String,
    /// Title shown on the panel.
    pub title: String,
    /// `scene:item` entries toggled by camera activation; the first is shown, the rest hidden.
    pub activate_camera: Vec<String>,
    pub activate_physical: Vec<String>,
    pub activate_virtual: Vec<String>,
    /// Native size of the physical camera picture the virtual crops cut from.
    pub canvas: CanvasSize,
    /// Host name or address of the PTZ camera.
    pub device: String,
    #[serde(default)]
    pub presets_physical: Vec<PhysicalPreset>,
    pub sources_physical: Vec<String>,
    /// Sources carrying the virtual camera crop; the first one is authoritative.
    pub sources_virtual: Vec<String>,
    /// Short, medium and long transition durations in milliseconds.
    #[serde(default = "default_durations")]
    pub durations: [u32; 3],
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default)]
    pub presets_virtual: Vec<VirtualPreset>,
    #[serde(default)]
    pub preview: Option<PreviewConfig>,
}

impl PanelConfig {
    /// Parse a URL or bare query string. Everything up to the last `?` is ignored.
    pub fn from_query(query: &str) -> Result<PanelConfig, CamError> {
        let params = parse_params(query)?;
        let required = |key: &str| {
            params
                .get(key)
                .cloned()
                .ok_or_else(|| CamError::config(format!("missing \"{}\" parameter", key)))
        };
        let flag = |key: &str| params.get(key).map(|v| v == "true").unwrap_or(false);

        let canvas = parse_canvas(&required("camera-physical-canvas")?)?;

        let presets_physical = match params.get("camera-physical-presets") {
            Some(list) => split_list(list)
                .iter()
                .map(|p| parse_digit(p).map(|digit| PhysicalPreset { digit }))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let durations = match params.get("camera-virtual-duration") {
            Some(list) => parse_durations(list)?,
            None => default_durations(),
        };

        let fps = match params.get("camera-virtual-fps") {
            Some(v) => v
                .parse::<u32>()
                .ok()
                .filter(|fps| (1..=MAX_FPS).contains(fps))
                .ok_or_else(|| CamError::config(format!("invalid \"camera-virtual-fps\" value \"{}\"", v)))?,
            None => default_fps(),
        };

        let presets_virtual = match params.get("camera-virtual-presets") {
            Some(list) => split_list(list)
                .iter()
                .map(|text| parse_virtual_preset(text))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        if let Some(preset) = presets_virtual.iter().find(|p| !p.rect.fits_within(canvas)) {
            return Err(CamError::config(format!(
                "preset #{} does not fit the {}x{} canvas",
                preset.digit, canvas.width, canvas.height
            )));
        }

        let preview = match params.get("camera-physical-preview") {
            Some(text) => Some(parse_preview(text)?),
            None => None,
        };

        Ok(PanelConfig {
            debug: flag("debug"),
            transparent: flag("transparent"),
            websocket_address: params
                .get("websocket-address")
                .cloned()
                .unwrap_or_else(default_websocket_address),
            websocket_password: params.get("websocket-password").cloned().unwrap_or_default(),
            title: required("camera-name")?,
            activate_camera: split_list(&required("camera-activate")?),
            activate_physical: split_list(&required("camera-physical-activate")?),
            activate_virtual: split_list(&required("camera-virtual-activate")?),
            canvas,
            device: required("camera-physical-device")?,
            presets_physical,
            sources_physical: split_list(&required("camera-physical-sources")?),
            sources_virtual: non_empty(
                split_list(&required("camera-virtual-sources")?),
                "camera-virtual-sources",
            )?,
            durations,
            fps,
            presets_virtual,
            preview,
        })
    }
}

fn parse_params(query: &str) -> Result<HashMap<String, String>, CamError> {
    let query = query.rsplit_once('?').map(|(_, q)| q).unwrap_or(query);
    if let Some(pair) = query.split('&').find(|p| !p.is_empty() && !p.contains('=')) {
        return Err(CamError::config(format!("malformed query parameter \"{}\"", pair)));
    }
    // A literal '+' is part of the preset syntax, not an encoded space.
    let query = query.replace('+', "%2B");
    Ok(form_urlencoded::parse(query.as_bytes()).into_owned().collect())
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(str::to_string).collect()
}

fn non_empty(list: Vec<String>, key: &str) -> Result<Vec<String>, CamError> {
    if list.iter().any(|s| s.is_empty()) {
        return Err(CamError::config(format!("empty entry in \"{}\"", key)));
    }
    Ok(list)
}

fn parse_number(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn parse_digit(text: &str) -> Result<u8, CamError> {
    parse_number(text)
        .and_then(|n| u8::try_from(n).ok())
        .ok_or_else(|| CamError::config(format!("invalid preset number \"{}\"", text)))
}

fn parse_canvas(text: &str) -> Result<CanvasSize, CamError> {
    let invalid = || CamError::config("invalid \"camera-physical-canvas\" parameter");
    let (w, h) = text.split_once('x').ok_or_else(invalid)?;
    let width = parse_number(w).filter(|w| *w > 0).ok_or_else(invalid)?;
    let height = parse_number(h).filter(|h| *h > 0).ok_or_else(invalid)?;
    Ok(CanvasSize::new(width, height))
}

fn parse_durations(text: &str) -> Result<[u32; 3], CamError> {
    let durations = text
        .split(',')
        .map(|d| {
            parse_number(d).ok_or_else(|| CamError::config(format!("invalid transition duration \"{}\"", d)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    <[u32; 3]>::try_from(durations).map_err(|_| {
        CamError::config("parameter \"camera-virtual-duration\" needs exactly three comma-separated times")
    })
}

/// `D:X+Y/WxH`, e.g. `1:0+0/1920x1080`.
fn parse_virtual_preset(text: &str) -> Result<VirtualPreset, CamError> {
    let invalid = || CamError::config(format!("invalid preset \"{}\"", text));
    let (digit, geometry) = text.split_once(':').ok_or_else(invalid)?;
    let digit = parse_number(digit)
        .filter(|d| (1..=9).contains(d))
        .ok_or_else(invalid)? as u8;
    let (position, size) = geometry.split_once('/').ok_or_else(invalid)?;
    let (x, y) = position.split_once('+').ok_or_else(invalid)?;
    let (w, h) = size.split_once('x').ok_or_else(invalid)?;
    let field = |text: &str| {
        parse_number(text)
            .and_then(|n| i32::try_from(n).ok())
            .ok_or_else(invalid)
    };
    let rect = CropRect::new(field(x)?, field(y)?, field(w)?, field(h)?);
    Ok(VirtualPreset::new(digit, rect))
}

/// `source:fps`, fps may be fractional.
fn parse_preview(text: &str) -> Result<PreviewConfig, CamError> {
    let invalid = || CamError::config(format!("invalid \"camera-physical-preview\" value \"{}\"", text));
    let (source, fps) = text.rsplit_once(':').ok_or_else(invalid)?;
    let well_formed = !source.is_empty()
        && !fps.is_empty()
        && fps.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && !fps.starts_with('.')
        && !fps.ends_with('.');
    if !well_formed {
        return Err(invalid());
    }
    let fps: f64 = fps.parse().map_err(|_| invalid())?;
    if fps <= 0.0 {
        return Err(invalid());
    }
    Ok(PreviewConfig {
        source: source.to_string(),
        fps,
    })
}
