//! Contains the data models for API requests and responses.

use boardsim_shared::ViewSnapshot;
use serde::{Deserialize, Serialize};

/// Clock and every published device view.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub cycle: u64,
    pub seconds: f64,
    pub devices: Vec<DeviceStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub name: String,
    pub view: ViewSnapshot,
}

/// Text renderings of one device.
#[derive(Debug, Serialize, Deserialize)]
pub struct DrawResponse {
    pub name: String,
    pub text: String,
    pub simple: String,
}

/// Represents a request to run a scripted action.
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub target: String,
    pub action: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DriveRequest {
    pub value: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LineResponse {
    pub line: String,
    pub value: u32,
}
