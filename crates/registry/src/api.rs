//! Wire types shared by the registry HTTP service and its client.

use serde::{Deserialize, Serialize};

use delta_core::{CaptureState, Job};

/// Response of `POST /jobs/{id}/start` and `POST /jobs/{id}/stop`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleResponse {
    pub message: String,
    pub job: Job,
}

/// Body of `POST /jobs/{id}/_update_state`. `state` is optional on the wire so
/// a missing object is reported as an invalid state rather than a parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateStateRequest {
    #[serde(default)]
    pub state: Option<CaptureState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStateResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
