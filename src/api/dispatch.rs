//! Method-channel style command dispatch.
//!
//! Hosts that talk to the engine through named methods with JSON arguments
//! (the shape of a platform method channel) go through `dispatch`, which
//! maps each call onto `EngineHandle` and every failure onto a structured
//! error carrying a stable string code.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::engine::EngineHandle;
use crate::error::{log_audio_error, AudioError};

/// Result of one method call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodResponse {
    Success { value: Value },
    Error { code: String, message: String },
    NotImplemented,
}

impl MethodResponse {
    fn success(value: impl Into<Value>) -> Self {
        MethodResponse::Success {
            value: value.into(),
        }
    }

    fn from_error(err: &AudioError) -> Self {
        MethodResponse::Error {
            code: err.channel_code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            json!({ "status": "error", "code": "MONITORING_ERROR", "message": e.to_string() })
                .to_string()
        })
    }
}

/// Execute `method` against `engine`.
///
/// | method                | arguments            | success value |
/// |-----------------------|----------------------|---------------|
/// | `startMonitoring`     | -                    | `true`        |
/// | `stopMonitoring`      | -                    | `true`        |
/// | `isMonitoring`        | -                    | bool          |
/// | `setMonitoringVolume` | `{"volume": number}` | `true`        |
/// | `getAudioLevel`       | -                    | number        |
/// | `getLatency`          | -                    | number (ms)   |
pub fn dispatch(engine: &EngineHandle, method: &str, arguments: &Value) -> MethodResponse {
    match method {
        "startMonitoring" => match engine.start() {
            Ok(()) => MethodResponse::success(true),
            Err(err) => MethodResponse::from_error(&err),
        },
        "stopMonitoring" => {
            engine.stop();
            MethodResponse::success(true)
        }
        "isMonitoring" => MethodResponse::success(engine.is_monitoring()),
        "setMonitoringVolume" => match volume_argument(arguments) {
            Ok(volume) => match engine.set_volume(volume) {
                Ok(_) => MethodResponse::success(true),
                Err(err) => MethodResponse::from_error(&err),
            },
            Err(err) => {
                log_audio_error(&err, "setMonitoringVolume");
                MethodResponse::from_error(&err)
            }
        },
        "getAudioLevel" => MethodResponse::success(engine.audio_level()),
        "getLatency" => MethodResponse::success(engine.latency_ms()),
        other => {
            log::debug!("[Dispatch] Method not implemented: {}", other);
            MethodResponse::NotImplemented
        }
    }
}

/// Decode the arguments JSON text and dispatch. Empty text means no arguments.
pub fn dispatch_json(engine: &EngineHandle, method: &str, arguments_json: &str) -> MethodResponse {
    let arguments = if arguments_json.trim().is_empty() {
        Value::Null
    } else {
        match serde_json::from_str(arguments_json) {
            Ok(value) => value,
            Err(e) => {
                return MethodResponse::from_error(&AudioError::InvalidArguments {
                    reason: format!("arguments are not valid JSON: {}", e),
                })
            }
        }
    };
    dispatch(engine, method, &arguments)
}

fn volume_argument(arguments: &Value) -> Result<f64, AudioError> {
    arguments
        .get("volume")
        .and_then(Value::as_f64)
        .ok_or_else(|| AudioError::InvalidArguments {
            reason: "volume must be a number".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::engine::{MockBackend, MockPermissions};
    use std::sync::Arc;

    fn engine(permissions: MockPermissions) -> EngineHandle {
        EngineHandle::with_backend(
            AppConfig::default(),
            Arc::new(MockBackend::new()),
            Arc::new(permissions),
        )
    }

    #[test]
    fn test_start_and_stop_return_true() {
        let engine = engine(MockPermissions::granted());
        assert_eq!(
            dispatch(&engine, "startMonitoring", &Value::Null),
            MethodResponse::success(true)
        );
        assert_eq!(
            dispatch(&engine, "isMonitoring", &Value::Null),
            MethodResponse::success(true)
        );
        assert_eq!(
            dispatch(&engine, "stopMonitoring", &Value::Null),
            MethodResponse::success(true)
        );
    }

    #[test]
    fn test_permission_denied_code() {
        let engine = engine(MockPermissions::denied());
        match dispatch(&engine, "startMonitoring", &Value::Null) {
            MethodResponse::Error { code, .. } => assert_eq!(code, "PERMISSION_DENIED"),
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn test_volume_requires_number() {
        let engine = engine(MockPermissions::granted());

        for arguments in [json!({}), json!({ "volume": "loud" }), Value::Null] {
            match dispatch(&engine, "setMonitoringVolume", &arguments) {
                MethodResponse::Error { code, .. } => assert_eq!(code, "INVALID_ARGUMENTS"),
                other => panic!("unexpected response {:?}", other),
            }
        }

        assert_eq!(
            dispatch(&engine, "setMonitoringVolume", &json!({ "volume": 2.0 })),
            MethodResponse::success(true)
        );
        assert_eq!(engine.volume(), 1.0);
    }

    #[test]
    fn test_unknown_method_not_implemented() {
        let engine = engine(MockPermissions::granted());
        assert_eq!(
            dispatch(&engine, "getSpectrum", &Value::Null),
            MethodResponse::NotImplemented
        );
    }

    #[test]
    fn test_idle_queries() {
        let engine = engine(MockPermissions::granted());
        assert_eq!(
            dispatch(&engine, "getLatency", &Value::Null),
            MethodResponse::success(0.0)
        );
        assert_eq!(
            dispatch(&engine, "getAudioLevel", &Value::Null),
            MethodResponse::success(0.0)
        );
    }

    #[test]
    fn test_json_wire_format() {
        let engine = engine(MockPermissions::granted());
        let response = dispatch_json(&engine, "setMonitoringVolume", "{\"volume\": 0.5}");
        let value: Value = serde_json::from_str(&response.to_json()).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["value"], true);

        let response = dispatch_json(&engine, "setMonitoringVolume", "not json");
        let value: Value = serde_json::from_str(&response.to_json()).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["code"], "INVALID_ARGUMENTS");

        let value: Value =
            serde_json::from_str(&MethodResponse::NotImplemented.to_json()).unwrap();
        assert_eq!(value["status"], "not_implemented");
    }
}
