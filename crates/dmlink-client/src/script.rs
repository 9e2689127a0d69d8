//! Running DigitalMicrograph scripts on the host.
//!
//! A script travels as a packed string in the trailing array of an
//! `ExecuteScript` request. The host answers with a status and the value the
//! script passed to `Exit`.

use dmlink_core::wire::pack_str;
use dmlink_core::{FunctionCode, Message, MessageShape};

use crate::client::Client;
use crate::error::ClientError;

/// Returned by long-valued camera object calls the host cannot perform.
pub const UNSUPPORTED_LONG: i64 = 1;

/// Returned by double-valued camera object calls the host cannot perform.
pub const UNSUPPORTED_DOUBLE: f64 = -999.0;

const SCRIPT_RESPONSE: MessageShape = MessageShape::new(1, 0, 1);

/// Status and `Exit` value of one script run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptReply {
    pub status: i64,
    pub value: f64,
}

/// Expected result type of a camera object function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Long,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScriptValue {
    Long(i64),
    Double(f64),
}

impl ScriptValue {
    pub fn as_f64(self) -> f64 {
        match self {
            ScriptValue::Long(v) => v as f64,
            ScriptValue::Double(v) => v,
        }
    }
}

/// Script that exits with 1.0 if the host defines `name`, else -1.0.
pub fn capability_check_script(name: &str) -> String {
    format!("if ( DoesFunctionExist(\"{name}\") ) {{ Exit(1.0); }} else {{ Exit(-1.0); }}")
}

/// Script that resolves camera `camera_id` and calls `function_name` on it.
pub fn camera_object_script(function_name: &str, camera_id: i64) -> String {
    format!(
        "Object manager = CM_GetCameraManager();\n\
         Object cameraList = CM_GetCameras(manager);\n\
         Object camera = ObjectAt(cameraList,{camera_id});\n\
         {function_name}(camera);\n"
    )
}

/// Script function names are spliced into source text, so only plain
/// identifiers are accepted.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Client {
    /// Run `script` and return the host's status and exit value.
    pub fn execute_script(&mut self, script: &str) -> Result<ScriptReply, ClientError> {
        self.execute_script_on(script, false)
    }

    /// Run `script`, asking the host to select the current camera first when
    /// `select_camera` is set.
    pub fn execute_script_on(&mut self, script: &str, select_camera: bool) -> Result<ScriptReply, ClientError> {
        let request = Message::call(FunctionCode::ExecuteScript)
            .bools([select_camera])
            .trailing(pack_str(script, self.layout()));
        let response = self.call(&request, SCRIPT_RESPONSE)?;
        tracing::debug!(status = response.head(), len = script.len(), "script executed");
        Ok(ScriptReply {
            status: response.head(),
            value: response.double(0).unwrap_or_default(),
        })
    }

    /// Run `script` and return only the host's status.
    pub fn execute_for_status(&mut self, script: &str) -> Result<i64, ClientError> {
        Ok(self.execute_script(script)?.status)
    }

    /// The script's exit value. A non-zero host status is a
    /// [`ClientError::Status`] naming `ExecuteScript`.
    pub fn execute_for_double(&mut self, script: &str) -> Result<f64, ClientError> {
        let reply = self.execute_script(script)?;
        if reply.status != 0 {
            return Err(ClientError::Status {
                function: FunctionCode::ExecuteScript,
                status: reply.status,
            });
        }
        Ok(reply.value)
    }

    /// The exit value truncated toward zero.
    pub fn execute_for_long(&mut self, script: &str) -> Result<i64, ClientError> {
        Ok(self.execute_for_double(script)?.trunc() as i64)
    }

    /// Whether the host's script environment defines `name`.
    ///
    /// A script that fails on the host counts as unsupported.
    pub fn supports_script_function(&mut self, name: &str) -> Result<bool, ClientError> {
        if !is_identifier(name) {
            tracing::warn!(name, "refusing to check a non-identifier function name");
            return Ok(false);
        }
        let reply = self.execute_script(&capability_check_script(name))?;
        if reply.status != 0 {
            tracing::warn!(name, status = reply.status, "capability script failed");
            return Ok(false);
        }
        let supported = reply.value > 0.0;
        tracing::debug!(name, supported, "checked script function");
        Ok(supported)
    }

    /// Call `function_name` on camera `camera_id` if the host supports it,
    /// otherwise return the sentinel for `kind`.
    ///
    /// A long result is the host's status word; a double result is the
    /// script's exit value.
    pub fn execute_camera_object_function(
        &mut self,
        function_name: &str,
        camera_id: i64,
        kind: ReturnKind,
    ) -> Result<ScriptValue, ClientError> {
        if !self.supports_script_function(function_name)? {
            return Ok(match kind {
                ReturnKind::Long => ScriptValue::Long(UNSUPPORTED_LONG),
                ReturnKind::Double => ScriptValue::Double(UNSUPPORTED_DOUBLE),
            });
        }
        let script = camera_object_script(function_name, camera_id);
        let reply = self.execute_script_on(&script, camera_id != 0)?;
        Ok(match kind {
            ReturnKind::Long => ScriptValue::Long(reply.status),
            ReturnKind::Double => ScriptValue::Double(reply.value),
        })
    }
}
