//! Request handling for the device HTTP endpoints.
//!
//! Framework-agnostic: a web layer extracts the path id, JSON body and
//! headers, calls in here and maps [`ApiError::status_code`] onto its response.
//!
//! - `GET /device` -> [`list_devices`]
//! - `GET /device/:id` -> [`get_device`]
//! - `POST /device/:id/<action>` -> [`DeviceCommand::from_request`] then [`execute`]
//! - `SUBSCRIBE /device/:id` -> [`subscribe`]

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::device::{DeviceEntry, DeviceRegistry, DeviceSession};
use crate::error::{DeviceError, SubscriptionError, ValidationError};
use crate::subscription::{parse_callback_header, parse_timeout_header};
use crate::types::{DeviceId, DeviceView};

/// Errors as seen by an HTTP caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unavailable(String),
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::BadRequest(_) => 400,
            ApiError::Unavailable(_) => 503,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let error = match self {
            ApiError::NotFound(_) => "notFound",
            ApiError::BadRequest(_) => "badRequest",
            ApiError::Unavailable(_) => "unavailable",
        };
        ErrorBody {
            error,
            message: self.to_string(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<SubscriptionError> for ApiError {
    fn from(e: SubscriptionError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<DeviceError> for ApiError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::Validation(e) => e.into(),
            DeviceError::NotFound(id) => ApiError::NotFound(id),
            other => ApiError::Unavailable(other.to_string()),
        }
    }
}

/// A command addressed to one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    Strength(i64),
    Cups(i64),
    Grind(bool),
    BrewOn { grind: bool, cups: i64, strength: i64 },
    BrewOnDefault,
    BrewOff,
    HotplateOn(Option<i64>),
    HotplateOff,
}

impl DeviceCommand {
    /// Build a command from the action path segment(s) and the request body.
    ///
    /// `brew/on` with an empty body brews with the appliance's own settings.
    pub fn from_request(action: &str, body: &Value) -> Result<Self, ValidationError> {
        let command = match action.trim_matches('/') {
            "strength" => DeviceCommand::Strength(required_int(body, "strength")?),
            "cups" => DeviceCommand::Cups(required_int(body, "cups")?),
            "grind" => DeviceCommand::Grind(required_flag(body, "isGrind")?),
            "brew/on" if is_empty_body(body) => DeviceCommand::BrewOnDefault,
            "brew/on" => DeviceCommand::BrewOn {
                grind: required_flag(body, "isGrind")?,
                cups: required_int(body, "cups")?,
                strength: required_int(body, "strength")?,
            },
            "brew/off" => DeviceCommand::BrewOff,
            "hotplate/on" => DeviceCommand::HotplateOn(int_field(body, "mins")?),
            "hotplate/off" => DeviceCommand::HotplateOff,
            other => return Err(ValidationError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }

    /// Send this command through a session.
    pub async fn apply(self, session: &DeviceSession) -> Result<(), DeviceError> {
        match self {
            DeviceCommand::Strength(strength) => session.set_strength(strength).await,
            DeviceCommand::Cups(cups) => session.set_cups(cups).await,
            DeviceCommand::Grind(enabled) => session.set_grind_enabled(enabled).await,
            DeviceCommand::BrewOn {
                grind,
                cups,
                strength,
            } => session.brew_on(grind, cups, strength).await,
            DeviceCommand::BrewOnDefault => session.brew_on_default().await,
            DeviceCommand::BrewOff => session.brew_off().await,
            DeviceCommand::HotplateOn(minutes) => session.hotplate_on(minutes).await,
            DeviceCommand::HotplateOff => session.hotplate_off().await,
        }
    }
}

fn is_empty_body(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn field<'a>(body: &'a Value, name: &str) -> Option<&'a Value> {
    body.get(name).filter(|value| !value.is_null())
}

/// Integers arrive as JSON numbers, or as strings from form-encoded bodies.
fn int_field(body: &Value, name: &str) -> Result<Option<i64>, ValidationError> {
    let Some(value) = field(body, name) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| ValidationError::NotAnInteger(name.to_string()))
}

fn required_int(body: &Value, name: &str) -> Result<i64, ValidationError> {
    int_field(body, name)?.ok_or_else(|| ValidationError::MissingField(name.to_string()))
}

fn required_flag(body: &Value, name: &str) -> Result<bool, ValidationError> {
    match field(body, name) {
        None => Err(ValidationError::MissingField(name.to_string())),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(_) => Err(ValidationError::Flag(name.to_string())),
    }
}

async fn find_entry(registry: &DeviceRegistry, id: &str) -> Result<Arc<DeviceEntry>, ApiError> {
    registry
        .get(&DeviceId::new(id))
        .await
        .ok_or_else(|| DeviceError::NotFound(id.to_string()).into())
}

/// Every known device keyed by id.
pub async fn list_devices(registry: &DeviceRegistry) -> BTreeMap<DeviceId, DeviceView> {
    registry
        .list()
        .await
        .iter()
        .map(|entry| (entry.device.id.clone(), entry.view()))
        .collect()
}

pub async fn get_device(registry: &DeviceRegistry, id: &str) -> Result<DeviceView, ApiError> {
    Ok(find_entry(registry, id).await?.view())
}

/// Run a command against a device.
pub async fn execute(
    registry: &DeviceRegistry,
    id: &str,
    command: DeviceCommand,
) -> Result<(), ApiError> {
    let entry = find_entry(registry, id).await?;
    command.apply(&entry.session).await?;
    Ok(())
}

/// Register a callback from the raw `SID`, `TIMEOUT` and `CALLBACK` header values.
///
/// Returns the subscription id to echo back in the `SID` response header.
pub async fn subscribe(
    registry: &DeviceRegistry,
    id: &str,
    sid: Option<&str>,
    timeout: Option<&str>,
    callback: Option<&str>,
) -> Result<String, ApiError> {
    let entry = find_entry(registry, id).await?;

    let timeout = timeout.ok_or(SubscriptionError::MissingHeader("TIMEOUT"))?;
    let callback = callback.ok_or(SubscriptionError::MissingHeader("CALLBACK"))?;
    let timeout = parse_timeout_header(timeout)?;
    let callback = parse_callback_header(callback)?;

    Ok(entry
        .subscriptions
        .subscribe(sid.map(str::to_string), timeout, callback))
}
