use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// Stored document field names.
pub const NAME: &str = "name";
pub const POINTS: &str = "points";
pub const PHONE: &str = "phone";
pub const STATUS: &str = "status";
pub const CREATED_AT: &str = "created_at";

/// Parses an RFC 3339 timestamp. A timestamp without an offset is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| raw.parse::<NaiveDateTime>().map(|naive| naive.and_utc()))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(de::Error::custom)
}

fn deserialize_optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| parse_timestamp(&raw).map_err(de::Error::custom))
        .transpose()
}

/// A loyalty card. The identifier lives outside the document body.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Card {
    pub name: String,
    pub points: i64,
    pub phone: String,
    pub status: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Sparse card used by partial updates. `None` fields are left untouched.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Clone)]
pub struct CardPatch {
    pub name: Option<String>,
    pub points: Option<i64>,
    pub phone: Option<String>,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl CardPatch {
    pub fn is_empty(&self) -> bool {
        let CardPatch { name, points, phone, status, created_at } = self;
        name.is_none()
            && points.is_none()
            && phone.is_none()
            && status.is_none()
            && created_at.is_none()
    }

    /// The supplied fields, keyed by their stored names.
    pub fn into_fields(self) -> Map<String, Value> {
        let CardPatch { name, points, phone, status, created_at } = self;
        let mut fields = Map::new();
        if let Some(name) = name {
            fields.insert(NAME.into(), Value::from(name));
        }
        if let Some(points) = points {
            fields.insert(POINTS.into(), Value::from(points));
        }
        if let Some(phone) = phone {
            fields.insert(PHONE.into(), Value::from(phone));
        }
        if let Some(status) = status {
            fields.insert(STATUS.into(), Value::from(status));
        }
        if let Some(created_at) = created_at {
            fields.insert(
                CREATED_AT.into(),
                Value::from(created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            );
        }
        fields
    }
}

/// Equality filters for listing. Empty strings count as absent.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CardFilter {
    pub status: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CardCreatedResponse {
    pub message: String,
    pub id: String,
}

impl CardCreatedResponse {
    pub fn new(id: String) -> Self {
        Self {
            message: "Document created successfully".to_string(),
            id,
        }
    }
}

impl IntoResponse for CardCreatedResponse {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, Json(self)).into_response()
    }
}
