//! Position extraction from the geometry column.
//!
//! Rows come back with the geometry in one of three encodings: a GeoJSON
//! object, a WKT `POINT (lon lat)` string or a bare `"a,b"` pair. The value is
//! first classified into a [`RawGeometry`] and only then turned into a
//! validated [`LatLng`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::LatLng;

pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;
pub const MIN_LNG: f64 = -180.0;
pub const MAX_LNG: f64 = 180.0;

static WKT_POINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)POINT\s*\(\s*(\S+)\s+(\S+)\s*\)").expect("static WKT pattern")
});

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("geometry field is missing or null")]
    Missing,
    #[error("unsupported geometry encoding")]
    Unsupported,
    #[error("malformed geometry: {0}")]
    Malformed(String),
    #[error("coordinate is not a finite number")]
    NotFinite,
    #[error("latitude {0} out of range")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} out of range")]
    LongitudeOutOfRange(f64),
}

/// How to read an ambiguous `"a,b"` pair.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PairOrder {
    /// The value with the larger magnitude is latitude when it strictly
    /// exceeds the other; otherwise the pair is read as lng,lat.
    #[default]
    Heuristic,
    LatLng,
    LngLat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawGeometry<'a> {
    GeoJson(&'a [Value]),
    Wkt(&'a str),
    Pair(&'a str),
    Unsupported,
}

impl<'a> RawGeometry<'a> {
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::Object(obj) => match obj.get("coordinates") {
                Some(Value::Array(coords)) if coords.len() >= 2 => RawGeometry::GeoJson(coords),
                _ => RawGeometry::Unsupported,
            },
            Value::String(s) if s.to_ascii_uppercase().contains("POINT") => RawGeometry::Wkt(s),
            Value::String(s) if s.contains(',') => RawGeometry::Pair(s),
            _ => RawGeometry::Unsupported,
        }
    }

    pub fn position(&self, order: PairOrder) -> Result<LatLng, GeometryError> {
        let (lat, lng) = match self {
            RawGeometry::GeoJson(coords) => match coords {
                [lng, lat, ..] => (json_number(lat)?, json_number(lng)?),
                _ => return Err(GeometryError::Malformed(Value::Array(coords.to_vec()).to_string())),
            },
            RawGeometry::Wkt(text) => {
                let caps = WKT_POINT
                    .captures(text)
                    .ok_or_else(|| GeometryError::Malformed(text.to_string()))?;
                (parse_token(&caps[2])?, parse_token(&caps[1])?)
            }
            RawGeometry::Pair(text) => {
                let mut parts = text.split(',').map(str::trim);
                let (a, b) = match (parts.next(), parts.next()) {
                    (Some(a), Some(b)) => (parse_token(a)?, parse_token(b)?),
                    _ => return Err(GeometryError::Malformed(text.to_string())),
                };
                match order {
                    PairOrder::Heuristic if a.abs() > b.abs() => (a, b),
                    PairOrder::Heuristic => (b, a),
                    PairOrder::LatLng => (a, b),
                    PairOrder::LngLat => (b, a),
                }
            }
            RawGeometry::Unsupported => return Err(GeometryError::Unsupported),
        };
        validate(lat, lng)
    }
}

/// Reads the position out of `value`, if there is one.
pub fn extract(value: Option<&Value>, order: PairOrder) -> Result<LatLng, GeometryError> {
    match value {
        None | Some(Value::Null) => Err(GeometryError::Missing),
        Some(value) => RawGeometry::classify(value).position(order),
    }
}

pub fn validate(lat: f64, lng: f64) -> Result<LatLng, GeometryError> {
    if !lat.is_finite() || !lng.is_finite() {
        return Err(GeometryError::NotFinite);
    }
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(GeometryError::LatitudeOutOfRange(lat));
    }
    if !(MIN_LNG..=MAX_LNG).contains(&lng) {
        return Err(GeometryError::LongitudeOutOfRange(lng));
    }
    Ok(LatLng::new(lat, lng))
}

fn json_number(value: &Value) -> Result<f64, GeometryError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or(GeometryError::NotFinite),
        Value::String(s) => parse_token(s),
        other => Err(GeometryError::Malformed(other.to_string())),
    }
}

fn parse_token(token: &str) -> Result<f64, GeometryError> {
    token
        .trim()
        .parse::<f64>()
        .map_err(|_| GeometryError::Malformed(token.to_string()))
}
