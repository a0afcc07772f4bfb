use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One backend row, keyed by column name.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Record(map),
            _ => Record::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Axis-aligned box in degrees, grown one point at a time.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub south_west: Option<LatLng>,
    pub north_east: Option<LatLng>,
}

impl Bounds {
    pub fn extend(&mut self, point: LatLng) {
        if let (Some(sw), Some(ne)) = (&mut self.south_west, &mut self.north_east) {
            sw.lat = sw.lat.min(point.lat);
            sw.lng = sw.lng.min(point.lng);
            ne.lat = ne.lat.max(point.lat);
            ne.lng = ne.lng.max(point.lng);
            return;
        }
        self.south_west = Some(point);
        self.north_east = Some(point);
    }

    pub fn is_valid(&self) -> bool {
        self.south_west.is_some() && self.north_east.is_some()
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct IconSpec {
    pub svg: String,
    pub class_name: String,
    pub size: (u32, u32),
    pub anchor: (i32, i32),
    pub popup_anchor: (i32, i32),
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PopupSpec {
    pub html: String,
    pub max_width: u32,
    pub class_name: String,
}

/// A record that made it onto the map.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Marker {
    pub position: LatLng,
    pub title: String,
    pub color: String,
    pub image_url: Option<String>,
    pub icon: IconSpec,
    pub popup: PopupSpec,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ActiveLayer {
    pub id: u64,
    pub generation: u64,
    pub markers: Vec<Marker>,
    pub bounds: Bounds,
}
