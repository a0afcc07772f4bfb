//! Marker construction: icon, popup HTML and photo link handling.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use url::Url;

use crate::fields::{self, DetailRow};
use crate::models::{IconSpec, LatLng, Marker, PopupSpec, Record};
use crate::style::StyleClassifier;
use crate::template_engine::{TemplateEngine, ICON_TEMPLATE, POPUP_TEMPLATE};

const ICON_SIZE: u32 = 40;
const POPUP_MAX_WIDTH: u32 = 350;
const THUMBNAIL_WIDTH: &str = "w400";

#[derive(Serialize)]
struct PopupContext<'a> {
    title: &'a str,
    image_url: Option<&'a str>,
    rows: &'a [DetailRow],
    latitude: String,
    longitude: String,
}

#[derive(Clone)]
pub struct MarkerFactory {
    templates: Arc<TemplateEngine>,
    classifier: StyleClassifier,
}

impl MarkerFactory {
    pub fn new(templates: Arc<TemplateEngine>, classifier: StyleClassifier) -> Self {
        Self {
            templates,
            classifier,
        }
    }

    /// `index` is the record's position in the fetched batch and only feeds
    /// the fallback title.
    pub fn build(&self, position: LatLng, record: &Record, index: usize) -> Result<Marker> {
        let title = fields::title(record, index);
        let status = fields::accessibility(record);
        let color = self.classifier.color(status.as_deref()).to_string();
        let image_url = fields::photo(record).map(|url| drive_thumbnail_url(&url));
        let rows = fields::detail_rows(record);

        let popup_ctx = PopupContext {
            title: &title,
            image_url: image_url.as_deref(),
            rows: &rows,
            latitude: format!("{:.6}", position.lat),
            longitude: format!("{:.6}", position.lng),
        };
        let html = self
            .templates
            .render(POPUP_TEMPLATE, &tera::Context::from_serialize(&popup_ctx)?)?;

        let mut icon_ctx = tera::Context::new();
        icon_ctx.insert("color", &color);
        let svg = self.templates.render(ICON_TEMPLATE, &icon_ctx)?;

        let half = (ICON_SIZE / 2) as i32;
        Ok(Marker {
            position,
            title,
            color,
            image_url,
            icon: IconSpec {
                svg,
                class_name: "custom-marker".to_string(),
                size: (ICON_SIZE, ICON_SIZE),
                anchor: (half, half),
                popup_anchor: (0, -half),
            },
            popup: PopupSpec {
                html,
                max_width: POPUP_MAX_WIDTH,
                class_name: "custom-popup".to_string(),
            },
        })
    }
}

/// Rewrites Google Drive share links to a direct thumbnail; anything else is
/// returned unchanged.
pub fn drive_thumbnail_url(raw: &str) -> String {
    match drive_file_id(raw) {
        Some(id) => format!("https://drive.google.com/thumbnail?id={}&sz={}", id, THUMBNAIL_WIDTH),
        None => raw.to_string(),
    }
}

fn drive_file_id(raw: &str) -> Option<String> {
    let raw = raw.trim();
    // Scheme-less links are read as https
    let url = if raw.contains("://") {
        Url::parse(raw)
    } else {
        Url::parse(&format!("https://{}", raw.trim_start_matches('/')))
    }
    .ok()?;
    if url.host_str()? != "drive.google.com" {
        return None;
    }

    // /file/d/<id>/view
    let segments: Vec<&str> = url.path_segments()?.collect();
    if let Some(pair) = segments.windows(3).find(|w| w[0] == "file" && w[1] == "d") {
        return Some(pair[2].to_string()).filter(|id| !id.is_empty());
    }

    url.query_pairs()
        .find(|(key, value)| key == "id" && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}
