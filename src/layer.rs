//! Records to markers, and the viewer state that owns the active layer.
//!
//! Loading is split in two so no lock is held across the network call:
//! [`Viewer::begin_load`] validates the source and hands out a
//! [`LoadTicket`], [`load_layer`] fetches and builds markers without touching
//! the map, and [`Viewer::complete_load`] swaps the result in. Each ticket
//! carries the generation it was issued for; a later load or a clear makes it
//! stale and its result is dropped.

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::geometry::{self, PairOrder};
use crate::map_view::{MapSurface, Viewport};
use crate::marker::MarkerFactory;
use crate::models::{ActiveLayer, Bounds, LatLng, Marker, Record};
use crate::source::{ConfigError, FetchError, RecordSource, SourceConfig, TableQuery};
use crate::status::StatusMessage;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("no rows found in the table")]
    EmptyResult,
    #[error("no valid points could be loaded ({errors} with errors)")]
    NoValidPoints { errors: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltLayer {
    pub markers: Vec<Marker>,
    pub bounds: Bounds,
    pub error_count: usize,
}

/// Turns fetched rows into markers. Rows without a usable position are
/// counted in `error_count` and skipped.
pub fn build_layer(
    records: &[Record],
    geom_field: &str,
    pair_order: PairOrder,
    factory: &MarkerFactory,
) -> Result<BuiltLayer, LoadError> {
    if records.is_empty() {
        return Err(LoadError::EmptyResult);
    }

    let mut markers = Vec::with_capacity(records.len());
    let mut bounds = Bounds::default();
    let mut error_count = 0;

    for (index, record) in records.iter().enumerate() {
        let position = match geometry::extract(record.get(geom_field), pair_order) {
            Ok(p) => p,
            Err(e) => {
                debug!("skipping row {}: {}", index, e);
                error_count += 1;
                continue;
            }
        };
        match factory.build(position, record, index) {
            Ok(marker) => {
                bounds.extend(position);
                markers.push(marker);
            }
            Err(e) => {
                warn!("failed to build marker for row {}: {}", index, e);
                error_count += 1;
            }
        }
    }

    if markers.is_empty() {
        return Err(LoadError::NoValidPoints { errors: error_count });
    }

    Ok(BuiltLayer {
        markers,
        bounds,
        error_count,
    })
}

/// Fetches and builds a layer. Map state is untouched.
pub async fn load_layer<S: RecordSource>(
    source: &S,
    query: &TableQuery,
    factory: &MarkerFactory,
) -> Result<BuiltLayer, LoadError> {
    let records = source.fetch(query).await?;
    info!("fetched {} rows from {}", records.len(), query.table);
    build_layer(&records, &query.geom_field, query.pair_order, factory)
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoadPhase {
    Idle,
    Loading,
    Loaded,
    Failed,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LayerSummary {
    pub total_points: usize,
    pub error_count: usize,
    pub refreshed_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadTicket {
    generation: u64,
    pub query: TableQuery,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    Loaded { points: usize, errors: usize },
    Failed { reason: String },
    /// A newer load or a clear happened while this one was in flight.
    Stale,
}

/// Fit and reset parameters for the map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewSettings {
    pub home: LatLng,
    pub home_zoom: u8,
    pub fit_padding: u32,
    pub max_fit_zoom: u8,
}

#[derive(Serialize, Debug, Clone)]
pub struct ViewerSnapshot<'a> {
    pub phase: LoadPhase,
    pub generation: u64,
    pub layer: Option<&'a ActiveLayer>,
    pub viewport: Viewport,
    pub summary: Option<&'a LayerSummary>,
    pub status: Option<&'a StatusMessage>,
}

/// Application state for one map: the surface, the active layer reference,
/// counters and the last status message.
pub struct Viewer<M: MapSurface> {
    map: M,
    settings: ViewSettings,
    phase: LoadPhase,
    generation: u64,
    active: Option<u64>,
    next_layer_id: u64,
    summary: Option<LayerSummary>,
    status: Option<StatusMessage>,
}

impl<M: MapSurface> Viewer<M> {
    pub fn new(map: M, settings: ViewSettings) -> Self {
        Self {
            map,
            settings,
            phase: LoadPhase::Idle,
            generation: 0,
            active: None,
            next_layer_id: 1,
            summary: None,
            status: None,
        }
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn active_layer(&self) -> Option<&ActiveLayer> {
        self.active.and_then(|id| self.map.layer(id))
    }

    pub fn summary(&self) -> Option<&LayerSummary> {
        self.summary.as_ref()
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn snapshot(&self) -> ViewerSnapshot<'_> {
        ViewerSnapshot {
            phase: self.phase,
            generation: self.generation,
            layer: self.active_layer(),
            viewport: self.map.viewport(),
            summary: self.summary.as_ref(),
            status: self.status.as_ref(),
        }
    }

    /// Validates `config` and moves to `Loading`. On a configuration error
    /// nothing else changes apart from the status message.
    pub fn begin_load(&mut self, config: &SourceConfig) -> Result<LoadTicket, ConfigError> {
        let query = match config.validate() {
            Ok(q) => q,
            Err(e) => {
                warn!("load rejected: {}", e);
                self.status = Some(StatusMessage::error(format!("Invalid configuration: {}", e)));
                return Err(e);
            }
        };

        if self.phase == LoadPhase::Loading {
            debug!("superseding in-flight load {}", self.generation);
        }
        self.generation += 1;
        self.phase = LoadPhase::Loading;
        self.status = Some(StatusMessage::info(format!("Loading data from {}...", query.table)));
        Ok(LoadTicket {
            generation: self.generation,
            query,
        })
    }

    /// Applies the result of the load started with `ticket`.
    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<BuiltLayer, LoadError>,
    ) -> LoadOutcome {
        if ticket.generation != self.generation {
            info!(
                "discarding stale load {} (current {})",
                ticket.generation, self.generation
            );
            return LoadOutcome::Stale;
        }

        let built = match result {
            Ok(built) => built,
            Err(e) => {
                warn!("load of {} failed: {}", ticket.query.table, e);
                self.phase = LoadPhase::Failed;
                let text = match &e {
                    LoadError::EmptyResult => "No rows found in the table".to_string(),
                    LoadError::NoValidPoints { .. } => "No valid points could be loaded".to_string(),
                    LoadError::Fetch(f) => format!("Error: {}", f),
                };
                self.status = Some(StatusMessage::error(text));
                return LoadOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        if let Some(previous) = self.active.take() {
            self.map.remove_layer(previous);
        }

        let points = built.markers.len();
        let errors = built.error_count;
        let id = self.next_layer_id;
        self.next_layer_id += 1;

        if built.bounds.is_valid() {
            self.map
                .fit_bounds(&built.bounds, self.settings.fit_padding, self.settings.max_fit_zoom);
        }
        self.map.add_layer(ActiveLayer {
            id,
            generation: ticket.generation,
            markers: built.markers,
            bounds: built.bounds,
        });
        self.active = Some(id);

        self.phase = LoadPhase::Loaded;
        self.summary = Some(LayerSummary {
            total_points: points,
            error_count: errors,
            refreshed_at: Local::now(),
        });

        let mut text = format!("{} points loaded", points);
        if errors > 0 {
            text.push_str(&format!(" ({} with errors)", errors));
        }
        info!("{} from {}", text, ticket.query.table);
        self.status = Some(StatusMessage::success(text));

        LoadOutcome::Loaded { points, errors }
    }

    /// Removes the active layer and recentres on the home view. Returns
    /// `false`, changing nothing, when there is no layer.
    pub fn clear(&mut self) -> bool {
        let Some(id) = self.active.take() else {
            return false;
        };
        self.map.remove_layer(id);
        // Anything still in flight would resurrect the layer
        self.generation += 1;
        self.phase = LoadPhase::Idle;
        self.summary = None;
        self.map.set_view(self.settings.home, self.settings.home_zoom);
        self.status = Some(StatusMessage::info("Layer removed"));
        info!("cleared layer {}", id);
        true
    }
}
