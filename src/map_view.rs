//! The map the browser mirrors: overlays plus the current viewport.

use std::f64::consts::PI;

use serde::Serialize;

use crate::models::{ActiveLayer, Bounds, LatLng};

const TILE_SIZE: f64 = 256.0;
/// Web Mercator latitude limit
const MERCATOR_MAX_LAT: f64 = 85.05112878;

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center: LatLng,
    pub zoom: u8,
}

/// Operations the viewer needs from a map.
pub trait MapSurface {
    fn add_layer(&mut self, layer: ActiveLayer);
    fn remove_layer(&mut self, id: u64) -> Option<ActiveLayer>;
    fn layer(&self, id: u64) -> Option<&ActiveLayer>;
    fn overlay_count(&self) -> usize;
    fn fit_bounds(&mut self, bounds: &Bounds, padding: u32, max_zoom: u8);
    fn set_view(&mut self, center: LatLng, zoom: u8);
    fn viewport(&self) -> Viewport;
}

#[derive(Debug, Clone)]
pub struct MapView {
    overlays: Vec<ActiveLayer>,
    viewport: Viewport,
    size: (u32, u32),
}

impl MapView {
    /// `size` is the client's map container in CSS pixels.
    pub fn new(center: LatLng, zoom: u8, size: (u32, u32)) -> Self {
        Self {
            overlays: Vec::new(),
            viewport: Viewport { center, zoom },
            size,
        }
    }
}

impl MapSurface for MapView {
    fn add_layer(&mut self, layer: ActiveLayer) {
        self.overlays.push(layer);
    }

    fn remove_layer(&mut self, id: u64) -> Option<ActiveLayer> {
        let idx = self.overlays.iter().position(|l| l.id == id)?;
        Some(self.overlays.remove(idx))
    }

    fn layer(&self, id: u64) -> Option<&ActiveLayer> {
        self.overlays.iter().find(|l| l.id == id)
    }

    fn overlay_count(&self) -> usize {
        self.overlays.len()
    }

    fn fit_bounds(&mut self, bounds: &Bounds, padding: u32, max_zoom: u8) {
        let (Some(sw), Some(ne)) = (bounds.south_west, bounds.north_east) else {
            return;
        };
        let avail_w = self.size.0.saturating_sub(padding.saturating_mul(2)).max(1) as f64;
        let avail_h = self.size.1.saturating_sub(padding.saturating_mul(2)).max(1) as f64;

        // Extents as a fraction of the world at zoom 0
        let (north_y, south_y) = (mercator_y(ne.lat), mercator_y(sw.lat));
        let dx = (ne.lng - sw.lng) / 360.0;
        let dy = south_y - north_y;

        // Centre in projected space so both edges get the same pixel margin
        let center = LatLng::new(unproject_y((north_y + south_y) / 2.0), (sw.lng + ne.lng) / 2.0);

        let zoom_for = |avail: f64, extent: f64| {
            if extent <= 0.0 {
                f64::INFINITY
            } else {
                (avail / (extent * TILE_SIZE)).log2()
            }
        };
        let zoom = zoom_for(avail_w, dx).min(zoom_for(avail_h, dy));
        let zoom = zoom.floor().clamp(0.0, max_zoom as f64) as u8;

        self.viewport = Viewport { center, zoom };
    }

    fn set_view(&mut self, center: LatLng, zoom: u8) {
        self.viewport = Viewport { center, zoom };
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }
}

/// Latitude to Web Mercator y in [0, 1], 0 at the north edge.
fn mercator_y(lat: f64) -> f64 {
    let lat_rad = lat.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT) * PI / 180.0;
    (1.0 - lat_rad.tan().asinh() / PI) / 2.0
}

/// Inverse of `mercator_y`.
fn unproject_y(y: f64) -> f64 {
    (PI * (1.0 - 2.0 * y)).sinh().atan() * 180.0 / PI
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(id: u64) -> ActiveLayer {
        ActiveLayer {
            id,
            generation: id,
            markers: Vec::new(),
            bounds: Bounds::default(),
        }
    }

    #[test]
    fn remove_only_touches_matching_overlay() {
        let mut map = MapView::new(LatLng::new(0.0, 0.0), 3, (800, 600));
        map.add_layer(layer(1));
        map.add_layer(layer(2));

        assert!(map.remove_layer(1).is_some());
        assert!(map.remove_layer(1).is_none());
        assert_eq!(map.overlay_count(), 1);
        assert!(map.layer(2).is_some());
    }

    #[test]
    fn single_point_fits_at_max_zoom() {
        let mut map = MapView::new(LatLng::new(0.0, 0.0), 3, (800, 600));
        let mut bounds = Bounds::default();
        bounds.extend(LatLng::new(-16.5, -68.15));
        map.fit_bounds(&bounds, 50, 16);

        assert_eq!(map.viewport().zoom, 16);
        let center = map.viewport().center;
        assert!((center.lat - -16.5).abs() < 1e-9);
        assert_eq!(center.lng, -68.15);
    }

    #[test]
    fn whole_world_fits_at_low_zoom() {
        let mut map = MapView::new(LatLng::new(0.0, 0.0), 10, (1024, 768));
        let mut bounds = Bounds::default();
        bounds.extend(LatLng::new(-60.0, -170.0));
        bounds.extend(LatLng::new(60.0, 170.0));
        map.fit_bounds(&bounds, 50, 16);

        // 924 px wide / (0.944 * 256) is about 3.8 -> zoom 1
        assert_eq!(map.viewport().zoom, 1);
    }

    #[test]
    fn padding_decides_zoom_at_the_edge() {
        // 0.684 degrees is 0.0019 of the world, 996 px wide at zoom 11
        let mut bounds = Bounds::default();
        bounds.extend(LatLng::new(-16.5, -68.5));
        bounds.extend(LatLng::new(-16.5, -67.816));

        let mut map = MapView::new(LatLng::new(0.0, 0.0), 3, (1024, 768));
        map.fit_bounds(&bounds, 0, 16);
        assert_eq!(map.viewport().zoom, 11);

        map.fit_bounds(&bounds, 50, 16);
        assert_eq!(map.viewport().zoom, 10);
    }

    #[test]
    fn tall_extent_keeps_every_corner_on_screen() {
        let (width, height, padding) = (2000u32, 700u32, 50u32);
        let mut map = MapView::new(LatLng::new(0.0, 0.0), 3, (width, height));
        let mut bounds = Bounds::default();
        bounds.extend(LatLng::new(0.0, 0.0));
        bounds.extend(LatLng::new(85.0, 10.0));
        map.fit_bounds(&bounds, padding, 16);

        let Viewport { center, zoom } = map.viewport();
        let world = TILE_SIZE * 2f64.powi(zoom as i32);
        let half_h = (height / 2 - padding) as f64 / world;
        let half_w = (width / 2 - padding) as f64 / world;
        let cy = mercator_y(center.lat);
        let cx = (center.lng + 180.0) / 360.0;

        for corner in [LatLng::new(0.0, 0.0), LatLng::new(85.0, 0.0), LatLng::new(0.0, 10.0), LatLng::new(85.0, 10.0)] {
            let y = mercator_y(corner.lat);
            let x = (corner.lng + 180.0) / 360.0;
            assert!(y >= cy - half_h - 1e-12 && y <= cy + half_h + 1e-12, "{corner:?} off screen vertically");
            assert!(x >= cx - half_w - 1e-12 && x <= cx + half_w + 1e-12, "{corner:?} off screen horizontally");
        }
    }

    #[test]
    fn huge_padding_does_not_overflow() {
        let mut map = MapView::new(LatLng::new(0.0, 0.0), 3, (1024, 768));
        let mut bounds = Bounds::default();
        bounds.extend(LatLng::new(-60.0, -170.0));
        bounds.extend(LatLng::new(60.0, 170.0));
        map.fit_bounds(&bounds, u32::MAX, 16);

        assert_eq!(map.viewport().zoom, 0);
    }

    #[test]
    fn empty_bounds_leave_viewport_alone() {
        let mut map = MapView::new(LatLng::new(1.0, 2.0), 7, (800, 600));
        map.fit_bounds(&Bounds::default(), 50, 16);
        assert_eq!(map.viewport(), Viewport { center: LatLng::new(1.0, 2.0), zoom: 7 });
    }
}
