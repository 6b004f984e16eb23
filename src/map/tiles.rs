// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Base map raster tiles.
//!
//! Tiles come from the Carto dark basemap, are cached on disk for a week and
//! uploaded to egui textures as they arrive.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use egui::{ColorImage, TextureHandle, TextureOptions};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};

const CACHE_DURATION_DAYS: u64 = 7;

/// Highest zoom level the tile server provides.
pub const MAX_TILE_ZOOM: u8 = 19;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub zoom: u8,
}

impl TileCoord {
    #[must_use]
    pub fn new(x: u32, y: u32, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    /// Tile URL on the Carto CDN, spread over the a-d subdomains.
    #[must_use]
    pub fn url(&self) -> String {
        let subdomain = ['a', 'b', 'c', 'd'][((self.x + self.y) % 4) as usize];
        format!(
            "https://{}.basemaps.cartocdn.com/dark_all/{}/{}/{}.png",
            subdomain, self.zoom, self.x, self.y
        )
    }

    /// Cache file name, a hash of the URL.
    fn cache_filename(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.url().as_bytes());
        format!("{:x}.png", hasher.finalize())
    }
}

/// A tile needed for the viewport.
///
/// `column` is the unwrapped tile column used for placement; `coord.x` is
/// wrapped around the antimeridian for fetching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VisibleTile {
    pub coord: TileCoord,
    pub column: i64,
}

/// Tile zoom level for a fractional camera zoom.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "clamped to the tile zoom range first"
)]
pub fn tile_zoom(zoom: f64) -> u8 {
    zoom.round().clamp(0.0, f64::from(MAX_TILE_ZOOM)) as u8
}

/// Tiles covering a square of half-size `radius` around `(center_x, center_y)`.
///
/// Center and radius are in tile units at `zoom`.
#[allow(clippy::cast_possible_truncation, reason = "tile indices fit in i64")]
#[must_use]
pub fn visible_tiles(center_x: f64, center_y: f64, zoom: u8, radius: f64) -> Vec<VisibleTile> {
    let max_tile = 1_i64 << zoom;
    let first_column = (center_x - radius).floor() as i64;
    let last_column = (center_x + radius).floor() as i64;
    let first_row = ((center_y - radius).floor() as i64).max(0);
    let last_row = ((center_y + radius).floor() as i64).min(max_tile - 1);

    let mut tiles = Vec::new();
    for row in first_row..=last_row {
        for column in first_column..=last_column {
            let wrapped = column.rem_euclid(max_tile);
            #[allow(clippy::cast_sign_loss, reason = "non-negative after wrapping and clamping")]
            let coord = TileCoord::new(wrapped as u32, row as u32, zoom);
            tiles.push(VisibleTile { coord, column });
        }
    }
    tiles
}

/// Decode PNG bytes into an egui image.
pub fn decode_tile(bytes: &[u8]) -> Result<ColorImage, image::ImageError> {
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    Ok(ColorImage::from_rgba_unmultiplied(size, rgba.as_raw()))
}

enum TileState {
    Loading,
    Loaded(TextureHandle),
    Failed,
}

pub struct TileManager {
    cache_dir: PathBuf,
    tiles: Arc<Mutex<HashMap<TileCoord, TileState>>>,
    queued: Arc<Mutex<HashSet<TileCoord>>>,
}

impl std::fmt::Debug for TileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileManager")
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

impl Default for TileManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TileManager {
    pub fn new() -> Self {
        let cache_dir = Self::get_cache_dir();
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            warn!("Failed to create tile cache directory {}: {e}", cache_dir.display());
        }
        Self::cleanup_old_tiles(&cache_dir);

        Self {
            cache_dir,
            tiles: Arc::new(Mutex::new(HashMap::new())),
            queued: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn get_cache_dir() -> PathBuf {
        let mut path = dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache"));
        path.push(crate::config::APP_NAME);
        path.push("tiles");
        path
    }

    fn cleanup_old_tiles(cache_dir: &Path) {
        let now = SystemTime::now();
        let max_age = Duration::from_secs(CACHE_DURATION_DAYS * 24 * 60 * 60);

        let Ok(entries) = fs::read_dir(cache_dir) else {
            return;
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let expired = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age > max_age);
            if expired && fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Removed {removed} expired map tiles");
        }
    }

    /// Texture for `coord`, or `None` while it loads or if it failed.
    pub fn get_tile(&self, coord: TileCoord, ctx: &egui::Context) -> Option<TextureHandle> {
        let Ok(mut tiles) = self.tiles.lock() else {
            return None;
        };

        match tiles.get(&coord) {
            Some(TileState::Loaded(texture)) => return Some(texture.clone()),
            Some(TileState::Loading | TileState::Failed) => return None,
            None => {}
        }

        let cache_path = self.cache_dir.join(coord.cache_filename());
        if cache_path.exists() {
            match fs::read(&cache_path).map_err(|e| e.to_string()).and_then(|bytes| {
                decode_tile(&bytes).map_err(|e| e.to_string())
            }) {
                Ok(image) => {
                    let texture = load_texture(ctx, coord, image);
                    tiles.insert(coord, TileState::Loaded(texture.clone()));
                    return Some(texture);
                }
                Err(e) => warn!("Discarding unreadable cached tile {coord:?}: {e}"),
            }
        }

        tiles.insert(coord, TileState::Loading);
        drop(tiles);
        self.queue_download(coord, ctx.clone());
        None
    }

    fn queue_download(&self, coord: TileCoord, ctx: egui::Context) {
        let Ok(mut queued) = self.queued.lock() else {
            return;
        };
        if !queued.insert(coord) {
            return;
        }

        let tiles = Arc::clone(&self.tiles);
        let cache_dir = self.cache_dir.clone();
        let spawned = std::thread::Builder::new()
            .name("tile-download".to_string())
            .spawn(move || Self::download_tile(coord, &tiles, &cache_dir, &ctx));
        if let Err(e) = spawned {
            warn!("Failed to start tile download: {e}");
            queued.remove(&coord);
        }
    }

    fn download_tile(
        coord: TileCoord,
        tiles: &Mutex<HashMap<TileCoord, TileState>>,
        cache_dir: &Path,
        ctx: &egui::Context,
    ) {
        let url = coord.url();
        debug!("Downloading tile {url}");

        let state = match fetch(&url) {
            Ok(bytes) => {
                if let Err(e) = fs::write(cache_dir.join(coord.cache_filename()), &bytes) {
                    warn!("Failed to cache tile {coord:?}: {e}");
                }
                match decode_tile(&bytes) {
                    Ok(image) => TileState::Loaded(load_texture(ctx, coord, image)),
                    Err(e) => {
                        warn!("Failed to decode tile {coord:?}: {e}");
                        TileState::Failed
                    }
                }
            }
            Err(e) => {
                warn!("Failed to fetch tile {url}: {e}");
                TileState::Failed
            }
        };

        if let Ok(mut tiles) = tiles.lock() {
            tiles.insert(coord, state);
        }
        ctx.request_repaint();
    }

    #[must_use]
    pub fn has_loading_tiles(&self) -> bool {
        self.tiles
            .lock()
            .is_ok_and(|tiles| tiles.values().any(|s| matches!(s, TileState::Loading)))
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.tiles.lock().map_or(0, |tiles| {
            tiles.values().filter(|s| matches!(s, TileState::Failed)).count()
        })
    }
}

fn fetch(url: &str) -> Result<Vec<u8>, reqwest::Error> {
    let response = reqwest::blocking::get(url)?.error_for_status()?;
    Ok(response.bytes()?.to_vec())
}

fn load_texture(ctx: &egui::Context, coord: TileCoord, image: ColorImage) -> TextureHandle {
    ctx.load_texture(
        format!("tile_{}_{}/{}", coord.zoom, coord.x, coord.y),
        image,
        TextureOptions::LINEAR,
    )
}
