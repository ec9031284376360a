//! Template loading, resolution scaling and caching
//!
//! Templates are authored at 1920×1080. Each one is scaled to the live client
//! size on first use and cached under (template, width, height), so a change
//! of resolution simply produces new cache keys.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::templates::Template;
use crate::error::Result;
use crate::input::REFERENCE_SIZE;

/// Maximum number of scaled templates kept in memory
pub const CACHE_CAPACITY: usize = 64;

/// Source of raw template images
pub trait TemplateStore: Send + Sync {
    fn contains(&self, file_name: &str) -> bool;
    /// Decode a template; `Ok(None)` when the file does not exist
    fn load(&self, file_name: &str) -> Result<Option<DynamicImage>>;
}

/// Templates read from a directory on disk
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TemplateStore for DirectoryStore {
    fn contains(&self, file_name: &str) -> bool {
        self.root.join(file_name).is_file()
    }

    fn load(&self, file_name: &str) -> Result<Option<DynamicImage>> {
        let path = self.root.join(file_name);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(image::open(path)?))
    }
}

/// In-memory template set (for testing and embedding)
#[derive(Default)]
pub struct MemoryStore {
    images: HashMap<String, DynamicImage>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_name: impl Into<String>, image: DynamicImage) {
        self.images.insert(file_name.into(), image);
    }

    pub fn with_template(mut self, template: Template, image: DynamicImage) -> Self {
        self.insert(template.file_name(), image);
        self
    }
}

impl TemplateStore for MemoryStore {
    fn contains(&self, file_name: &str) -> bool {
        self.images.contains_key(file_name)
    }

    fn load(&self, file_name: &str) -> Result<Option<DynamicImage>> {
        Ok(self.images.get(file_name).cloned())
    }
}

/// A template resized for one client resolution
#[derive(Debug)]
pub struct ScaledTemplate {
    pub gray: GrayImage,
    pub color: RgbImage,
    /// Alpha channel, present only for masked templates that carry one
    pub mask: Option<GrayImage>,
}

impl ScaledTemplate {
    pub fn size(&self) -> (u32, u32) {
        self.gray.dimensions()
    }

    /// Scale a raw template from reference resolution to `client`
    pub fn from_image(raw: &DynamicImage, client: (u32, u32), keep_mask: bool) -> Self {
        let (tw, th) = (raw.width(), raw.height());
        let (nw, nh) = scaled_size((tw, th), client);

        let mut gray = raw.to_luma8();
        let mut color = raw.to_rgb8();
        let mut mask = if keep_mask && raw.color().has_alpha() {
            let rgba = raw.to_rgba8();
            Some(GrayImage::from_fn(tw, th, |x, y| {
                Luma([rgba.get_pixel(x, y)[3]])
            }))
        } else {
            None
        };

        if (nw, nh) != (tw, th) {
            gray = imageops::resize(&gray, nw, nh, FilterType::Triangle);
            color = imageops::resize(&color, nw, nh, FilterType::Triangle);
            mask = mask.map(|m| imageops::resize(&m, nw, nh, FilterType::Nearest));
        }

        Self { gray, color, mask }
    }
}

/// Template size at `client` resolution, never below one pixel
pub fn scaled_size(template: (u32, u32), client: (u32, u32)) -> (u32, u32) {
    let (rw, rh) = REFERENCE_SIZE;
    let nw = (u64::from(template.0) * u64::from(client.0) / u64::from(rw)).max(1);
    let nh = (u64::from(template.1) * u64::from(client.1) / u64::from(rh)).max(1);
    (nw as u32, nh as u32)
}

type CacheKey = (Template, u32, u32);

/// Least-recently-used map of scaled templates
struct LruCache {
    entries: Vec<(CacheKey, Arc<ScaledTemplate>)>,
    capacity: usize,
}

impl LruCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Look up and mark as most recently used
    fn get(&mut self, key: &CacheKey) -> Option<Arc<ScaledTemplate>> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        let entry = self.entries.remove(idx);
        let value = entry.1.clone();
        self.entries.push(entry);
        Some(value)
    }

    fn insert(&mut self, key: CacheKey, value: Arc<ScaledTemplate>) {
        if let Some(idx) = self.entries.iter().position(|(k, _)| *k == key) {
            self.entries.remove(idx);
        } else if self.entries.len() >= self.capacity {
            self.entries.remove(0);
        }
        self.entries.push((key, value));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Scaled template cache in front of a [`TemplateStore`]
pub struct TemplateCatalog {
    store: Box<dyn TemplateStore>,
    cache: Mutex<LruCache>,
    loads: AtomicUsize,
}

impl TemplateCatalog {
    pub fn new(store: impl TemplateStore + 'static) -> Self {
        Self::with_capacity(store, CACHE_CAPACITY)
    }

    pub fn with_capacity(store: impl TemplateStore + 'static, capacity: usize) -> Self {
        Self {
            store: Box::new(store),
            cache: Mutex::new(LruCache::new(capacity.max(1))),
            loads: AtomicUsize::new(0),
        }
    }

    /// Whether the raw template file exists
    pub fn contains(&self, template: Template) -> bool {
        self.store.contains(template.file_name())
            || template
                .masked_file_name()
                .map_or(false, |name| self.store.contains(&name))
    }

    /// Scaled template for `client`, loading it on a cache miss.
    ///
    /// Missing or undecodable templates yield `None` (and a warning for the
    /// latter); they are not cached, so a fixed file is picked up next call.
    pub fn get(&self, template: Template, client: (u32, u32)) -> Option<Arc<ScaledTemplate>> {
        let key = (template, client.0, client.1);
        if let Some(hit) = self.cache.lock().get(&key) {
            return Some(hit);
        }

        let file_name = template
            .masked_file_name()
            .filter(|name| self.store.contains(name))
            .unwrap_or_else(|| template.file_name().to_string());

        let raw = match self.store.load(&file_name) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to decode template {}: {}", file_name, e);
                return None;
            }
        };

        let scaled = Arc::new(ScaledTemplate::from_image(
            &raw,
            client,
            template.uses_mask(),
        ));
        self.loads.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Loaded template {} scaled to {:?} for {}x{}",
            file_name,
            scaled.size(),
            client.0,
            client.1
        );
        self.cache.lock().insert(key, scaled.clone());
        Some(scaled)
    }

    /// Number of decode-and-scale operations performed (cache misses)
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}
