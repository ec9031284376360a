//! Template matching
//!
//! Three strategies are available:
//!
//! - **Gray**: zero-mean normalised cross-correlation on grayscale frames.
//!   The default, tolerant of small colour shifts.
//! - **Masked**: squared difference over the opaque pixels of an alpha mask,
//!   normalised by the mask size so that scores of differently sized masks are
//!   comparable.
//! - **Edges**: Canny edge maps of frame and template, then the same
//!   normalised correlation as the gray strategy.
//!
//! A confidence of -1 is reserved for "window unavailable".

use image::{GrayImage, RgbImage};
use imageproc::edges::canny;
use imageproc::template_matching::{match_template, MatchTemplateMethod};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::capture::{CaptureMode, CaptureProvider};
use super::catalog::{ScaledTemplate, TemplateCatalog};
use super::templates::Template;
use crate::input::{Point, REFERENCE_SIZE};

const CANNY_LOW: f32 = 80.0;
const CANNY_HIGH: f32 = 200.0;
/// Normaliser of the masked score: mean squared error per mask pixel that
/// maps to zero confidence
const MASK_ERROR_SCALE: f64 = 4800.0;
const VARIANCE_EPSILON: f64 = 1e-6;

/// Options of a single match request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    /// Minimum confidence for `matched`
    pub threshold: f32,
    /// Use the occlusion-safe capture path
    pub background: bool,
    /// Force edge matching
    pub edges: bool,
}

impl MatchOptions {
    pub fn new() -> Self {
        Self {
            threshold: 0.8,
            background: false,
            edges: false,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn background(mut self) -> Self {
        self.background = true;
        self
    }

    pub fn with_edges(mut self) -> Self {
        self.edges = true;
        self
    }
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one match attempt
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Similarity in [-1, 1]; exactly -1 when the frame could not be captured
    pub confidence: f32,
    /// Centre of the best match, only when `matched`
    pub location: Option<Point>,
    /// Scaled template size
    pub size: (u32, u32),
}

impl MatchResult {
    /// The client window could not be captured
    pub fn unavailable() -> Self {
        Self {
            matched: false,
            confidence: -1.0,
            location: None,
            size: (0, 0),
        }
    }

    /// Nothing to compare against, or the template does not fit the frame
    pub fn absent(size: (u32, u32)) -> Self {
        Self {
            matched: false,
            confidence: 0.0,
            location: None,
            size,
        }
    }

    pub fn from_score(
        confidence: f32,
        top_left: (u32, u32),
        size: (u32, u32),
        threshold: f32,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let matched = confidence >= threshold;
        let location = matched.then(|| {
            Point::new(
                (top_left.0 + size.0 / 2) as i32,
                (top_left.1 + size.1 / 2) as i32,
            )
        });
        Self {
            matched,
            confidence,
            location,
            size,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.confidence < -0.5
    }

    fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Anything that can answer "is this template on screen"
pub trait Detector: Send + Sync {
    fn detect(&self, template: Template, opts: MatchOptions) -> MatchResult;

    /// Match several templates against one capture per mode
    fn detect_all(&self, requests: &[(Template, MatchOptions)]) -> Vec<MatchResult> {
        requests
            .iter()
            .map(|(template, opts)| self.detect(*template, *opts))
            .collect()
    }

    /// Whether the template file exists at all
    fn has_template(&self, _template: Template) -> bool {
        true
    }

    /// Live client size, used to scale reference coordinates
    fn client_size(&self) -> Option<(u32, u32)>;
}

/// Frames captured once and shared by every request of one `detect_all`
struct FrameSet<'a> {
    capture: &'a dyn CaptureProvider,
    mode: CaptureMode,
    gray: Option<GrayImage>,
    color: Option<Option<RgbImage>>,
}

impl<'a> FrameSet<'a> {
    fn grab(capture: &'a dyn CaptureProvider, mode: CaptureMode) -> Self {
        Self {
            capture,
            mode,
            gray: capture.capture_gray(mode),
            color: None,
        }
    }

    fn color(&mut self) -> Option<&RgbImage> {
        if self.color.is_none() {
            self.color = Some(self.capture.capture_color(self.mode));
        }
        self.color.as_ref().and_then(Option::as_ref)
    }
}

/// Detector backed by a live capture and a template catalog
pub struct Matcher {
    capture: Arc<dyn CaptureProvider>,
    catalog: TemplateCatalog,
}

impl Matcher {
    pub fn new(capture: Arc<dyn CaptureProvider>, catalog: TemplateCatalog) -> Self {
        Self { capture, catalog }
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    fn evaluate(&self, template: Template, opts: MatchOptions, frames: &mut FrameSet) -> MatchResult {
        let Some(client) = frames.gray.as_ref().map(|g| g.dimensions()) else {
            return MatchResult::unavailable();
        };
        let Some(scaled) = self.catalog.get(template, client) else {
            return MatchResult::absent((0, 0));
        };
        let size = scaled.size();
        let edges = opts.edges || template.prefers_edges();

        if scaled.mask.is_some() && !edges {
            let Some(color) = frames.color() else {
                return MatchResult::unavailable();
            };
            return match_masked(color, &scaled, opts.threshold);
        }

        let Some(gray) = frames.gray.as_ref() else {
            return MatchResult::unavailable();
        };
        if !fits(gray.dimensions(), size) {
            return MatchResult::absent(size);
        }
        let (score, at) = if edges {
            let frame_edges = canny(gray, CANNY_LOW, CANNY_HIGH);
            let template_edges = canny(&scaled.gray, CANNY_LOW, CANNY_HIGH);
            correlate_normed(&frame_edges, &template_edges)
        } else {
            correlate_normed(gray, &scaled.gray)
        };
        MatchResult::from_score(score, at, size, opts.threshold)
    }
}

impl Detector for Matcher {
    fn detect(&self, template: Template, opts: MatchOptions) -> MatchResult {
        let mut frames = FrameSet::grab(
            self.capture.as_ref(),
            CaptureMode::from_background(opts.background),
        );
        self.evaluate(template, opts, &mut frames)
    }

    fn detect_all(&self, requests: &[(Template, MatchOptions)]) -> Vec<MatchResult> {
        let mut sets: Vec<FrameSet> = Vec::with_capacity(2);
        requests
            .iter()
            .map(|(template, opts)| {
                let mode = CaptureMode::from_background(opts.background);
                let idx = match sets.iter().position(|s| s.mode == mode) {
                    Some(idx) => idx,
                    None => {
                        sets.push(FrameSet::grab(self.capture.as_ref(), mode));
                        sets.len() - 1
                    }
                };
                self.evaluate(*template, *opts, &mut sets[idx])
            })
            .collect()
    }

    fn has_template(&self, template: Template) -> bool {
        self.catalog.contains(template)
    }

    fn client_size(&self) -> Option<(u32, u32)> {
        self.capture.client_size()
    }
}

fn fits(frame: (u32, u32), template: (u32, u32)) -> bool {
    template.0 <= frame.0 && template.1 <= frame.1 && template.0 > 0 && template.1 > 0
}

fn match_masked(frame: &RgbImage, scaled: &ScaledTemplate, threshold: f32) -> MatchResult {
    let size = scaled.size();
    let Some(mask) = scaled.mask.as_ref() else {
        return MatchResult::absent(size);
    };
    if !fits(frame.dimensions(), size) {
        return MatchResult::absent(size);
    }
    let (score, at) = masked_difference(frame, &scaled.color, mask);
    MatchResult::from_score(score, at, size, threshold)
}

/// Summed-area tables of pixel values and their squares
struct Integral {
    width: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let width = w + 1;
        let mut sum = vec![0.0; width * (h + 1)];
        let mut sq = vec![0.0; width * (h + 1)];
        for y in 0..h {
            let mut row = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = f64::from(image.get_pixel(x as u32, y as u32)[0]);
                row += v;
                row_sq += v * v;
                let idx = (y + 1) * width + x + 1;
                sum[idx] = sum[idx - width] + row;
                sq[idx] = sq[idx - width] + row_sq;
            }
        }
        Self { width, sum, sq }
    }

    /// (Σv, Σv²) over the `w`×`h` window at (x, y)
    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let a = y * self.width + x;
        let b = y * self.width + x + w;
        let c = (y + h) * self.width + x;
        let d = (y + h) * self.width + x + w;
        (
            self.sum[d] - self.sum[b] - self.sum[c] + self.sum[a],
            self.sq[d] - self.sq[b] - self.sq[c] + self.sq[a],
        )
    }
}

/// Zero-mean normalised cross-correlation.
///
/// Returns the best score and the top-left corner where it occurs. Windows or
/// templates without variance score 0.
pub fn correlate_normed(frame: &GrayImage, template: &GrayImage) -> (f32, (u32, u32)) {
    let (fw, fh) = frame.dimensions();
    let (tw, th) = template.dimensions();
    if !fits((fw, fh), (tw, th)) {
        return (0.0, (0, 0));
    }

    let n = f64::from(tw) * f64::from(th);
    let (sum_t, sum_t2) = template.pixels().fold((0.0, 0.0), |(s, s2), p| {
        let v = f64::from(p[0]);
        (s + v, s2 + v * v)
    });
    let var_t = sum_t2 - sum_t * sum_t / n;
    if var_t <= VARIANCE_EPSILON {
        return (0.0, (0, 0));
    }

    let cross = match_template(frame, template, MatchTemplateMethod::CrossCorrelation);
    let integral = Integral::new(frame);

    let mut best = f64::NEG_INFINITY;
    let mut best_at = (0, 0);
    for y in 0..=(fh - th) {
        for x in 0..=(fw - tw) {
            let (sum_i, sum_i2) = integral.window(x as usize, y as usize, tw as usize, th as usize);
            let var_i = sum_i2 - sum_i * sum_i / n;
            let score = if var_i <= VARIANCE_EPSILON {
                0.0
            } else {
                let numerator = f64::from(cross.get_pixel(x, y)[0]) - sum_i * sum_t / n;
                numerator / (var_i * var_t).sqrt()
            };
            if score > best {
                best = score;
                best_at = (x, y);
            }
        }
    }

    let best = if best.is_finite() { best.clamp(-1.0, 1.0) } else { 0.0 };
    (best as f32, best_at)
}

/// Alpha-masked squared difference over RGB.
///
/// Confidence is `1 - min_ssd / (mask_pixels * 4800)`, floored at zero. An
/// empty mask scores zero.
pub fn masked_difference(
    frame: &RgbImage,
    template: &RgbImage,
    mask: &GrayImage,
) -> (f32, (u32, u32)) {
    let (fw, fh) = frame.dimensions();
    let (tw, th) = template.dimensions();
    if !fits((fw, fh), (tw, th)) {
        return (0.0, (0, 0));
    }

    let opaque: Vec<(u32, u32, [f64; 3])> = mask
        .enumerate_pixels()
        .filter(|(x, y, m)| m[0] > 0 && *x < tw && *y < th)
        .map(|(x, y, _)| {
            let p = template.get_pixel(x, y);
            (x, y, [f64::from(p[0]), f64::from(p[1]), f64::from(p[2])])
        })
        .collect();
    if opaque.is_empty() {
        return (0.0, (0, 0));
    }

    let mut best = f64::MAX;
    let mut best_at = (0, 0);
    for y in 0..=(fh - th) {
        for x in 0..=(fw - tw) {
            let mut ssd = 0.0;
            for (dx, dy, t) in &opaque {
                let p = frame.get_pixel(x + dx, y + dy);
                for c in 0..3 {
                    let d = f64::from(p[c]) - t[c];
                    ssd += d * d;
                }
                if ssd >= best {
                    break;
                }
            }
            if ssd < best {
                best = ssd;
                best_at = (x, y);
            }
        }
    }

    let confidence = (1.0 - best / (opaque.len() as f64 * MASK_ERROR_SCALE)).max(0.0);
    (confidence as f32, best_at)
}

// =============================================================================
// Scripted detector (for testing)
// =============================================================================

/// Calls and hits observed by a [`ScriptedDetector`]
#[derive(Debug, Default, Clone)]
pub struct History {
    calls: HashMap<Template, usize>,
    hits: HashMap<Template, usize>,
}

impl History {
    /// Number of times the template was asked for
    pub fn calls(&self, template: Template) -> usize {
        self.calls.get(&template).copied().unwrap_or(0)
    }

    /// Number of times the template was reported present
    pub fn hits(&self, template: Template) -> usize {
        self.hits.get(&template).copied().unwrap_or(0)
    }
}

type Rule = Arc<dyn Fn(&History) -> bool + Send + Sync>;

/// Detector whose answers come from per-template rules
///
/// Templates without a rule are absent. Rules see the call history, which
/// lets a script say things like "the login form appears after the main
/// screen was matched four times".
pub struct ScriptedDetector {
    rules: Mutex<HashMap<Template, Rule>>,
    locations: Mutex<HashMap<Template, Point>>,
    history: Mutex<History>,
    missing: Mutex<HashSet<Template>>,
    unavailable: AtomicBool,
    client: (u32, u32),
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(HashMap::new()),
            locations: Mutex::new(HashMap::new()),
            history: Mutex::new(History::default()),
            missing: Mutex::new(HashSet::new()),
            unavailable: AtomicBool::new(false),
            client: REFERENCE_SIZE,
        }
    }

    pub fn with_client_size(mut self, size: (u32, u32)) -> Self {
        self.client = size;
        self
    }

    /// Make the template permanently visible
    pub fn show(&self, template: Template) {
        self.when(template, |_| true);
    }

    /// Visible at a specific location
    pub fn show_at(&self, template: Template, at: Point) {
        self.locations.lock().insert(template, at);
        self.show(template);
    }

    pub fn hide(&self, template: Template) {
        self.rules.lock().remove(&template);
    }

    /// Visible whenever `rule` holds
    pub fn when<F>(&self, template: Template, rule: F)
    where
        F: Fn(&History) -> bool + Send + Sync + 'static,
    {
        self.rules.lock().insert(template, Arc::new(rule));
    }

    /// Pretend the template file does not exist
    pub fn remove_template(&self, template: Template) {
        self.missing.lock().insert(template);
    }

    /// Simulate the client window disappearing
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn history(&self) -> History {
        self.history.lock().clone()
    }

    pub fn calls(&self, template: Template) -> usize {
        self.history.lock().calls(template)
    }

    pub fn hits(&self, template: Template) -> usize {
        self.history.lock().hits(template)
    }

    /// Default location: centre of the reference screen
    fn location_of(&self, template: Template) -> Point {
        self.locations
            .lock()
            .get(&template)
            .copied()
            .unwrap_or(Point::new(960, 540))
    }
}

impl Default for ScriptedDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for ScriptedDetector {
    fn detect(&self, template: Template, opts: MatchOptions) -> MatchResult {
        if self.unavailable.load(Ordering::SeqCst) {
            return MatchResult::unavailable();
        }
        if self.missing.lock().contains(&template) {
            return MatchResult::absent((0, 0));
        }
        let rule = self.rules.lock().get(&template).cloned();

        let mut history = self.history.lock();
        let present = rule.map_or(false, |rule| rule(&*history));
        *history.calls.entry(template).or_insert(0) += 1;
        if present {
            *history.hits.entry(template).or_insert(0) += 1;
        }
        drop(history);

        let size = (40, 20);
        if present {
            let matched = 0.95 >= opts.threshold;
            MatchResult {
                matched,
                confidence: 0.95,
                location: matched.then(|| self.location_of(template)),
                size,
            }
        } else {
            MatchResult::absent(size).with_confidence(0.1)
        }
    }

    fn has_template(&self, template: Template) -> bool {
        !self.missing.lock().contains(&template)
    }

    fn client_size(&self) -> Option<(u32, u32)> {
        if self.unavailable.load(Ordering::SeqCst) {
            None
        } else {
            Some(self.client)
        }
    }
}
