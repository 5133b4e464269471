//! Layout snapshots of failing elements with baseline comparison
//!
//! There is no rendering engine behind the document, so a capture is a
//! box diagram of the element's rect: its effective background, and every
//! descendant box outlined in its text color. That is enough to catch
//! layout and color regressions between runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{GenericImageView, Pixel, RgbaImage};
use pagecheck_common::color::{background_color, foreground_color};
use pagecheck_common::{Document, ElementQuery, NodeId, Rect, Rgba};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::ScreenshotConfig;
use crate::error::{RunnerError, RunnerResult};
use crate::events::{Outcome, TestResult};
use crate::plugins::Plugin;
use crate::runner::{Execution, RunHook, Runner};

/// Largest capture edge in pixels
const MAX_DIMENSION: f64 = 4096.0;

/// Allowed per-channel difference (anti-aliasing, compression)
const TOLERANCE: i32 = 5;

/// Result of a visual comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualDiff {
    /// Whether the images match (within threshold)
    pub matches: bool,
    /// Percentage of pixels that differ
    pub diff_percent: f64,
    pub diff_pixels: u64,
    pub total_pixels: u64,
    pub diff_image_path: Option<PathBuf>,
    pub actual_hash: String,
    pub baseline_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotRecord {
    pub name: String,
    pub path: PathBuf,
    pub hash: String,
    /// Comparison against the baseline, when one exists
    pub diff: Option<VisualDiff>,
}

fn to_pixel(color: Rgba) -> image::Rgba<u8> {
    let opaque = color.over(Rgba::WHITE);
    image::Rgba([opaque.r, opaque.g, opaque.b, 255])
}

fn fill(image: &mut RgbaImage, area: Rect, color: image::Rgba<u8>, outline: Option<image::Rgba<u8>>) {
    let x0 = area.x.max(0.0).floor() as u32;
    let y0 = area.y.max(0.0).floor() as u32;
    let x1 = (area.right().ceil() as u32).min(image.width());
    let y1 = (area.bottom().ceil() as u32).min(image.height());
    for y in y0..y1 {
        for x in x0..x1 {
            let on_edge = x == x0 || y == y0 || x + 1 == x1 || y + 1 == y1;
            let pixel = match outline {
                Some(edge) if on_edge => edge,
                _ => color,
            };
            image.put_pixel(x, y, pixel);
        }
    }
}

/// Draw the box diagram of `node` at its rect size
pub fn render_element(doc: &Document, node: NodeId) -> RgbaImage {
    let rect = doc.rect(node);
    let width = rect.width.round().clamp(1.0, MAX_DIMENSION) as u32;
    let height = rect.height.round().clamp(1.0, MAX_DIMENSION) as u32;

    let mut image = RgbaImage::from_pixel(width, height, to_pixel(background_color(doc, node)));
    for descendant in doc.descendant_elements(node) {
        let inner = doc.rect(descendant);
        if inner.is_empty() {
            continue;
        }
        let local = inner.translate(-rect.x, -rect.y);
        fill(
            &mut image,
            local,
            to_pixel(background_color(doc, descendant)),
            Some(to_pixel(foreground_color(doc, descendant))),
        );
    }
    image
}

/// Hash a file using SHA256
fn hash_file(path: &Path) -> RunnerResult<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

fn pixels_differ(a: &image::Rgba<u8>, b: &image::Rgba<u8>) -> bool {
    a.channels()
        .iter()
        .zip(b.channels())
        .any(|(x, y)| (*x as i32 - *y as i32).abs() > TOLERANCE)
}

/// File-name-safe capture name
fn capture_name(execution: &Execution) -> String {
    let raw = format!("{}-{}-{}", execution.suite, execution.test, execution.element.0);
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// Owns the capture, baseline and diff directories
struct ScreenshotStore {
    config: ScreenshotConfig,
}

impl ScreenshotStore {
    fn actual_path(&self, name: &str) -> PathBuf {
        self.config.output_dir.join(format!("{}.png", name))
    }

    fn baseline_path(&self, name: &str) -> PathBuf {
        self.config.baseline_dir.join(format!("{}.png", name))
    }

    fn capture(&self, doc: &Document, node: NodeId, name: &str) -> RunnerResult<ScreenshotRecord> {
        std::fs::create_dir_all(&self.config.output_dir)?;
        let path = self.actual_path(name);
        render_element(doc, node).save(&path)?;
        let hash = hash_file(&path)?;
        debug!("Captured '{}' to {}", name, path.display());

        let diff = if self.config.update_baselines {
            self.update_baseline(name)?;
            None
        } else {
            match self.compare(name) {
                Ok(diff) => Some(diff),
                Err(RunnerError::BaselineNotFound(_)) => {
                    info!("No baseline for '{}' - will be created with update_baselines", name);
                    None
                }
                Err(e) => return Err(e),
            }
        };

        Ok(ScreenshotRecord {
            name: name.to_string(),
            path,
            hash,
            diff,
        })
    }

    /// Compare a capture against its baseline
    fn compare(&self, name: &str) -> RunnerResult<VisualDiff> {
        let actual_path = self.actual_path(name);
        let baseline_path = self.baseline_path(name);
        if !baseline_path.exists() {
            return Err(RunnerError::BaselineNotFound(baseline_path.display().to_string()));
        }

        let actual_hash = hash_file(&actual_path)?;
        let baseline_hash = hash_file(&baseline_path)?;
        let actual_img = image::open(&actual_path)?;
        let baseline_img = image::open(&baseline_path)?;
        let (width, height) = actual_img.dimensions();
        let total_pixels = (width as u64) * (height as u64);

        if actual_hash == baseline_hash {
            return Ok(VisualDiff {
                matches: true,
                diff_percent: 0.0,
                diff_pixels: 0,
                total_pixels,
                diff_image_path: None,
                actual_hash,
                baseline_hash,
            });
        }

        if actual_img.dimensions() != baseline_img.dimensions() {
            warn!(
                "Capture dimensions differ for '{}': actual {:?} vs baseline {:?}",
                name,
                actual_img.dimensions(),
                baseline_img.dimensions()
            );
        }

        let actual = actual_img.to_rgba8();
        let baseline = baseline_img.to_rgba8();
        let mut diff_img = RgbaImage::new(width, height);
        // Pixels outside the overlapping region count as different
        let mut diff_pixels = total_pixels
            - (width.min(baseline.width()) as u64) * (height.min(baseline.height()) as u64);

        for y in 0..height {
            for x in 0..width {
                let actual_pixel = actual.get_pixel(x, y);
                let differs = x >= baseline.width()
                    || y >= baseline.height()
                    || pixels_differ(actual_pixel, baseline.get_pixel(x, y));
                if differs {
                    if x < baseline.width() && y < baseline.height() {
                        diff_pixels += 1;
                    }
                    diff_img.put_pixel(x, y, image::Rgba([255, 0, 0, 255]));
                } else {
                    let channels = actual_pixel.channels();
                    diff_img.put_pixel(
                        x,
                        y,
                        image::Rgba([channels[0] / 2, channels[1] / 2, channels[2] / 2, 128]),
                    );
                }
            }
        }

        let diff_percent = (diff_pixels as f64 / total_pixels as f64) * 100.0;
        let matches = diff_percent <= self.config.threshold;
        let diff_image_path = if diff_pixels > 0 {
            std::fs::create_dir_all(&self.config.diff_dir)?;
            let path = self.config.diff_dir.join(format!("{}-diff.png", name));
            diff_img.save(&path)?;
            Some(path)
        } else {
            None
        };

        if !matches {
            warn!(
                "Visual regression detected in '{}': {:.2}% pixels differ (threshold: {:.2}%)",
                name, diff_percent, self.config.threshold
            );
        }

        Ok(VisualDiff {
            matches,
            diff_percent,
            diff_pixels,
            total_pixels,
            diff_image_path,
            actual_hash,
            baseline_hash,
        })
    }

    fn update_baseline(&self, name: &str) -> RunnerResult<()> {
        let actual_path = self.actual_path(name);
        std::fs::create_dir_all(&self.config.baseline_dir)?;
        std::fs::copy(&actual_path, self.baseline_path(name))?;
        info!("Updated baseline for '{}'", name);
        Ok(())
    }

    fn list_baselines(&self) -> RunnerResult<Vec<String>> {
        if !self.config.baseline_dir.exists() {
            return Ok(Vec::new());
        }
        let mut baselines = Vec::new();
        for entry in std::fs::read_dir(&self.config.baseline_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "png") {
                if let Some(name) = path.file_stem() {
                    baselines.push(name.to_string_lossy().to_string());
                }
            }
        }
        baselines.sort();
        Ok(baselines)
    }
}

struct ScreenshotHook {
    store: Arc<ScreenshotStore>,
    records: Arc<Mutex<Vec<ScreenshotRecord>>>,
}

impl RunHook for ScreenshotHook {
    fn name(&self) -> &str {
        "screenshot"
    }

    fn after_execution(&self, doc: &mut Document, execution: &Execution, result: &TestResult) {
        if result.outcome != Outcome::Fail || !doc.is_element(execution.element) {
            return;
        }
        match self.store.capture(doc, execution.element, &capture_name(execution)) {
            Ok(record) => self.records.lock().push(record),
            Err(e) => warn!("Screenshot of {} failed: {}", execution.element, e),
        }
    }
}

pub struct ScreenshotPlugin {
    config: ScreenshotConfig,
}

impl ScreenshotPlugin {
    pub fn new(config: ScreenshotConfig) -> Self {
        Self { config }
    }
}

#[derive(Clone)]
pub struct ScreenshotHandle {
    store: Arc<ScreenshotStore>,
    records: Arc<Mutex<Vec<ScreenshotRecord>>>,
}

impl ScreenshotHandle {
    /// Captures taken for failed executions
    pub fn captures(&self) -> Vec<ScreenshotRecord> {
        self.records.lock().clone()
    }

    /// Captures whose baseline comparison failed
    pub fn regressions(&self) -> Vec<ScreenshotRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.diff.as_ref().is_some_and(|d| !d.matches))
            .cloned()
            .collect()
    }

    /// Capture any element on demand
    pub fn capture(&self, doc: &Document, node: NodeId, name: &str) -> RunnerResult<ScreenshotRecord> {
        self.store.capture(doc, node, name)
    }

    /// Compare a capture against its baseline, failing when it regressed
    pub fn compare(&self, name: &str) -> RunnerResult<VisualDiff> {
        let diff = self.store.compare(name)?;
        if !diff.matches {
            return Err(RunnerError::ScreenshotMismatch {
                name: name.to_string(),
                diff_percent: diff.diff_percent,
                threshold: self.store.config.threshold,
            });
        }
        Ok(diff)
    }

    pub fn update_baseline(&self, name: &str) -> RunnerResult<()> {
        self.store.update_baseline(name)
    }

    pub fn list_baselines(&self) -> RunnerResult<Vec<String>> {
        self.store.list_baselines()
    }
}

impl Plugin for ScreenshotPlugin {
    type Handle = ScreenshotHandle;

    fn name(&self) -> &'static str {
        "screenshot"
    }

    fn install(self, runner: &Runner) -> ScreenshotHandle {
        let store = Arc::new(ScreenshotStore { config: self.config });
        let records = Arc::new(Mutex::new(Vec::new()));
        runner.add_hook(Arc::new(ScreenshotHook {
            store: store.clone(),
            records: records.clone(),
        }));
        ScreenshotHandle { store, records }
    }
}
