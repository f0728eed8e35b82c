//! Annotated sheet-music dataset
//!
//! Layout: `<root>/<score>/img/<page>.png` next to
//! `<root>/<score>/json/<page>.json`.

mod annotation;
pub mod yolo;

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::GrayImage;
use parking_lot::Mutex;

use crate::detection::{DetectError, DetectResult, NormalizedImage, normalize};

pub use annotation::{MeasureAnnotation, PageAnnotation, Target};

/// Image and annotation file of one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEntry {
    pub image_path: PathBuf,
    pub annotation_path: PathBuf,
}

/// A decoded page with its measures
#[derive(Debug, Clone)]
pub struct AnnotatedPage {
    pub image: GrayImage,
    pub annotation: PageAnnotation,
}

/// Detector-ready training sample
#[derive(Debug, Clone)]
pub struct Sample {
    pub image: NormalizedImage,
    pub target: Target,
}

/// Bounded least-recently-used sample cache
struct SampleCache {
    capacity: usize,
    entries: HashMap<usize, Arc<Sample>>,
    order: VecDeque<usize>,
}

impl SampleCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&mut self, idx: usize) -> Option<Arc<Sample>> {
        let sample = self.entries.get(&idx)?.clone();
        self.touch(idx);
        Some(sample)
    }

    fn insert(&mut self, idx: usize, sample: Arc<Sample>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(idx, sample).is_some() {
            self.touch(idx);
            return;
        }
        self.order.push_back(idx);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
    }

    fn touch(&mut self, idx: usize) {
        if let Some(pos) = self.order.iter().position(|&i| i == idx) {
            self.order.remove(pos);
        }
        self.order.push_back(idx);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Pages found under a dataset root
pub struct MeasureDataset {
    root: PathBuf,
    pages: Vec<PageEntry>,
    cache: Mutex<SampleCache>,
}

impl MeasureDataset {
    /// Scan `root` for annotated pages
    ///
    /// Images without a matching annotation file are skipped. Pages are
    /// ordered by path.
    pub fn open(root: impl AsRef<Path>, cache_capacity: usize) -> DetectResult<Self> {
        let root = root.as_ref().to_path_buf();
        let mut pages = Vec::new();

        for score in std::fs::read_dir(&root)? {
            let score_dir = score?.path();
            let img_dir = score_dir.join("img");
            let json_dir = score_dir.join("json");
            if !img_dir.is_dir() || !json_dir.is_dir() {
                continue;
            }

            for file in std::fs::read_dir(&img_dir)? {
                let image_path = file?.path();
                if image_path.extension().and_then(|e| e.to_str()) != Some("png") {
                    continue;
                }
                let Some(stem) = image_path.file_stem() else {
                    continue;
                };
                let annotation_path = json_dir.join(format!("{}.json", stem.to_string_lossy()));
                if annotation_path.is_file() {
                    pages.push(PageEntry {
                        image_path,
                        annotation_path,
                    });
                } else {
                    tracing::debug!("no annotation for {}", image_path.display());
                }
            }
        }

        pages.sort_by(|a, b| a.image_path.cmp(&b.image_path));
        tracing::info!(root = %root.display(), pages = pages.len(), "opened dataset");

        Ok(Self {
            root,
            pages,
            cache: Mutex::new(SampleCache::new(cache_capacity)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn entries(&self) -> &[PageEntry] {
        &self.pages
    }

    fn entry(&self, idx: usize) -> DetectResult<&PageEntry> {
        self.pages.get(idx).ok_or_else(|| {
            DetectError::InvalidImage(format!(
                "page index {idx} out of range ({} pages)",
                self.pages.len()
            ))
        })
    }

    /// Decode page `idx` without padding
    pub fn page(&self, idx: usize) -> DetectResult<AnnotatedPage> {
        let entry = self.entry(idx)?;
        let image = image::open(&entry.image_path)?.to_luma8();
        let annotation = PageAnnotation::from_file(&entry.annotation_path)?;
        Ok(AnnotatedPage { image, annotation })
    }

    /// Padded image and target for page `idx`
    pub fn sample(&self, idx: usize) -> DetectResult<Arc<Sample>> {
        if let Some(sample) = self.cache.lock().get(idx) {
            return Ok(sample);
        }

        let page = self.page(idx)?;
        let sample = Arc::new(Sample {
            image: normalize(&page.image)?,
            target: page.annotation.target(),
        });
        self.cache.lock().insert(idx, sample.clone());
        Ok(sample)
    }

    /// Number of samples currently cached
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}
