use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::*;

/// Why an image contributed no descriptors to the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradeReason {
    /// File is missing, unreadable or not a decodable image.
    Unreadable(String),
    /// The extractor failed or returned descriptors of the wrong shape.
    ExtractionFailed(String),
    /// The image was fine but no keypoints were detected.
    NoFeatures,
}

/// What happened to a single source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    Extracted(usize),
    Degraded(DegradeReason),
}

impl ImageOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ImageOutcome::Degraded(_))
    }
}

/// Per-file outcomes and timing of one aggregation pass.
#[derive(Debug, Clone, Default)]
pub struct AggregationReport {
    pub outcomes: Vec<(PathBuf, ImageOutcome)>,
    pub elapsed: Duration,
}

impl AggregationReport {
    pub fn degraded_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_degraded()).count()
    }

    pub fn descriptor_count(&self) -> usize {
        self.outcomes
            .iter()
            .map(|(_, o)| match o {
                ImageOutcome::Extracted(n) => *n,
                ImageOutcome::Degraded(_) => 0,
            })
            .sum()
    }

    /// Mean wall-clock time per image, zero for an empty pass.
    pub fn ms_per_image(&self) -> f32 {
        if self.outcomes.is_empty() {
            return 0.;
        }
        self.elapsed.as_secs_f32() * 1000. / self.outcomes.len() as f32
    }
}

/// Result of [`aggregate`]: the batch for the vocabulary builder and
/// the report describing how it was obtained.
#[derive(Debug)]
pub struct Aggregation {
    pub batch: FeatureBatch,
    pub report: AggregationReport,
}

/// Extract descriptors from every source image, in order.
///
/// `batch[i]` always corresponds to `paths[i]`. A file that cannot be read
/// or yields no keypoints contributes an empty set and the pass goes on.
pub fn aggregate<E: DescriptorExtractor + ?Sized>(
    paths: SourceFiles,
    extractor: &mut E,
) -> Aggregation {
    let start = Instant::now();
    let mut batch: FeatureBatch = Vec::with_capacity(paths.len());
    let mut outcomes = Vec::with_capacity(paths.len());

    info!("Extracting ORB features...");
    for path in paths {
        info!("loading {}", path.display());
        let (descs, outcome) = extract_file(&path, extractor);
        if let ImageOutcome::Degraded(reason) = &outcome {
            match reason {
                DegradeReason::NoFeatures => warn!("no features in {}", path.display()),
                DegradeReason::Unreadable(e) => {
                    warn!("skipping unreadable {}: {}", path.display(), e)
                }
                DegradeReason::ExtractionFailed(e) => {
                    warn!("extraction failed for {}: {}", path.display(), e)
                }
            }
        }
        batch.push(descs);
        outcomes.push((path, outcome));
    }

    let report = AggregationReport {
        outcomes,
        elapsed: start.elapsed(),
    };
    info!(
        "extracted ORB features in {} ms. Approx time per image: {} ms/img",
        report.elapsed.as_millis(),
        report.ms_per_image()
    );
    if report.degraded_count() > 0 {
        warn!(
            "{} of {} images contributed no descriptors",
            report.degraded_count(),
            report.outcomes.len()
        );
    }
    Aggregation { batch, report }
}

fn extract_file<E: DescriptorExtractor + ?Sized>(
    path: &std::path::Path,
    extractor: &mut E,
) -> (ImageDescriptors, ImageOutcome) {
    let degraded = |r| (Vec::new(), ImageOutcome::Degraded(r));

    let image = match load_gray(path) {
        Ok(image) => image,
        Err(e) => return degraded(DegradeReason::Unreadable(e.to_string())),
    };
    let descs = match extractor.extract(&image).and_then(|m| m.split_rows()) {
        Ok(descs) => descs,
        Err(e) => return degraded(DegradeReason::ExtractionFailed(e.to_string())),
    };
    match descs.len() {
        0 => degraded(DegradeReason::NoFeatures),
        n => (descs, ImageOutcome::Extracted(n)),
    }
}
