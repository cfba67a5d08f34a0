//! Batch watermark removal over a manga directory.

use std::collections::{HashMap, HashSet};
use std::iter;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::background::BackgroundPair;
use crate::blending;
use crate::codec::{self, Dimensions, OutputFormat};
use crate::error::{Error, Result};
use crate::events::{CancellationToken, EventSink, RemoveWatermarkEvent};
use crate::scanner;

/// Outcomes buffered between the workers and the event aggregator.
const OUTCOME_BUFFER: usize = 64;

/// Background pairs to use during a run, keyed by page dimensions.
#[derive(Debug, Clone, Default)]
pub struct BackgroundSet {
    pairs: HashMap<Dimensions, BackgroundPair>,
}

impl BackgroundSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pair, returning the one it replaces for the same dimensions.
    pub fn insert(&mut self, pair: BackgroundPair) -> Option<BackgroundPair> {
        self.pairs.insert(pair.dimensions(), pair)
    }

    /// The pair for pages of size `dimensions`.
    #[must_use]
    pub fn get(&self, dimensions: Dimensions) -> Option<&BackgroundPair> {
        self.pairs.get(&dimensions)
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the set holds no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl FromIterator<BackgroundPair> for BackgroundSet {
    fn from_iter<I: IntoIterator<Item = BackgroundPair>>(iter: I) -> Self {
        let mut set = Self::new();
        for pair in iter {
            set.insert(pair);
        }
        set
    }
}

/// What a removal run reads and where it writes.
#[derive(Debug, Clone)]
pub struct RemovalJob {
    /// Directory holding the watermarked pages.
    pub manga_dir: PathBuf,
    /// Directory recovered pages are written to.
    pub output_dir: PathBuf,
    /// Format of the recovered pages.
    pub format: OutputFormat,
    /// Run the lossless size-reduction pass on output.
    pub optimize: bool,
    /// Worker threads; `None` uses the available parallelism.
    pub workers: Option<usize>,
}

/// Totals of a finished removal run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Files found in the manga directory.
    pub total: u32,
    /// Files recovered and written.
    pub succeeded: u32,
    /// Files that failed.
    pub failed: u32,
    /// Whether the run stopped early on request.
    pub cancelled: bool,
}

/// Output paths for `inputs`, one per input and never shared.
///
/// An input is written as `<output_dir>/<stem>.<ext>` unless an earlier input
/// already claimed that name (compared case-insensitively). Later claimants
/// keep their source extension (`a.bmp` becomes `a.bmp.png`), then fall back
/// to a numeric suffix.
#[must_use]
pub fn plan_outputs(inputs: &[PathBuf], output_dir: &Path, format: OutputFormat) -> Vec<PathBuf> {
    let ext = format.extension();
    let mut claimed = HashSet::new();

    inputs
        .iter()
        .map(|input| {
            let stem = input.file_stem().unwrap_or_default().to_string_lossy();
            let name = iter::once(format!("{stem}.{ext}"))
                .chain(
                    input
                        .extension()
                        .map(|src| format!("{stem}.{}.{ext}", src.to_string_lossy())),
                )
                .chain((2u32..).map(|n| format!("{stem}-{n}.{ext}")))
                .find(|name| claimed.insert(name.to_lowercase()))
                .unwrap_or_default();
            output_dir.join(name)
        })
        .collect()
}

/// Process a single page: load, recover, save.
///
/// # Errors
///
/// Returns [`Error::Decode`] if `input` cannot be decoded,
/// [`Error::NoBackgroundPair`] if `backgrounds` has no pair for its size, and
/// [`Error::Encode`] / [`Error::Write`] if the output cannot be written.
pub fn process_file(
    input: &Path,
    output: &Path,
    backgrounds: &BackgroundSet,
    format: OutputFormat,
    optimize: bool,
) -> Result<()> {
    let mut pixels = codec::decode_image(input)?.pixels;
    let dimensions = Dimensions::of(&pixels);
    let pair = backgrounds
        .get(dimensions)
        .ok_or(Error::NoBackgroundPair(dimensions))?;

    blending::remove_watermark(&mut pixels, pair)?;
    codec::save_image(&pixels, output, format, optimize)?;
    debug!("{} -> {}", input.display(), output.display());
    Ok(())
}

/// Check the job's directories before any file is touched, creating the
/// output directory if needed.
fn prepare_output(job: &RemovalJob) -> Result<()> {
    scanner::ensure_directory(&job.manga_dir)?;

    if job.output_dir.as_os_str().is_empty() {
        return Err(Error::InvalidConfig("output directory is not set".to_string()));
    }
    if job.output_dir.exists() && !job.output_dir.is_dir() {
        return Err(Error::InvalidConfig(format!(
            "output path `{}` is not a directory",
            job.output_dir.display()
        )));
    }
    std::fs::create_dir_all(&job.output_dir).map_err(|source| Error::Write {
        path: job.output_dir.clone(),
        source,
    })?;

    if job.output_dir.canonicalize()? == job.manga_dir.canonicalize()? {
        return Err(Error::InvalidConfig(
            "output directory must differ from the manga directory".to_string(),
        ));
    }
    Ok(())
}

/// Remove watermarks from every page in a manga directory.
///
/// Pages are routed to the pair matching their own dimensions and processed
/// on a bounded worker pool. Per-page outcomes are reported only through
/// `sink`: one `Start`, one `Success` or `Error` per page, then one `End`.
/// Once `cancel` fires no new page is started, and `End` is still emitted.
///
/// # Errors
///
/// Only batch-level problems are returned, before any page is processed:
/// a missing manga directory, an unusable or unwritable output directory,
/// or a worker pool that cannot be built.
pub fn process_directory(
    job: &RemovalJob,
    backgrounds: &BackgroundSet,
    sink: &dyn EventSink,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    prepare_output(job)?;
    let inputs = scanner::list_image_files(&job.manga_dir)?;
    let outputs = plan_outputs(&inputs, &job.output_dir, job.format);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(job.workers.unwrap_or(0))
        .build()?;

    let total = u32::try_from(inputs.len())
        .map_err(|_| Error::InvalidConfig("too many files in one directory".to_string()))?;
    let dir_path = job.manga_dir.clone();
    let mut summary = RunSummary {
        total,
        ..RunSummary::default()
    };

    info!(
        "removing watermarks from {} files in {}",
        total,
        dir_path.display()
    );
    sink.emit(RemoveWatermarkEvent::Start {
        dir_path: dir_path.clone(),
        total,
    });

    let (tx, rx) = mpsc::sync_channel::<(PathBuf, Result<()>)>(OUTCOME_BUFFER);
    let (inputs, outputs, pool) = (&inputs, &outputs, &pool);

    std::thread::scope(|scope| {
        scope.spawn(move || {
            pool.install(|| {
                inputs
                    .par_iter()
                    .zip(outputs.par_iter())
                    .for_each_with(tx, |tx, (input, output)| {
                        if cancel.is_cancelled() {
                            return;
                        }
                        let outcome =
                            process_file(input, output, backgrounds, job.format, job.optimize);
                        let _ = tx.send((input.clone(), outcome));
                    });
            });
        });

        for (img_path, outcome) in rx {
            match outcome {
                Ok(()) => {
                    summary.succeeded += 1;
                    sink.emit(RemoveWatermarkEvent::Success {
                        dir_path: dir_path.clone(),
                        img_path,
                        current: summary.succeeded + summary.failed,
                    });
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!("{}: {e}", img_path.display());
                    sink.emit(RemoveWatermarkEvent::Error {
                        dir_path: dir_path.clone(),
                        img_path,
                        err_msg: e.to_string(),
                    });
                }
            }
        }
    });

    summary.cancelled = cancel.is_cancelled();
    info!(
        "finished {}: {} succeeded, {} failed{}",
        dir_path.display(),
        summary.succeeded,
        summary.failed,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    sink.emit(RemoveWatermarkEvent::End { dir_path });

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::background::Rect;

    fn identity_pair(width: u32, height: u32) -> BackgroundPair {
        let dims = Dimensions::new(width, height);
        BackgroundPair::new(
            dims,
            Rect::full(dims),
            RgbImage::from_pixel(width, height, Rgb([0, 0, 0])),
            RgbImage::from_pixel(width, height, Rgb([255, 255, 255])),
        )
        .unwrap()
    }

    #[test]
    fn plan_replaces_extension() {
        let inputs = vec![PathBuf::from("/manga/001.jpg"), PathBuf::from("/manga/page.PNG")];
        assert_eq!(
            plan_outputs(&inputs, Path::new("/out"), OutputFormat::Png),
            vec![PathBuf::from("/out/001.png"), PathBuf::from("/out/page.png")]
        );
        assert_eq!(
            plan_outputs(&inputs[1..], Path::new("out"), OutputFormat::Jpeg),
            vec![PathBuf::from("out/page.jpg")]
        );
    }

    #[test]
    fn plan_never_shares_an_output() {
        let inputs = vec![
            PathBuf::from("m/a.bmp"),
            PathBuf::from("m/a.png"),
            PathBuf::from("m/A.webp"),
            PathBuf::from("m/a.jpg.png"),
            PathBuf::from("m/a.jpg"),
        ];
        let outputs = plan_outputs(&inputs, Path::new("out"), OutputFormat::Png);
        assert_eq!(
            outputs,
            vec![
                PathBuf::from("out/a.png"),
                PathBuf::from("out/a.png.png"),
                PathBuf::from("out/A.webp.png"),
                PathBuf::from("out/a.jpg.png"),
                PathBuf::from("out/a-2.png"),
            ]
        );
    }

    #[test]
    fn background_set_keeps_last_pair_per_dimensions() {
        let mut set: BackgroundSet = [identity_pair(4, 4), identity_pair(8, 2)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
        assert!(set.insert(identity_pair(4, 4)).is_some());
        assert_eq!(set.len(), 2);
        assert!(set.get(Dimensions::new(8, 2)).is_some());
        assert!(set.get(Dimensions::new(2, 8)).is_none());
    }

    #[test]
    fn process_file_without_pair_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.png");
        RgbImage::new(6, 9).save(&input).unwrap();

        let result = process_file(
            &input,
            &dir.path().join("out.png"),
            &BackgroundSet::new(),
            OutputFormat::Png,
            false,
        );
        match result {
            Err(e) => assert_eq!(e.to_string(), "no background pair for dimensions 6x9"),
            Ok(()) => panic!("expected an error"),
        }
    }

    #[test]
    fn process_file_writes_recovered_page() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.png");
        let page = RgbImage::from_pixel(5, 5, Rgb([12, 34, 56]));
        page.save(&input).unwrap();

        let output = dir.path().join("out").join("page.png");
        let set: BackgroundSet = std::iter::once(identity_pair(5, 5)).collect();
        process_file(&input, &output, &set, OutputFormat::Png, true).unwrap();

        let written = image::open(&output).unwrap().to_rgb8();
        assert_eq!(written, page);
    }

    #[test]
    fn output_dir_equal_to_manga_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let job = RemovalJob {
            manga_dir: dir.path().to_path_buf(),
            output_dir: dir.path().to_path_buf(),
            format: OutputFormat::Png,
            optimize: false,
            workers: Some(1),
        };
        let events = std::cell::RefCell::new(Vec::new());
        let sink = |e: RemoveWatermarkEvent| events.borrow_mut().push(e);
        let result = process_directory(&job, &BackgroundSet::new(), &sink, &CancellationToken::new());

        assert!(matches!(result, Err(Error::InvalidConfig(_))));
        assert!(events.borrow().is_empty());
    }
}
