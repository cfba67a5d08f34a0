//! Remove static semi-transparent watermarks from batches of manga pages.
//!
//! Scanlation sources often stamp the same translucent logo at the same spot
//! on every page of a volume. Given enough pages of one size, the darkest and
//! brightest value observed at each position (the "black" and "white"
//! backgrounds) pin down the watermark's opacity and colour there, and the
//! alpha-blending equation can be reversed to recover the clean page.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//!
//! use manga_watermark_removal::{
//!     CancellationToken, OutputFormat, Pipeline, RemoveWatermarkEvent,
//! };
//!
//! let pipeline = Pipeline::new();
//! let manga = Path::new("volume-01");
//!
//! // Estimate and cache the backgrounds of every page size.
//! for group in pipeline.get_manga_dir_data(manga).unwrap() {
//!     pipeline
//!         .generate_background(manga, None, group.width, group.height)
//!         .unwrap();
//! }
//!
//! // Recover every page, watching progress through the event sink.
//! let backgrounds = pipeline.load_cached_backgrounds(manga).unwrap();
//! let sink = |event: RemoveWatermarkEvent| println!("{event:?}");
//! pipeline
//!     .remove_watermark(
//!         manga,
//!         Path::new("volume-01-clean"),
//!         OutputFormat::Png,
//!         false,
//!         backgrounds,
//!         &sink,
//!         &CancellationToken::new(),
//!     )
//!     .unwrap();
//! ```

#![deny(missing_docs)]

pub mod background;
pub mod blending;
pub mod cache;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod scanner;

pub use background::{BackgroundPair, EstimatorOptions, Rect, DEFAULT_MIN_SAMPLES};
pub use codec::{Dimensions, EncodedImage, ImageData, ImageInfo, OutputFormat};
pub use config::{Config, ConfigStore};
pub use engine::{BackgroundSet, RemovalJob, RunSummary};
pub use error::{Error, Result};
pub use events::{CancellationToken, EventSink, RemoveWatermarkEvent};
pub use pipeline::{MangaDirData, Pipeline};
