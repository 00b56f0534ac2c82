//! # Borderly Pipeline
//!
//! Turns each image dropped into the input directory into one output per
//! configured profile, then disposes of the source.
//!
//! ## File lifecycle
//!
//! ```text
//! PathEvent ──► IntakeGate::admit ──► slot ──► ReadinessProbe ──► FanOut ──► Disposition
//!                 (dedup)            (bound)   (exclusive open)   (per profile)
//! ```
//!
//! - [`gate`]: one task per path at a time, at most `max_concurrency` running
//! - [`readiness`]: waits until no writer holds the file
//! - [`fanout`]: decode once, then resize, border and encode per [`Profile`]
//! - [`disposition`]: leave, delete or move the source
//! - [`worker`]: drives the lifecycle from a [`DirectoryWatcher`] stream
//!
//! [`DirectoryWatcher`]: borderly_directory_watcher::DirectoryWatcher

pub mod codec;
pub mod colour;
pub mod dimension;
pub mod disposition;
pub mod error;
pub mod fanout;
pub mod gate;
pub mod readiness;
pub mod settings;
pub mod worker;

pub use codec::{EncodeFormat, ImageCodec, RasterCodec};
pub use colour::{DEFAULT_BORDER_COLOUR, border_colour};
pub use dimension::{Dimensions, SizeSpec, fit_within, resolve_dimension};
pub use disposition::{Disposition, DispositionHandler};
pub use error::{PipelineError, Result};
pub use fanout::{FanOut, FanOutReport, ProfileFailure, ProfileOutput, output_path};
pub use gate::{Admission, InFlight, IntakeGate};
pub use readiness::{FileStamp, Readiness, ReadinessProbe};
pub use settings::{Config, ProcessedFileOption, Profile, Settings};
pub use worker::{FileOutcome, ProcessedFile, Worker};
