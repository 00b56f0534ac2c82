//! Profile fan-out: one output per configured profile.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, Limits};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::{EncodeFormat, ImageCodec};
use crate::colour::border_colour;
use crate::dimension::{Dimensions, border_width, resize_target};
use crate::error::{PipelineError, Result};
use crate::settings::Profile;

/// A written output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileOutput {
    /// Profile that produced it.
    pub profile: String,

    /// Where it was written.
    pub path: PathBuf,

    /// Size after resizing, before the border.
    pub resized: Dimensions,

    /// Final size including the border.
    pub dimensions: Dimensions,
}

/// A profile that failed for this file.
#[derive(Debug)]
pub struct ProfileFailure {
    pub profile: String,
    pub error: PipelineError,
}

/// Outcome of applying every profile to one source.
#[derive(Debug, Default)]
pub struct FanOutReport {
    pub outputs: Vec<ProfileOutput>,
    pub failures: Vec<ProfileFailure>,
}

impl FanOutReport {
    /// Whether every profile produced an output.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Output location for `source` under `profile_name`:
/// `<output>/<profile>/<stem>_<profile><.ext>` with the extension lower-cased.
pub fn output_path(output_directory: &Path, source: &Path, profile_name: &str) -> Result<PathBuf> {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            PipelineError::UnsupportedFormat(format!("unusable file name: {}", source.display()))
        })?;
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();

    Ok(output_directory
        .join(profile_name)
        .join(format!("{stem}_{profile_name}{ext}")))
}

/// Applies every profile to a source image.
///
/// Blocking; call it from a blocking context.
pub struct FanOut {
    codec: Arc<dyn ImageCodec>,
    output_directory: PathBuf,
    profiles: Arc<[Profile]>,
}

impl FanOut {
    /// Create an executor writing under `output_directory`.
    pub fn new(
        codec: Arc<dyn ImageCodec>,
        output_directory: impl Into<PathBuf>,
        profiles: impl Into<Arc<[Profile]>>,
    ) -> Self {
        Self {
            codec,
            output_directory: output_directory.into(),
            profiles: profiles.into(),
        }
    }

    /// Configured profiles.
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Decode `source` once and apply every profile to its own copy.
    ///
    /// An error here is fatal for the whole file (unsupported format or
    /// decode failure). A failing profile is recorded in the report and
    /// the remaining profiles still run.
    pub fn run(&self, source: &Path) -> Result<FanOutReport> {
        let format = EncodeFormat::for_source(source)?;
        let image = self.codec.decode(source)?;
        debug!(
            "Decoded {} ({}x{})",
            source.display(),
            image.width(),
            image.height()
        );

        let mut report = FanOutReport::default();
        for profile in self.profiles.iter() {
            match self.apply(&image, source, format, profile) {
                Ok(output) => {
                    info!(
                        "Wrote {} [{}] {}",
                        output.path.display(),
                        profile.name,
                        output.dimensions
                    );
                    report.outputs.push(output);
                }
                Err(error) => {
                    warn!(
                        "Profile {} failed for {}: {error}",
                        profile.name,
                        source.display()
                    );
                    report.failures.push(ProfileFailure {
                        profile: profile.name.clone(),
                        error,
                    });
                }
            }
        }

        Ok(report)
    }

    /// Resize, border and encode one profile's working copy.
    pub fn apply(
        &self,
        image: &DynamicImage,
        source: &Path,
        format: EncodeFormat,
        profile: &Profile,
    ) -> Result<ProfileOutput> {
        let mut working = image.clone();

        let original = Dimensions::new(working.width(), working.height());
        if let Some(target) = resize_target(profile, original) {
            ensure_allocatable(target, &working)?;
            working = self.codec.resize(&working, target.width, target.height);
        }
        let resized = Dimensions::new(working.width(), working.height());

        let border = border_width(profile, resized);
        if border > 0 {
            let padded = resized.bordered(border);
            ensure_allocatable(padded, &working)?;
            let fill = border_colour(profile.border_colour.as_deref());
            working = self
                .codec
                .pad(&working, padded.width, padded.height, fill);
        }

        let path = output_path(&self.output_directory, source, &profile.name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }

        self.codec
            .encode(&working, &path, format, profile.quality)?;

        Ok(ProfileOutput {
            profile: profile.name.clone(),
            path,
            resized,
            dimensions: Dimensions::new(working.width(), working.height()),
        })
    }
}

/// Refuse canvases larger than the `image` crate's default allocation limit.
fn ensure_allocatable(dimensions: Dimensions, image: &DynamicImage) -> Result<()> {
    let limit = Limits::default().max_alloc.unwrap_or(u64::MAX);
    let bytes_per_pixel = u64::from(image.color().bytes_per_pixel().max(4));
    let bytes = u64::from(dimensions.width)
        .checked_mul(u64::from(dimensions.height))
        .and_then(|pixels| pixels.checked_mul(bytes_per_pixel));

    match bytes {
        Some(bytes) if bytes <= limit => Ok(()),
        _ => Err(PipelineError::TooLarge { dimensions, limit }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RasterCodec;
    use image::{GenericImageView, Rgb, RgbImage};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn write_source(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        let format = EncodeFormat::for_source(&path).unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([0, 0, 200])));
        RasterCodec.encode(&image, &path, format, 90).unwrap();
        path
    }

    /// Delegates to [`RasterCodec`] but refuses to encode one file name.
    struct FailingCodec {
        reject: &'static str,
        encoded: Mutex<Vec<PathBuf>>,
    }

    impl ImageCodec for FailingCodec {
        fn decode(&self, path: &Path) -> Result<DynamicImage> {
            RasterCodec.decode(path)
        }

        fn encode(
            &self,
            image: &DynamicImage,
            path: &Path,
            format: EncodeFormat,
            quality: u8,
        ) -> Result<()> {
            if path.file_name().and_then(|n| n.to_str()) == Some(self.reject) {
                return Err(PipelineError::UnsupportedFormat("rejected".to_string()));
            }
            self.encoded.lock().unwrap().push(path.to_path_buf());
            RasterCodec.encode(image, path, format, quality)
        }
    }

    #[test]
    fn test_output_path_layout() {
        let path = output_path(Path::new("/out"), Path::new("/in/Photo.JPG"), "thumb").unwrap();
        assert_eq!(path, Path::new("/out/thumb/Photo_thumb.jpg"));

        let path = output_path(Path::new("/out"), Path::new("/in/a.b.png"), "web").unwrap();
        assert_eq!(path, Path::new("/out/web/a.b_web.png"));
    }

    #[test]
    fn test_thumbnail_profile_end_to_end() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let source = write_source(input.path(), "photo.jpg", 200, 100);

        let profile = Profile::new("thumb")
            .with_border("10px")
            .with_resize_width("50%")
            .with_resize_height("")
            .with_quality(80);
        let fanout = FanOut::new(Arc::new(RasterCodec), output.path(), vec![profile]);

        let report = fanout.run(&source).unwrap();
        assert!(report.is_complete());

        let written = &report.outputs[0];
        let expected = output.path().join("thumb").join("photo_thumb.jpg");
        assert_eq!(written.path, expected);
        assert_eq!(written.resized, Dimensions::new(100, 50));
        assert_eq!(written.dimensions, Dimensions::new(120, 70));

        let decoded = RasterCodec.decode(&expected).unwrap();
        assert_eq!(decoded.dimensions(), (120, 70));
        assert!(source.exists());
    }

    #[test]
    fn test_no_resize_keeps_source_size() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let source = write_source(input.path(), "flat.png", 64, 48);

        let profile = Profile::new("plain")
            .with_resize_width("")
            .with_resize_height("nonsense");
        let fanout = FanOut::new(Arc::new(RasterCodec), output.path(), vec![profile]);

        let report = fanout.run(&source).unwrap();
        assert_eq!(report.outputs[0].resized, Dimensions::new(64, 48));
        assert_eq!(report.outputs[0].dimensions, Dimensions::new(64, 48));
    }

    #[test]
    fn test_profiles_do_not_share_mutations() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let source = write_source(input.path(), "scan.tif", 100, 100);

        let profiles = vec![
            Profile::new("small").with_resize_width("10px").with_border("5%"),
            Profile::new("framed").with_border("2").with_border_colour("#000000"),
        ];
        let fanout = FanOut::new(Arc::new(RasterCodec), output.path(), profiles);

        let report = fanout.run(&source).unwrap();
        assert_eq!(report.outputs.len(), 2);
        assert_eq!(report.outputs[0].dimensions, Dimensions::new(10, 10));
        assert_eq!(report.outputs[1].resized, Dimensions::new(100, 100));
        assert_eq!(report.outputs[1].dimensions, Dimensions::new(104, 104));
        assert!(output.path().join("framed").join("scan_framed.tif").exists());
    }

    #[test]
    fn test_failed_profile_does_not_stop_others() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let source = write_source(input.path(), "photo.png", 20, 20);

        let codec = Arc::new(FailingCodec {
            reject: "photo_first.png",
            encoded: Mutex::new(Vec::new()),
        });
        let profiles = vec![Profile::new("first"), Profile::new("second")];
        let fanout = FanOut::new(codec.clone(), output.path(), profiles);

        let report = fanout.run(&source).unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].profile, "first");
        assert_eq!(report.outputs.len(), 1);
        assert_eq!(report.outputs[0].profile, "second");
        assert_eq!(
            *codec.encoded.lock().unwrap(),
            vec![output.path().join("second").join("photo_second.png")]
        );
    }

    #[test]
    fn test_oversized_canvas_fails_only_that_profile() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let source = write_source(input.path(), "tiny.png", 10, 10);

        let profiles = vec![
            Profile::new("wide_border").with_border("200000px"),
            Profile::new("huge").with_resize_width("100000px"),
            Profile::new("sane").with_border("1"),
        ];
        let fanout = FanOut::new(Arc::new(RasterCodec), output.path(), profiles);

        let report = fanout.run(&source).unwrap();
        assert_eq!(report.failures.len(), 2);
        for failure in &report.failures {
            assert!(
                matches!(failure.error, PipelineError::TooLarge { .. }),
                "{}: {}",
                failure.profile,
                failure.error
            );
        }
        assert_eq!(report.outputs.len(), 1);
        assert_eq!(report.outputs[0].dimensions, Dimensions::new(12, 12));
        assert!(!output.path().join("huge").exists());
    }

    #[test]
    fn test_allocation_check_uses_checked_arithmetic() {
        let image = DynamicImage::new_rgb8(1, 1);
        assert!(ensure_allocatable(Dimensions::new(1_000, 1_000), &image).is_ok());
        assert!(ensure_allocatable(Dimensions::new(u32::MAX, u32::MAX), &image).is_err());
    }

    #[test]
    fn test_undecodable_source_is_fatal() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let source = input.path().join("corrupt.jpg");
        std::fs::write(&source, b"garbage").unwrap();

        let fanout = FanOut::new(Arc::new(RasterCodec), output.path(), vec![Profile::new("a")]);
        assert!(fanout.run(&source).is_err());
        assert!(!output.path().join("a").exists());
    }

    #[test]
    fn test_unsupported_extension_is_fatal() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let source = input.path().join("anim.gif");
        std::fs::write(&source, b"GIF89a").unwrap();

        let fanout = FanOut::new(Arc::new(RasterCodec), output.path(), vec![Profile::new("a")]);
        assert!(matches!(
            fanout.run(&source),
            Err(PipelineError::UnsupportedFormat(_))
        ));
    }
}
