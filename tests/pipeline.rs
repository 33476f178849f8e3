//! End-to-end conversions from local and cached sources

mod common;

use std::path::Path;

use heic_convert::processing::OUTPUT_PREFIX;
use heic_convert::{
    ConvertRequest, Converter, ConverterConfig, Degradation, ErrorKind, OutputArtifact,
};
use tempfile::{tempdir, TempDir};

use common::{count_prefixed, jpeg, jpeg_with_orientation, place};

struct Fixture {
    primary: TempDir,
    external: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            primary: tempdir().unwrap(),
            external: tempdir().unwrap(),
        }
    }

    fn config(&self, limit_bytes: Option<u64>) -> ConverterConfig {
        let mut config = ConverterConfig::with_cache_dir(self.primary.path());
        config.cache.external_dir = Some(self.external.path().to_path_buf());
        config.memory.limit_bytes = Some(limit_bytes.unwrap_or(256 * 1024 * 1024));
        config
    }

    fn converter(&self, limit_bytes: Option<u64>) -> Converter {
        Converter::new(self.config(limit_bytes)).unwrap()
    }

    fn outputs(&self) -> usize {
        count_prefixed(self.primary.path(), OUTPUT_PREFIX)
    }
}

fn decoded_dimensions(path: &Path) -> (u32, u32) {
    let image = image::open(path).unwrap();
    (image.width(), image.height())
}

#[tokio::test]
async fn test_reference_conversion_from_secondary_cache() {
    let fixture = Fixture::new();
    let source = place(
        fixture.external.path(),
        "photo.heic",
        &jpeg_with_orientation(4000, 3000, 6),
    );
    let original = std::fs::read(&source).unwrap();

    let request = ConvertRequest::new("content://media/external/photo.heic")
        .quality(80)
        .bound(1024);
    let artifact = fixture.converter(None).convert(&request).await.unwrap();

    // 1/2 decode (2000x1500), rotated (1500x2000), resized to the bound
    assert_eq!((artifact.width, artifact.height), (768, 1024));
    assert!(artifact.degradations.is_empty());
    assert_eq!(decoded_dimensions(&artifact.path), (768, 1024));
    assert_ne!(artifact.path, source);
    assert!(artifact.path.starts_with(fixture.primary.path().canonicalize().unwrap()));

    // the cached source is borrowed, never deleted or modified
    assert_eq!(std::fs::read(&source).unwrap(), original);

    let reference = artifact.reference();
    assert!(reference.starts_with("file://"));
    assert!(reference.ends_with(&format!("?{}", artifact.token)));
    assert_eq!(OutputArtifact::local_path(&reference), Some(artifact.path.clone()));
}

#[tokio::test]
async fn test_primary_cache_wins_over_secondary() {
    let fixture = Fixture::new();
    place(fixture.primary.path(), "dup.jpg", &jpeg(40, 30));
    place(fixture.external.path(), "dup.jpg", &jpeg(80, 20));

    let artifact = fixture
        .converter(None)
        .convert(&ConvertRequest::new("dup.jpg"))
        .await
        .unwrap();

    assert_eq!((artifact.width, artifact.height), (40, 30));
}

#[tokio::test]
async fn test_direct_path_reference() {
    let fixture = Fixture::new();
    let elsewhere = tempdir().unwrap();
    let source = place(elsewhere.path(), "direct.jpg", &jpeg(50, 40));

    let artifact = fixture
        .converter(None)
        .convert(&ConvertRequest::new(source.to_str().unwrap()))
        .await
        .unwrap();

    assert_eq!((artifact.width, artifact.height), (50, 40));
    assert!(source.exists());
}

#[tokio::test]
async fn test_orientation_changes_dimensions() {
    let fixture = Fixture::new();
    let converter = fixture.converter(None);

    let cases = [
        (6u8, (48, 64)),
        (8, (48, 64)),
        (3, (64, 48)),
        (1, (64, 48)),
        (2, (64, 48)),
    ];
    for (orientation, expected) in cases {
        let name = format!("oriented_{}.jpg", orientation);
        place(fixture.primary.path(), &name, &jpeg_with_orientation(64, 48, orientation));

        let artifact = converter.convert(&ConvertRequest::new(name)).await.unwrap();
        assert_eq!((artifact.width, artifact.height), expected, "orientation {}", orientation);
    }
}

#[tokio::test]
async fn test_rotation_exhaustion_keeps_unrotated_buffer() {
    let fixture = Fixture::new();
    place(fixture.primary.path(), "tight.jpg", &jpeg_with_orientation(64, 48, 6));

    // decode peaks at the native RGB raster plus its RGBA copy (21_504 bytes);
    // afterwards the 12_288 byte buffer leaves no room for a rotated copy
    let artifact = fixture
        .converter(Some(22_000))
        .convert(&ConvertRequest::new("tight.jpg"))
        .await
        .unwrap();

    assert_eq!((artifact.width, artifact.height), (64, 48));
    assert_eq!(artifact.degradations, vec![Degradation::RotationSkipped]);
    assert_eq!(decoded_dimensions(&artifact.path), (64, 48));
}

#[tokio::test]
async fn test_resize_exhaustion_keeps_full_buffer() {
    let fixture = Fixture::new();
    place(fixture.primary.path(), "wide.jpg", &jpeg(400, 300));

    let artifact = fixture
        .converter(Some(1_000_000))
        .convert(&ConvertRequest::new("wide.jpg").bound(200))
        .await
        .unwrap();

    // bound is exceeded but the artifact is still a valid JPEG
    assert_eq!((artifact.width, artifact.height), (400, 300));
    assert_eq!(artifact.degradations, vec![Degradation::ResizeSkipped]);
    assert_eq!(decoded_dimensions(&artifact.path), (400, 300));
}

#[tokio::test]
async fn test_decode_exhaustion_is_fatal() {
    let fixture = Fixture::new();
    let source = place(fixture.primary.path(), "big.jpg", &jpeg(64, 48));

    let err = fixture
        .converter(Some(1000))
        .convert(&ConvertRequest::new("big.jpg"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OutOfMemory);
    assert_eq!(err.user_message(), "Out of Memory");
    assert!(source.exists());
    assert_eq!(fixture.outputs(), 0);
}

#[tokio::test]
async fn test_unreadable_source() {
    let fixture = Fixture::new();
    let source = place(fixture.primary.path(), "broken.heic", b"not an image at all");

    let err = fixture
        .converter(None)
        .convert(&ConvertRequest::new("broken.heic"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnreadableImage);
    assert!(source.exists());
    assert_eq!(fixture.outputs(), 0);
}

#[tokio::test]
async fn test_missing_source() {
    let fixture = Fixture::new();

    let err = fixture
        .converter(None)
        .convert(&ConvertRequest::new("content://media/nothing.heic"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SourceNotFound);
    assert_eq!(err.user_message(), "File not found: content://media/nothing.heic");
}

#[tokio::test]
async fn test_bounded_outputs_fit_the_bound() {
    let fixture = Fixture::new();
    let converter = fixture.converter(None);

    let cases = [(300, 200, 100), (200, 300, 64), (257, 129, 128), (90, 60, 100)];
    for (width, height, bound) in cases {
        let name = format!("src_{}x{}.jpg", width, height);
        place(fixture.primary.path(), &name, &jpeg(width, height));

        let artifact = converter
            .convert(&ConvertRequest::new(name).bound(bound))
            .await
            .unwrap();

        assert!(artifact.degradations.is_empty());
        assert!(artifact.width.max(artifact.height) <= bound);
        assert!(artifact.width >= 1 && artifact.height >= 1);
    }
}

#[tokio::test]
async fn test_repeated_conversions_get_distinct_outputs() {
    let fixture = Fixture::new();
    place(fixture.primary.path(), "same.jpg", &jpeg(16, 16));
    let converter = fixture.converter(None);

    let first = converter.convert(&ConvertRequest::new("same.jpg")).await.unwrap();
    let second = converter.convert(&ConvertRequest::new("same.jpg")).await.unwrap();

    assert_ne!(first.path, second.path);
    assert!(first.path.exists() && second.path.exists());
    assert_eq!(fixture.outputs(), 2);
}

#[tokio::test]
async fn test_separate_output_dir() {
    let fixture = Fixture::new();
    let out = tempdir().unwrap();
    place(fixture.primary.path(), "routed.jpg", &jpeg(16, 16));

    let mut config = fixture.config(None);
    config.cache.output_dir = Some(out.path().join("converted"));

    let artifact = Converter::new(config)
        .unwrap()
        .convert(&ConvertRequest::new("routed.jpg"))
        .await
        .unwrap();

    assert!(artifact.path.starts_with(out.path().canonicalize().unwrap()));
    assert_eq!(fixture.outputs(), 0);
}
