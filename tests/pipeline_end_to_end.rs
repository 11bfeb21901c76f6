//! End-to-end pipeline runs against the mock backend

use bgswap::backends::test_utils::{MockBackend, MockModelLoader, MockOutput};
use bgswap::{
    BackgroundSpec, ModelProvider, OutputFormat, PaletteColor, Pipeline, PipelineConfig,
    RelayForm, RelayResponse,
};
use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use std::io::Cursor;
use std::sync::Arc;

fn encode(image: RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    encode(RgbImage::from_pixel(width, height, image::Rgb(rgb)), ImageFormat::Png)
}

fn pipeline_with(backend: MockBackend, config: PipelineConfig) -> Pipeline {
    let provider = Arc::new(ModelProvider::new(Arc::new(MockModelLoader::new(backend))));
    Pipeline::with_provider(config, provider).unwrap()
}

#[tokio::test]
async fn test_half_probability_red_over_white() {
    let pipeline = pipeline_with(MockBackend::uniform(0.5), PipelineConfig::default());
    let upload = solid_png(1024, 1024, [255, 0, 0]);

    let output = pipeline
        .process_image(&upload, &BackgroundSpec::Palette(PaletteColor::White))
        .await
        .unwrap();

    assert_eq!(output.dimensions, (512, 512));
    assert_eq!(output.source_dimensions, (1024, 1024));

    let cutout = image::load_from_memory(&output.cutout.bytes).unwrap().to_rgba8();
    assert_eq!(cutout.dimensions(), (512, 512));
    assert!(cutout.pixels().all(|p| p.0 == [255, 0, 0, 128]));

    let recomposited = image::load_from_memory(&output.recomposited.bytes)
        .unwrap()
        .to_rgba8();
    assert!(recomposited.pixels().all(|p| p.0 == [255, 127, 127, 255]));
}

#[tokio::test]
async fn test_non_square_input_yields_model_resolution() {
    let pipeline = pipeline_with(MockBackend::new(MockOutput::Disc), PipelineConfig::default());
    let upload = encode(
        RgbImage::from_fn(300, 100, |x, _| image::Rgb([x as u8, 40, 200])),
        ImageFormat::Jpeg,
    );

    let output = pipeline
        .process_image(&upload, &BackgroundSpec::Rgb([10, 20, 30]))
        .await
        .unwrap();
    assert_eq!(output.dimensions, (512, 512));
    assert_eq!(output.source_dimensions, (300, 100));

    let cutout = image::load_from_memory(&output.cutout.bytes).unwrap().to_rgba8();
    assert_eq!(cutout.get_pixel(256, 256)[3], 255);
    assert_eq!(cutout.get_pixel(0, 0)[3], 0);

    // Fully transparent pixels are exactly the background
    let recomposited = image::load_from_memory(&output.recomposited.bytes)
        .unwrap()
        .to_rgba8();
    assert_eq!(recomposited.get_pixel(0, 0).0, [10, 20, 30, 255]);
    assert_eq!(recomposited.get_pixel(511, 511).0, [10, 20, 30, 255]);
    assert!(output.mask_statistics.partial_pixels > 0);
}

#[tokio::test]
async fn test_output_formats() {
    let config = PipelineConfig::builder()
        .recomposite_format(OutputFormat::Jpeg)
        .jpeg_quality(80)
        .build()
        .unwrap();
    let pipeline = pipeline_with(MockBackend::uniform(1.0), config);

    let output = pipeline
        .process_image(&solid_png(64, 64, [0, 0, 0]), &BackgroundSpec::default())
        .await
        .unwrap();

    assert_eq!(output.cutout.format, OutputFormat::Png);
    assert_eq!(&output.cutout.bytes[..4], b"\x89PNG");
    assert_eq!(output.recomposited.format, OutputFormat::Jpeg);
    assert_eq!(&output.recomposited.bytes[..2], &[0xFF, 0xD8]);
    assert!(output.recomposited.to_data_uri().starts_with("data:image/jpeg;base64,"));
}

#[tokio::test]
async fn test_rgba_upload_alpha_is_ignored() {
    let mut rgba = image::RgbaImage::from_pixel(16, 16, image::Rgba([0, 0, 255, 0]));
    rgba.put_pixel(0, 0, image::Rgba([0, 0, 255, 255]));
    let mut upload = Vec::new();
    DynamicImage::ImageRgba8(rgba)
        .write_to(&mut Cursor::new(&mut upload), ImageFormat::Png)
        .unwrap();

    let pipeline = pipeline_with(MockBackend::uniform(1.0), PipelineConfig::default());
    let output = pipeline
        .process_image(&upload, &BackgroundSpec::Palette(PaletteColor::Red))
        .await
        .unwrap();

    // Only the model's mask decides transparency
    let recomposited = image::load_from_memory(&output.recomposited.bytes)
        .unwrap()
        .to_rgba8();
    assert!(recomposited.pixels().all(|p| p.0 == [0, 0, 255, 255]));
}

#[tokio::test]
async fn test_relay_round_trip() {
    let form = RelayForm {
        color_choice: "Custom".into(),
        custom_color: Some("#00ff00".into()),
    };
    let response = RelayResponse::from_upload(&solid_png(32, 32, [200, 100, 50]), &form).unwrap();
    let body = serde_json::to_string(&response).unwrap();

    let pipeline = pipeline_with(MockBackend::uniform(0.0), PipelineConfig::default());
    let output = pipeline
        .process_relay_response(&RelayResponse::from_json(&body).unwrap())
        .await
        .unwrap();

    assert_eq!(output.background, [0, 255, 0]);
    let recomposited = image::load_from_memory(&output.recomposited.bytes)
        .unwrap()
        .to_rgba8();
    assert!(recomposited.pixels().all(|p| p.0 == [0, 255, 0, 255]));
}

#[tokio::test]
async fn test_process_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("photo.png");
    std::fs::write(&path, solid_png(20, 10, [1, 2, 3])).unwrap();

    let pipeline = pipeline_with(MockBackend::uniform(1.0), PipelineConfig::default());
    let output = pipeline
        .process_file(&path, &BackgroundSpec::default())
        .await
        .unwrap();
    assert_eq!(output.source_dimensions, (20, 10));

    let saved = dir.path().join("photo_cutout.png");
    output.cutout.save(&saved).unwrap();
    assert_eq!(image::open(&saved).unwrap().dimensions(), (512, 512));
}
