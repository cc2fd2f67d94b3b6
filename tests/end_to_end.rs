//! Upload to final image through the request-level service

mod common;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use common::{mouth_rectangle, solid};
use smile_design::backends::test_utils::{MockImageEditor, RecordingSleeper};
use smile_design::{
    DirectiveFields, GenerateRequest, ImageIOService, MaskExtractor, MaterialPreset, MemorySink,
    SmileDesignService, StaticLandmarks, SynthesisConfig, SynthesisOrchestrator,
};
use std::sync::Arc;

const RED: [u8; 3] = [255, 0, 0];
const BLUE: [u8; 3] = [0, 0, 255];

fn service(editor: Arc<MockImageEditor>, sink: Arc<MemorySink>) -> SmileDesignService {
    let landmarks = mouth_rectangle(512, 512, (206.0, 226.0), (306.0, 286.0));
    let orchestrator = SynthesisOrchestrator::builder(Arc::new(SynthesisConfig::default()))
        .editor(editor)
        .sleeper(Arc::new(RecordingSleeper::default()))
        .build()
        .unwrap();

    SmileDesignService::new(
        Arc::new(StaticLandmarks::new(landmarks)),
        MaskExtractor::default(),
        orchestrator,
    )
    .with_sink(sink)
}

#[tokio::test]
async fn masked_generation_changes_only_the_mouth() {
    let editor = Arc::new(MockImageEditor::returning(solid(512, 512, BLUE)));
    let sink = Arc::new(MemorySink::default());
    let service = service(Arc::clone(&editor), Arc::clone(&sink));

    let upload = ImageIOService::encode_png(&solid(512, 512, RED)).unwrap();
    let mask_response = service.generate_mask(&upload).unwrap();
    assert_eq!((mask_response.width, mask_response.height), (512, 512));

    let request = GenerateRequest {
        image: BASE64.encode(&upload),
        mask: Some(format!("data:image/png;base64,{}", mask_response.mask)),
        directive: DirectiveFields {
            material: Some(MaterialPreset::Veneer),
            expert_prompt: Some("keep the gum line".to_string()),
            ..DirectiveFields::default()
        },
    };
    let response = service.generate("owner-1", &request).await.unwrap();
    assert!(response.image_url.starts_with("data:image/png;base64,"));

    let result = ImageIOService::decode_base64_image(&response.image_url)
        .unwrap()
        .to_rgb8();
    assert_eq!(result.dimensions(), (512, 512));

    let center = result.get_pixel(256, 256).0;
    assert!(center[2] >= 250 && center[0] <= 5, "center {:?}", center);
    assert_eq!(result.get_pixel(0, 0).0, RED);
    assert_eq!(result.get_pixel(511, 511).0, RED);

    // Feathered band to the left of the mouth
    let band: Vec<u8> = (180..216).map(|x| result.get_pixel(x, 256).0[2]).collect();
    assert!(band.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(band.iter().any(|&blue| blue > 5 && blue < 250));

    let edit = &editor.requests()[0];
    assert!(edit.is_masked());
    assert!(edit.prompt.starts_with(MaterialPreset::Veneer.prompt()));
    assert!(edit.prompt.ends_with("keep the gum line"));

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].owner_id, "owner-1");
    assert_eq!(records[0].image, response.image_url);
}

#[tokio::test]
async fn maskless_generation_replaces_the_whole_frame() {
    let editor = Arc::new(MockImageEditor::returning(solid(256, 256, BLUE)));
    let service = service(Arc::clone(&editor), Arc::new(MemorySink::default()));

    let request = GenerateRequest {
        image: ImageIOService::encode_png_data_url(&solid(128, 96, RED)).unwrap(),
        mask: Some(String::new()),
        directive: DirectiveFields {
            prompt: Some("brighter smile".to_string()),
            ..DirectiveFields::default()
        },
    };
    let response = service.generate("owner-2", &request).await.unwrap();

    let result = ImageIOService::decode_base64_image(&response.image_url)
        .unwrap()
        .to_rgb8();
    assert_eq!(result.dimensions(), (128, 96));
    assert!(result.get_pixel(0, 0).0[2] >= 250);
    assert!(!editor.requests()[0].is_masked());
}
