use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use serde_json::json;
use sha2::{Digest, Sha256};
use storegen_contracts::errors::UpstreamError;

use crate::service::{InlineImage, ModelRequest, ModelResponse, ModelService, Operation};

/// Offline transport: canned JSON and solid-color PNGs derived from a
/// hash of the prompt, so the same brief always yields the same store.
///
/// Model names containing `overloaded` answer with a 429, which makes the
/// fallback path reproducible without a network.
#[derive(Debug, Default)]
pub struct DryrunService;

impl DryrunService {
    pub fn new() -> Self {
        Self
    }
}

impl ModelService for DryrunService {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, UpstreamError> {
        if request.model.contains("overloaded") {
            return Err(UpstreamError::classified(
                &request.model,
                Some(429),
                "RESOURCE_EXHAUSTED: dryrun quota exhausted",
            ));
        }
        let digest = prompt_digest(request);
        let tag = hex::encode(&digest[..3]);
        let text = match request.operation {
            Operation::BrandStrategy => json!({
                "storeName": format!("Dryrun Store {tag}"),
                "productName": format!("Dryrun Product {tag}"),
                "price": 40 + u32::from(digest[3] % 60),
                "slogan": "Built offline, shipped anyway.",
                "aboutUs": "A store generated without calling any model.",
                "themeColor": format!("#{}", hex::encode(&digest[..3])),
                "logoPrompt": "geometric monogram",
                "bannerPrompt": "soft gradient backdrop",
                "productDescription": "A placeholder product from the dryrun transport.",
                "productFeatures": ["Deterministic", "Offline"],
                "suggestedProducts": [
                    {"name": format!("Dryrun Accessory {tag}"), "description": "Companion item.", "price": 25, "features": ["Compact"]},
                    {"name": format!("Dryrun Bundle {tag}"), "description": "Everything together.", "price": 120, "features": ["Value pack"]}
                ]
            })
            .to_string(),
            Operation::ProductDetails => json!({
                "name": format!("Dryrun Item {tag}"),
                "description": "Detected from the reference image by the dryrun transport.",
                "price": 10 + u32::from(digest[4] % 90),
                "features": ["Studio tested", "Ships fast"]
            })
            .to_string(),
            Operation::AssistantAction => json!({
                "action": "chat",
                "reply": format!("Dryrun assistant received your request ({tag})."),
                "data": {}
            })
            .to_string(),
            Operation::Logo | Operation::Banner | Operation::ImageVariation => {
                let (width, height) = dims_for(request.operation);
                let image = solid_png(width, height, (digest[0], digest[1], digest[2]))
                    .map_err(|err| UpstreamError::fatal(&request.model, err.to_string()))?;
                return Ok(ModelResponse {
                    text: String::new(),
                    images: vec![image],
                });
            }
        };
        Ok(ModelResponse {
            text,
            images: Vec::new(),
        })
    }
}

fn prompt_digest(request: &ModelRequest) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(request.operation.as_str().as_bytes());
    hasher.update(request.prompt_text().as_bytes());
    hasher.update((request.image_count() as u64).to_be_bytes());
    hasher.finalize().to_vec()
}

fn dims_for(operation: Operation) -> (u32, u32) {
    match operation {
        Operation::Banner => (192, 60),
        _ => (64, 64),
    }
}

fn solid_png(width: u32, height: u32, (r, g, b): (u8, u8, u8)) -> image::ImageResult<InlineImage> {
    let mut image = RgbImage::new(width, height);
    for pixel in image.pixels_mut() {
        *pixel = Rgb([r, g, b]);
    }
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png)?;
    Ok(InlineImage {
        mime_type: "image/png".to_string(),
        data: out.into_inner(),
    })
}

#[cfg(test)]
mod tests {
    use storegen_contracts::catalog::BrandStrategy;
    use storegen_contracts::decode::decode;

    use super::*;

    #[test]
    fn strategy_is_deterministic_per_prompt() -> anyhow::Result<()> {
        let service = DryrunService::new();
        let request = ModelRequest::new(Operation::BrandStrategy, "dryrun-text-1").text("sneakers");
        let first = service.generate(&request)?;
        let second = service.generate(&request)?;
        assert_eq!(first, second);

        let strategy = BrandStrategy::from_fields(decode(&first.text)?)?;
        assert!(strategy.store_name.starts_with("Dryrun Store "));
        assert_eq!(strategy.suggested_products.len(), 2);

        let other = service.generate(
            &ModelRequest::new(Operation::BrandStrategy, "dryrun-text-1").text("candles"),
        )?;
        assert_ne!(first.text, other.text);
        Ok(())
    }

    #[test]
    fn image_operations_return_decodable_png() -> anyhow::Result<()> {
        let service = DryrunService::new();
        let response = service.generate(
            &ModelRequest::new(Operation::Banner, "dryrun-image-1").text("banner"),
        )?;
        let image = response.first_image().ok_or_else(|| anyhow::anyhow!("no image"))?;
        assert_eq!(image.mime_type, "image/png");
        let decoded = image::load_from_memory(&image.data)?;
        assert_eq!((decoded.width(), decoded.height()), (192, 60));
        Ok(())
    }

    #[test]
    fn overloaded_models_are_rate_limited() {
        let err = DryrunService::new()
            .generate(&ModelRequest::new(
                Operation::BrandStrategy,
                "dryrun-overloaded",
            ))
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.status(), Some(429));
    }
}
