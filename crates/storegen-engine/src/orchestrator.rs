use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use storegen_contracts::catalog::{
    non_empty_or, AssetPair, BrandStrategy, Brief, Catalog, ImageRef, ProductRecord, ProductSeed,
    StoreIdentity, DEFAULT_PRICE,
};
use storegen_contracts::decode::decode;
use storegen_contracts::errors::SynthesisError;
use storegen_contracts::events::{RunEvent, RunObserver};
use storegen_contracts::models::ModelRegistry;
use storegen_contracts::session::{Credentials, SessionStore};
use storegen_contracts::state::{GenerationPhase, GenerationState};

use crate::config::SynthesisConfig;
use crate::prompts;
use crate::service::{
    InlineImage, ModelRequest, ModelResponse, ModelService, Operation, ResponseFormat,
};

/// Shared flag that stops a run before its next model call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), SynthesisError> {
        if self.is_cancelled() {
            return Err(SynthesisError::Cancelled);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub catalog: Catalog,
    pub credentials: Credentials,
    /// Product slots that fell back to defaults for details or variation.
    pub degraded_slots: usize,
    /// Pause before handing over to the login screen. Cosmetic.
    pub handoff_delay: Duration,
}

/// Drives one brief through strategy, assets and products.
///
/// Only a failure to obtain the brand strategy (or cancellation) ends a run
/// in [`GenerationPhase::Error`]; logo, banner, product detail and variation
/// failures are replaced by placeholders or defaults and reported as events.
pub struct Orchestrator {
    service: Arc<dyn ModelService>,
    config: SynthesisConfig,
    registry: ModelRegistry,
    brief: Brief,
    state: GenerationState,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(service: Arc<dyn ModelService>, config: SynthesisConfig, brief: Brief) -> Self {
        Self {
            service,
            config,
            registry: ModelRegistry::default(),
            brief,
            state: GenerationState::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    pub fn brief(&self) -> &Brief {
        &self.brief
    }

    /// Runs the pipeline from `Idle`. On success the catalog and its owner
    /// credentials replace whatever `session` held; on failure `session` is
    /// left untouched and the state is `Error`.
    pub fn run(
        &mut self,
        session: &mut SessionStore,
        observer: &dyn RunObserver,
    ) -> Result<RunOutcome, SynthesisError> {
        if self.state.phase() != GenerationPhase::Idle {
            return Err(SynthesisError::InvalidTransition {
                from: self.state.phase().to_string(),
                to: GenerationPhase::Analyzing.to_string(),
            });
        }
        observer.observe(&RunEvent::RunStarted {
            brief_chars: self.brief.text().chars().count(),
            reference_images: self.brief.reference_images().len(),
            retry_count: self.state.retry_count(),
        });

        let result = self
            .execute(observer)
            .and_then(|outcome| self.cancel.check().map(|()| outcome));
        match result {
            Ok(outcome) => {
                session.set_catalog(outcome.catalog.clone(), outcome.credentials.clone());
                tracing::info!(
                    store = %outcome.catalog.identity.name,
                    products = outcome.catalog.products.len(),
                    degraded_slots = outcome.degraded_slots,
                    "store synthesis completed"
                );
                observer.observe(&RunEvent::RunCompleted {
                    store_name: outcome.catalog.identity.name.clone(),
                    products: outcome.catalog.products.len(),
                    degraded_slots: outcome.degraded_slots,
                    handoff_delay_ms: outcome.handoff_delay.as_millis() as u64,
                });
                Ok(outcome)
            }
            Err(err) => {
                let message = err.user_message();
                tracing::warn!(transient = err.is_transient(), "store synthesis failed: {err}");
                self.state.fail(message.clone());
                observer.observe(&RunEvent::GenerationState(self.state.clone()));
                observer.observe(&RunEvent::RunFailed {
                    message,
                    transient: err.is_transient(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// `Error -> Idle` for a user retry with the same brief. A cancelled
    /// token is replaced so the next run can proceed; fetch the new one
    /// with [`Orchestrator::cancel_token`].
    pub fn restart(&mut self, observer: &dyn RunObserver) -> Result<(), SynthesisError> {
        self.state.restart()?;
        if self.cancel.is_cancelled() {
            self.cancel = CancelToken::new();
        }
        observer.observe(&RunEvent::GenerationState(self.state.clone()));
        Ok(())
    }

    fn execute(&mut self, observer: &dyn RunObserver) -> Result<RunOutcome, SynthesisError> {
        self.cancel.check()?;
        self.advance(observer, GenerationPhase::Analyzing, "Analyzing the brief...", 0)?;
        self.advance(
            observer,
            GenerationPhase::TextGen,
            "Inventing the concept and branding...",
            15,
        )?;
        let strategy = self.brand_strategy()?;
        self.advance(
            observer,
            GenerationPhase::TextGen,
            format!("Store \"{}\" created...", strategy.store_name),
            30,
        )?;

        self.advance(observer, GenerationPhase::AssetsGen, "Designing the logo...", 45)?;
        let logo = self.asset(
            observer,
            Operation::Logo,
            &prompts::logo(&strategy),
            ImageRef::logo_placeholder,
        )?;
        self.advance(observer, GenerationPhase::AssetsGen, "Designing the banner...", 60)?;
        let banner = self.asset(
            observer,
            Operation::Banner,
            &prompts::banner(&strategy),
            ImageRef::banner_placeholder,
        )?;

        self.advance(
            observer,
            GenerationPhase::ImageVariation,
            "Analyzing and creating products...",
            75,
        )?;
        let (products, degraded_slots) = if self.brief.reference_images().is_empty() {
            (products_from_strategy(&strategy), 0)
        } else {
            self.products_from_images(observer, &strategy)?
        };

        self.cancel.check()?;
        self.advance(observer, GenerationPhase::Completed, "Finalizing the store...", 100)?;
        let catalog = Catalog {
            identity: StoreIdentity::from_strategy(&strategy, self.brief.text()),
            assets: AssetPair { logo, banner },
            products,
        };
        let credentials = Credentials::for_store(&catalog.identity.name);
        Ok(RunOutcome {
            catalog,
            credentials,
            degraded_slots,
            handoff_delay: self.config.handoff_delay,
        })
    }

    fn advance(
        &mut self,
        observer: &dyn RunObserver,
        phase: GenerationPhase,
        label: impl Into<String>,
        progress: u8,
    ) -> Result<(), SynthesisError> {
        self.state.advance(phase, label, progress)?;
        tracing::info!(
            phase = %self.state.phase(),
            progress = self.state.progress_percent(),
            "{}",
            self.state.current_action_label()
        );
        observer.observe(&RunEvent::GenerationState(self.state.clone()));
        Ok(())
    }

    fn send(&self, request: ModelRequest) -> Result<ModelResponse, SynthesisError> {
        self.cancel.check()?;
        Ok(self.service.generate(&request)?)
    }

    fn brand_strategy(&self) -> Result<BrandStrategy, SynthesisError> {
        let prompt = prompts::brand_strategy(
            self.brief.text(),
            self.brief.reference_images().len(),
        );
        self.config.text_policy(&self.registry).invoke(|model| {
            let response = self.send(
                ModelRequest::new(Operation::BrandStrategy, model)
                    .text(prompt.as_str())
                    .format(ResponseFormat::Json)
                    .max_output_tokens(self.config.strategy_max_tokens),
            )?;
            Ok(BrandStrategy::from_fields(decode(&response.text)?)?)
        })
    }

    fn product_details(
        &self,
        strategy: &BrandStrategy,
        image: &InlineImage,
    ) -> Result<ProductSeed, SynthesisError> {
        let prompt = prompts::product_details(
            strategy.product_name_or_default(),
            prompts::PRODUCT_IMAGE_CONTEXT,
        );
        self.config.text_policy(&self.registry).invoke(|model| {
            let response = self.send(
                ModelRequest::new(Operation::ProductDetails, model)
                    .image(image.clone())
                    .text(prompt.as_str())
                    .format(ResponseFormat::Json)
                    .max_output_tokens(self.config.product_max_tokens),
            )?;
            Ok(ProductSeed::from_fields(decode(&response.text)?)?)
        })
    }

    /// `Ok(None)` when the service answered without an image.
    fn generate_image(
        &self,
        operation: Operation,
        prompt: &str,
        source: Option<&InlineImage>,
    ) -> Result<Option<InlineImage>, SynthesisError> {
        self.config.image_policy().invoke(|model| {
            let mut request = ModelRequest::new(operation, model);
            if let Some(image) = source {
                request = request.image(image.clone());
            }
            let response = self.send(request.text(prompt).format(ResponseFormat::Image))?;
            Ok(response.first_image())
        })
    }

    fn asset(
        &self,
        observer: &dyn RunObserver,
        operation: Operation,
        prompt: &str,
        placeholder: fn() -> ImageRef,
    ) -> Result<ImageRef, SynthesisError> {
        let error = match self.generate_image(operation, prompt, None) {
            Ok(Some(image)) => return Ok(image.to_image_ref()),
            Ok(None) => "no image returned".to_string(),
            Err(SynthesisError::Cancelled) => return Err(SynthesisError::Cancelled),
            Err(err) => err.to_string(),
        };
        tracing::warn!(asset = %operation, "asset generation failed; using placeholder: {error}");
        observer.observe(&RunEvent::AssetFallback {
            asset: operation.to_string(),
            error,
        });
        Ok(placeholder())
    }

    fn products_from_images(
        &mut self,
        observer: &dyn RunObserver,
        strategy: &BrandStrategy,
    ) -> Result<(Vec<ProductRecord>, usize), SynthesisError> {
        let references = self.brief.reference_images().to_vec();
        let total = references.len();
        let mut products = Vec::with_capacity(total);
        let mut degraded_slots = 0;

        for (slot, reference) in references.iter().enumerate() {
            let progress = 75 + (20 * slot / total) as u8;
            self.advance(
                observer,
                GenerationPhase::ImageVariation,
                format!("Processing product {}/{}...", slot + 1, total),
                progress,
            )?;
            let inline = InlineImage::from(reference);
            let mut degraded = false;

            let details = match self.product_details(strategy, &inline) {
                Ok(seed) => seed,
                Err(SynthesisError::Cancelled) => return Err(SynthesisError::Cancelled),
                Err(err) => {
                    degraded = true;
                    tracing::warn!(slot, "product details failed; using strategy defaults: {err}");
                    observer.observe(&RunEvent::ProductDetailsDegraded {
                        slot,
                        error: err.to_string(),
                    });
                    ProductSeed {
                        name: String::new(),
                        description: String::new(),
                        price: None,
                        features: Vec::new(),
                    }
                }
            };

            let variation_prompt = prompts::image_variation(prompts::VARIATION_STYLE);
            let variations = match self.generate_image(
                Operation::ImageVariation,
                &variation_prompt,
                Some(&inline),
            ) {
                Ok(Some(image)) => vec![image.to_image_ref()],
                Ok(None) => {
                    degraded = true;
                    variation_degraded(observer, slot, "no image returned".to_string());
                    Vec::new()
                }
                Err(SynthesisError::Cancelled) => return Err(SynthesisError::Cancelled),
                Err(err) => {
                    degraded = true;
                    variation_degraded(observer, slot, err.to_string());
                    Vec::new()
                }
            };

            products.push(product_from_details(
                slot,
                strategy,
                details,
                reference.source.clone(),
                variations,
            ));
            if degraded {
                degraded_slots += 1;
            }
        }
        Ok((products, degraded_slots))
    }
}

fn variation_degraded(observer: &dyn RunObserver, slot: usize, error: String) {
    tracing::warn!(slot, "image variation failed; keeping the original only: {error}");
    observer.observe(&RunEvent::VariationDegraded { slot, error });
}

fn product_from_details(
    slot: usize,
    strategy: &BrandStrategy,
    details: ProductSeed,
    original_image: ImageRef,
    generated_variations: Vec<ImageRef>,
) -> ProductRecord {
    ProductRecord {
        id: format!("gen-prod-{slot}"),
        name: non_empty_or(&details.name, strategy.product_name_or_default()).to_string(),
        price: details.price.unwrap_or(DEFAULT_PRICE),
        description: non_empty_or(&details.description, "AI-generated description.").to_string(),
        features: details.features,
        original_image,
        generated_variations,
    }
}

/// One product for the strategy's main item plus one per suggested seed,
/// all with placeholder images.
fn products_from_strategy(strategy: &BrandStrategy) -> Vec<ProductRecord> {
    let main_name = strategy.product_name_or_default();
    let mut products = vec![ProductRecord {
        id: "gen-main".to_string(),
        name: main_name.to_string(),
        price: strategy.price.unwrap_or(DEFAULT_PRICE),
        description: non_empty_or(&strategy.product_description, "Description unavailable.")
            .to_string(),
        features: if strategy.product_features.is_empty() {
            vec!["Premium quality".to_string()]
        } else {
            strategy.product_features.clone()
        },
        original_image: ImageRef::product_placeholder("black", main_name),
        generated_variations: Vec::new(),
    }];
    for (idx, seed) in strategy.suggested_products.iter().enumerate() {
        let background = if idx % 2 == 0 { "orange" } else { "blue" };
        products.push(ProductRecord {
            id: format!("gen-extra-{idx}"),
            name: seed.name.trim().to_string(),
            price: seed.price.unwrap_or(DEFAULT_PRICE),
            description: seed.description.clone(),
            features: seed.features.clone(),
            original_image: ImageRef::product_placeholder(background, seed.name.trim()),
            generated_variations: Vec::new(),
        });
    }
    products
}
