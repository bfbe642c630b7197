use storegen_contracts::catalog::{BrandStrategy, Catalog};

pub const ASSET_PREFIX: &str = "Professional design, high quality.";
pub const VARIATION_STYLE: &str = "studio lighting, clean background";
pub const PRODUCT_IMAGE_CONTEXT: &str = "Image provided by user";

pub fn brand_strategy(brief: &str, reference_images: usize) -> String {
    let image_context = if reference_images > 0 {
        format!("User uploaded {reference_images} product images.")
    } else {
        "User uploaded no images.".to_string()
    };
    format!(
        r##"You are an expert e-commerce brand architect.
The user wants to create a store.
User idea: "{brief}".
Visual context from uploaded images: "{image_context}".

Based on this, invent:
1. A creative store name.
2. The main product name.
3. A suitable price in EUR.
4. A slogan, a short about-us text (max 50 words) and a theme color.
5. Visual prompts for the logo and the banner.
6. 3 related products (text only).

Output strictly valid JSON. No markdown.

Required JSON structure:
{{
  "storeName": "Name you invented",
  "productName": "Main product name",
  "price": 99,
  "slogan": "Catchy slogan",
  "aboutUs": "Professional description",
  "themeColor": "#RRGGBB",
  "logoPrompt": "Visual description for the logo, minimalist vector",
  "bannerPrompt": "Visual description for the banner, abstract background",
  "productDescription": "Main product description",
  "productFeatures": ["..."],
  "suggestedProducts": [
    {{ "name": "Related product", "description": "...", "price": 89, "features": ["..."] }}
  ]
}}"##
    )
}

pub fn product_details(product_name: &str, context: &str) -> String {
    format!(
        r#"Analyze this product for an e-commerce listing: "{product_name}".
Context: {context}.

Output strictly valid JSON:
{{
  "name": "Creative product name",
  "description": "SEO friendly description (max 40 words)",
  "price": 0,
  "features": ["Feature 1", "Feature 2", "Feature 3"]
}}"#
    )
}

pub fn logo(strategy: &BrandStrategy) -> String {
    asset(&format!(
        "Minimalist vector logo for {}. {}",
        strategy.store_name, strategy.logo_prompt
    ))
}

pub fn banner(strategy: &BrandStrategy) -> String {
    asset(&format!(
        "High end e-commerce website header for {}. {}.",
        strategy.store_name, strategy.banner_prompt
    ))
}

fn asset(prompt: &str) -> String {
    format!("{ASSET_PREFIX} {}", prompt.trim())
}

pub fn image_variation(style: &str) -> String {
    format!("Professional product photography. {style}")
}

pub fn assistant(instruction: &str, catalog: &Catalog, has_image: bool) -> String {
    let mut prompt = format!(
        r##"You are an AI assistant managing a store dashboard.
Current store name: "{name}".
Current theme color: "{color}".

User request: "{instruction}"

Determine what action to take.
Supported actions:
1. 'add_product': the user wants to add a product (usually with an image).
2. 'update_theme': the user wants to change the color.
3. 'update_name': the user wants to change the store name.
4. 'update_slogan': the user wants to change the slogan.
5. 'chat': anything else, such as a question.

Output JSON only:
{{
  "action": "add_product" | "update_theme" | "update_name" | "update_slogan" | "chat",
  "reply": "Friendly message confirming the action",
  "data": {{
    "name": "Product name", "price": 99, "description": "...", "features": [],
    "color": "#hex",
    "storeName": "New name",
    "slogan": "New slogan"
  }}
}}"##,
        name = catalog.identity.name,
        color = catalog.identity.theme_color,
    );
    if has_image {
        prompt.push_str(
            "\nNOTE: The user has uploaded an image. Use it to generate product details if the action is add_product.",
        );
    }
    prompt
}
