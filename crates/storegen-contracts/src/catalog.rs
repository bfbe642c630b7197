use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::errors::SchemaError;

const PLACEHOLDER_BASE: &str = "https://placehold.co";
pub const DEFAULT_PRICE: f64 = 99.0;
pub const DEFAULT_THEME_COLOR: &str = "#000000";

/// Reference to an image: a remote URL, a local path or a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn data_url(mime_type: &str, base64_data: &str) -> Self {
        Self(format!("data:{mime_type};base64,{base64_data}"))
    }

    pub fn logo_placeholder() -> Self {
        Self(format!("{PLACEHOLDER_BASE}/200x200/black/white?text=LOGO"))
    }

    pub fn banner_placeholder() -> Self {
        Self(format!("{PLACEHOLDER_BASE}/1920x600/black/white?text=BANNER"))
    }

    /// Placeholder tile for a product that has no photo.
    pub fn product_placeholder(background: &str, label: &str) -> Self {
        let encoded: String = url::form_urlencoded::byte_serialize(label.as_bytes()).collect();
        Self(format!(
            "{PLACEHOLDER_BASE}/600x600/{background}/white?text={encoded}"
        ))
    }

    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_BASE)
    }

    pub fn is_data_url(&self) -> bool {
        self.0.starts_with("data:")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_data_url() {
            let head: String = self.0.chars().take(32).collect();
            return write!(f, "{head}…");
        }
        write!(f, "{}", self.0)
    }
}

/// A product image supplied with the brief.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
    /// What the catalog shows as the product's original image.
    pub source: ImageRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Brief {
    text: String,
    reference_images: Vec<ReferenceImage>,
}

impl Brief {
    pub fn new(text: impl Into<String>, reference_images: Vec<ReferenceImage>) -> Self {
        Self {
            text: text.into(),
            reference_images,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn reference_images(&self) -> &[ReferenceImage] {
        &self.reference_images
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSeed {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_price")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub features: Vec<String>,
}

impl ProductSeed {
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, SchemaError> {
        serde_json::from_value(Value::Object(fields))
            .map_err(|err| SchemaError::new("product details", err.to_string()))
    }
}

/// Brand identity the model invents for a brief.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandStrategy {
    pub store_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub product_name: String,
    #[serde(default, deserialize_with = "lenient_price")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub slogan: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub about_us: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub theme_color: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub logo_prompt: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub banner_prompt: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub product_description: String,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub product_features: Vec<String>,
    #[serde(default, deserialize_with = "lenient_seed_list")]
    pub suggested_products: Vec<ProductSeed>,
}

impl BrandStrategy {
    /// Validates a decoded strategy object; `storeName` is the one field
    /// nothing downstream can invent.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, SchemaError> {
        let mut strategy: Self = serde_json::from_value(Value::Object(fields))
            .map_err(|err| SchemaError::new("brand strategy", err.to_string()))?;
        strategy.store_name = strategy.store_name.trim().to_string();
        if strategy.store_name.is_empty() {
            return Err(SchemaError::new("brand strategy", "storeName is empty"));
        }
        strategy.theme_color = normalize_hex_color(&strategy.theme_color)
            .unwrap_or_else(|| DEFAULT_THEME_COLOR.to_string());
        let suggested = strategy.suggested_products.len();
        strategy
            .suggested_products
            .retain(|seed| !seed.name.trim().is_empty());
        let dropped = suggested - strategy.suggested_products.len();
        if dropped > 0 {
            tracing::warn!(dropped, "skipping suggested products without a name");
        }
        Ok(strategy)
    }

    pub fn product_name_or_default(&self) -> &str {
        non_empty_or(&self.product_name, "Main product")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub description: String,
    pub features: Vec<String>,
    pub original_image: ImageRef,
    pub generated_variations: Vec<ImageRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPair {
    pub logo: ImageRef,
    pub banner: ImageRef,
}

impl Default for AssetPair {
    fn default() -> Self {
        Self {
            logo: ImageRef::logo_placeholder(),
            banner: ImageRef::banner_placeholder(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreIdentity {
    pub name: String,
    pub prompt: String,
    pub slogan: String,
    pub about_us: String,
    pub theme_color: String,
}

impl StoreIdentity {
    pub fn from_strategy(strategy: &BrandStrategy, prompt: &str) -> Self {
        Self {
            name: non_empty_or(&strategy.store_name, "My Store").to_string(),
            prompt: prompt.to_string(),
            slogan: non_empty_or(&strategy.slogan, "Excellence, designed by AI.").to_string(),
            about_us: non_empty_or(&strategy.about_us, "Welcome to our store.").to_string(),
            theme_color: normalize_hex_color(&strategy.theme_color)
                .unwrap_or_else(|| DEFAULT_THEME_COLOR.to_string()),
        }
    }
}

/// The finished store: identity, visual assets and products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub identity: StoreIdentity,
    pub assets: AssetPair,
    pub products: Vec<ProductRecord>,
}

impl Catalog {
    pub fn product(&self, id: &str) -> Option<&ProductRecord> {
        self.products.iter().find(|product| product.id == id)
    }

    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

pub fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default
    } else {
        trimmed
    }
}

/// Normalizes `#abc` / `#aabbcc` to upper-case six digit form.
pub fn normalize_hex_color(value: &str) -> Option<String> {
    let raw = value.trim();
    let body = raw.strip_prefix('#')?;
    let mut body = body.to_string();
    if body.len() == 3 && body.chars().all(|ch| ch.is_ascii_hexdigit()) {
        body = body.chars().flat_map(|ch| [ch, ch]).collect::<String>();
    }
    if body.len() != 6 || !body.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("#{}", body.to_ascii_uppercase()))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        _ => String::new(),
    })
}

fn lenient_price<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(parse_price(&Value::deserialize(deserializer)?))
}

fn lenient_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(string_list(&Value::deserialize(deserializer)?))
}

/// Objects become seeds; `null`, non-arrays and non-object rows are skipped.
fn lenient_seed_list<'de, D>(deserializer: D) -> Result<Vec<ProductSeed>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows = match Value::deserialize(deserializer)? {
        Value::Array(rows) => rows,
        Value::Null => return Ok(Vec::new()),
        other => {
            tracing::warn!(kind = value_kind(&other), "suggestedProducts is not a list");
            return Ok(Vec::new());
        }
    };
    let mut seeds = Vec::with_capacity(rows.len());
    for row in rows {
        if !row.is_object() {
            tracing::warn!(
                kind = value_kind(&row),
                "skipping suggested product that is not an object"
            );
            continue;
        }
        match serde_json::from_value::<ProductSeed>(row) {
            Ok(seed) => seeds.push(seed),
            Err(err) => tracing::warn!("skipping unreadable suggested product: {err}"),
        }
    }
    Ok(seeds)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Reads a price from a number or a string such as `"89,90 €"`.
pub fn parse_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let cleaned: String = text
                .chars()
                .filter(|ch| ch.is_ascii_digit() || *ch == '.' || *ch == ',')
                .collect::<String>()
                .replace(',', ".");
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    }?;
    (price.is_finite() && price > 0.0).then_some(price)
}

pub fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(rows) => rows
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .collect(),
        Value::String(text) => text
            .split(',')
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
