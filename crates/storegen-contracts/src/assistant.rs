use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::{
    non_empty_or, normalize_hex_color, parse_price, string_list, Catalog, ImageRef,
    ProductRecord, DEFAULT_PRICE,
};
use crate::errors::SchemaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantAction {
    AddProduct,
    UpdateTheme,
    UpdateName,
    UpdateSlogan,
    Chat,
}

impl AssistantAction {
    pub const ALL: [AssistantAction; 5] = [
        Self::AddProduct,
        Self::UpdateTheme,
        Self::UpdateName,
        Self::UpdateSlogan,
        Self::Chat,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddProduct => "add_product",
            Self::UpdateTheme => "update_theme",
            Self::UpdateName => "update_name",
            Self::UpdateSlogan => "update_slogan",
            Self::Chat => "chat",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
    }
}

/// What the assistant intends to do; nothing has been applied yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionEnvelope {
    pub action: AssistantAction,
    pub reply: String,
    pub data: Map<String, Value>,
}

impl ActionEnvelope {
    pub fn from_fields(mut fields: Map<String, Value>) -> Result<Self, SchemaError> {
        let action = match fields.remove("action") {
            Some(Value::String(raw)) => AssistantAction::parse(&raw)
                .ok_or_else(|| SchemaError::new("assistant", format!("unknown action '{raw}'")))?,
            Some(other) => {
                return Err(SchemaError::new(
                    "assistant",
                    format!("action must be a string, got {other}"),
                ))
            }
            None => return Err(SchemaError::new("assistant", "missing action")),
        };
        let reply = match fields.remove("reply") {
            Some(Value::String(text)) => text,
            _ => String::new(),
        };
        let data = match fields.remove("data") {
            Some(Value::Object(data)) => data,
            _ => Map::new(),
        };
        Ok(Self {
            action,
            reply,
            data,
        })
    }

    fn data_str(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedAction {
    pub changed: bool,
    /// Message to show the user.
    pub message: String,
}

/// Applies an envelope to `catalog`. `image` is the picture the user sent
/// with the instruction, used as the original image of an added product.
pub fn apply_action(
    catalog: &mut Catalog,
    envelope: &ActionEnvelope,
    image: Option<ImageRef>,
) -> AppliedAction {
    let fallback_reply = non_empty_or(&envelope.reply, "Done.").to_string();
    let unchanged = |message: String| AppliedAction {
        changed: false,
        message,
    };

    match envelope.action {
        AssistantAction::AddProduct => {
            let Some(name) = envelope.data_str("name") else {
                return unchanged(fallback_reply);
            };
            let product = ProductRecord {
                id: next_assistant_product_id(catalog),
                name: name.to_string(),
                price: envelope
                    .data
                    .get("price")
                    .and_then(parse_price)
                    .unwrap_or(DEFAULT_PRICE),
                description: envelope.data_str("description").unwrap_or("").to_string(),
                features: envelope
                    .data
                    .get("features")
                    .map(string_list)
                    .unwrap_or_default(),
                original_image: image
                    .unwrap_or_else(|| ImageRef::product_placeholder("black", "Product")),
                generated_variations: Vec::new(),
            };
            catalog.products.insert(0, product);
            AppliedAction {
                changed: true,
                message: "Added the product to your catalog!".to_string(),
            }
        }
        AssistantAction::UpdateTheme => {
            match envelope.data_str("color").and_then(normalize_hex_color) {
                Some(color) => {
                    catalog.identity.theme_color = color.clone();
                    AppliedAction {
                        changed: true,
                        message: format!("Theme updated to {color}."),
                    }
                }
                None => unchanged(fallback_reply),
            }
        }
        AssistantAction::UpdateName => match envelope.data_str("storeName") {
            Some(name) => {
                catalog.identity.name = name.to_string();
                AppliedAction {
                    changed: true,
                    message: format!("Store renamed: {name}."),
                }
            }
            None => unchanged(fallback_reply),
        },
        AssistantAction::UpdateSlogan => match envelope.data_str("slogan") {
            Some(slogan) => {
                catalog.identity.slogan = slogan.to_string();
                AppliedAction {
                    changed: true,
                    message: format!("Slogan updated: {slogan}"),
                }
            }
            None => unchanged(fallback_reply),
        },
        AssistantAction::Chat => unchanged(fallback_reply),
    }
}

fn next_assistant_product_id(catalog: &Catalog) -> String {
    let stamp = chrono::Utc::now().timestamp_millis();
    let mut candidate = format!("ai-prod-{stamp}");
    let mut suffix = 1;
    while catalog.product(&candidate).is_some() {
        candidate = format!("ai-prod-{stamp}-{suffix}");
        suffix += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::catalog::{AssetPair, StoreIdentity};

    fn catalog() -> Catalog {
        Catalog {
            identity: StoreIdentity {
                name: "Volt".to_string(),
                prompt: "sneakers".to_string(),
                slogan: "Run fast".to_string(),
                about_us: "About".to_string(),
                theme_color: "#000000".to_string(),
            },
            assets: AssetPair::default(),
            products: Vec::new(),
        }
    }

    fn envelope(value: Value) -> ActionEnvelope {
        ActionEnvelope::from_fields(value.as_object().cloned().unwrap_or_default()).unwrap()
    }

    #[test]
    fn envelope_parses_known_actions() {
        let parsed = envelope(json!({
            "action": "update-name",
            "reply": "Renaming!",
            "data": {"storeName": "Bolt"}
        }));
        assert_eq!(parsed.action, AssistantAction::UpdateName);
        assert_eq!(parsed.reply, "Renaming!");
        assert_eq!(parsed.data["storeName"], json!("Bolt"));
    }

    #[test]
    fn envelope_rejects_unknown_or_missing_action() {
        let unknown = ActionEnvelope::from_fields(
            json!({"action": "delete_store"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        )
        .unwrap_err();
        assert!(unknown.message.contains("delete_store"));
        assert!(ActionEnvelope::from_fields(Map::new()).is_err());
    }

    #[test]
    fn add_product_prepends_with_image() {
        let mut store = catalog();
        let applied = apply_action(
            &mut store,
            &envelope(json!({
                "action": "add_product",
                "data": {"name": "Volt Sock", "price": "12", "features": ["warm"]}
            })),
            Some(ImageRef::new("/tmp/sock.jpg")),
        );
        assert!(applied.changed);
        assert_eq!(store.products.len(), 1);
        let product = &store.products[0];
        assert!(product.id.starts_with("ai-prod-"));
        assert_eq!(product.price, 12.0);
        assert_eq!(product.original_image.as_str(), "/tmp/sock.jpg");
    }

    #[test]
    fn theme_update_normalizes_color_and_ignores_garbage() {
        let mut store = catalog();
        let applied = apply_action(
            &mut store,
            &envelope(json!({"action": "update_theme", "data": {"color": "#f00"}})),
            None,
        );
        assert_eq!(applied.message, "Theme updated to #FF0000.");
        assert_eq!(store.identity.theme_color, "#FF0000");

        let applied = apply_action(
            &mut store,
            &envelope(json!({"action": "update_theme", "reply": "Hmm", "data": {"color": "red"}})),
            None,
        );
        assert!(!applied.changed);
        assert_eq!(applied.message, "Hmm");
        assert_eq!(store.identity.theme_color, "#FF0000");
    }

    #[test]
    fn chat_leaves_catalog_untouched() {
        let mut store = catalog();
        let before = store.clone();
        let applied = apply_action(
            &mut store,
            &envelope(json!({"action": "chat", "reply": "Your store looks great."})),
            None,
        );
        assert!(!applied.changed);
        assert_eq!(applied.message, "Your store looks great.");
        assert_eq!(store, before);
    }

    #[test]
    fn slogan_and_name_updates_apply() {
        let mut store = catalog();
        apply_action(
            &mut store,
            &envelope(json!({"action": "update_slogan", "data": {"slogan": "Go"}})),
            None,
        );
        apply_action(
            &mut store,
            &envelope(json!({"action": "update_name", "data": {"storeName": "Bolt"}})),
            None,
        );
        assert_eq!(store.identity.slogan, "Go");
        assert_eq!(store.identity.name, "Bolt");
    }
}
