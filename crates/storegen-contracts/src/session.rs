use serde::{Deserialize, Serialize};

use crate::catalog::{AssetPair, Catalog, ImageRef, ProductRecord, StoreIdentity};

pub const SUPER_ADMIN_EMAIL: &str = "admin@melaniverse.com";
pub const SUPER_ADMIN_PASSWORD: &str = "admin";
pub const DEMO_SELLER_EMAIL: &str = "seller@melaniverse.com";
pub const DEMO_SELLER_PASSWORD: &str = "seller";
/// Password given to every generated store owner.
pub const GENERATED_OWNER_PASSWORD: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    /// `admin@<store name, lower-cased, whitespace removed>.com`.
    pub fn for_store(store_name: &str) -> Self {
        let domain: String = store_name
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        Self {
            email: format!("admin@{domain}.com"),
            password: GENERATED_OWNER_PASSWORD.to_string(),
        }
    }

    fn matches(&self, email: &str, password: &str) -> bool {
        self.email == email.trim() && self.password == password
    }
}

/// Holds the live catalog for one session. Created at startup, replaced
/// wholesale by [`SessionStore::set_catalog`], dropped when the session ends.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    current: Option<(Catalog, Credentials)>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_catalog(&mut self, catalog: Catalog, credentials: Credentials) {
        self.current = Some((catalog, credentials));
    }

    pub fn catalog(&self) -> Option<&Catalog> {
        self.current.as_ref().map(|(catalog, _)| catalog)
    }

    pub fn catalog_mut(&mut self) -> Option<&mut Catalog> {
        self.current.as_mut().map(|(catalog, _)| catalog)
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.current.as_ref().map(|(_, credentials)| credentials)
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginGrant {
    SuperAdmin,
    DemoSeller,
    StoreOwner,
}

/// Checks `(email, password)` against the fixed accounts and the owner of
/// the session's generated store. A demo seller login loads the demo
/// catalog into the session.
pub fn login(session: &mut SessionStore, email: &str, password: &str) -> Option<LoginGrant> {
    let email = email.trim();
    if email == SUPER_ADMIN_EMAIL && password == SUPER_ADMIN_PASSWORD {
        return Some(LoginGrant::SuperAdmin);
    }
    if email == DEMO_SELLER_EMAIL && password == DEMO_SELLER_PASSWORD {
        session.set_catalog(
            demo_catalog(),
            Credentials {
                email: DEMO_SELLER_EMAIL.to_string(),
                password: DEMO_SELLER_PASSWORD.to_string(),
            },
        );
        return Some(LoginGrant::DemoSeller);
    }
    if session
        .credentials()
        .map(|credentials| credentials.matches(email, password))
        .unwrap_or(false)
    {
        return Some(LoginGrant::StoreOwner);
    }
    None
}

pub fn demo_catalog() -> Catalog {
    Catalog {
        identity: StoreIdentity {
            name: "Melaniverse Concept Store".to_string(),
            prompt: "Luxury minimalist fashion brand".to_string(),
            slogan: "Elegance, redefined by artificial intelligence.".to_string(),
            about_us: "Welcome to the future of retail. Our store is driven by predictive \
                       algorithms that surface trending products before anyone else."
                .to_string(),
            theme_color: "#000000".to_string(),
        },
        assets: AssetPair {
            logo: ImageRef::new("https://placehold.co/200x200/black/white?text=M"),
            banner: ImageRef::new("https://placehold.co/1920x600/black/white?text=COLLECTION+2025"),
        },
        products: vec![
            ProductRecord {
                id: "demo-1".to_string(),
                name: "Cyber-Tech Jacket".to_string(),
                price: 249.99,
                description: "A waterproof jacket with a futuristic cut, made from \
                              high-performance recycled materials."
                    .to_string(),
                features: vec![
                    "Breathable fabric".to_string(),
                    "Magnetic pockets".to_string(),
                    "Tailored fit".to_string(),
                ],
                original_image: ImageRef::product_placeholder("1a1a1a", "Cyber Jacket"),
                generated_variations: vec![ImageRef::product_placeholder("2a2a2a", "View 2")],
            },
            ProductRecord {
                id: "demo-2".to_string(),
                name: "Gravity Sneakers".to_string(),
                price: 189.50,
                description: "Ultra-light sneakers for unmatched everyday comfort.".to_string(),
                features: vec![
                    "Memory-foam sole".to_string(),
                    "Ergonomic design".to_string(),
                ],
                original_image: ImageRef::product_placeholder("333", "Sneakers"),
                generated_variations: Vec::new(),
            },
        ],
    }
}
