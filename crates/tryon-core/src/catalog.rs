//! ============================================================================
//! Garment Catalog - Fixed wardrobe of selectable garments
//! ============================================================================
//! The catalog is built once at startup and shared read-only (behind an `Arc`)
//! with every camera session. Entries are never added, changed or removed
//! after construction, so a garment id that resolved once always resolves.
//! ============================================================================

use anyhow::{anyhow, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::types::{Garment, Tint};

/// Errors building a catalog
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("Duplicate garment id: {0}")]
    DuplicateId(String),

    #[error("Garment id must not be empty")]
    EmptyId,

    #[error("Catalog has no garments")]
    Empty,
}

/// Immutable list of garments with lookup by id
#[derive(Debug, Clone)]
pub struct GarmentCatalog {
    garments: Vec<Garment>,
}

impl GarmentCatalog {
    /// Build a catalog, rejecting empty or duplicate ids
    pub fn new(garments: Vec<Garment>) -> Result<Self, CatalogError> {
        if garments.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for garment in &garments {
            if garment.id.is_empty() {
                return Err(CatalogError::EmptyId);
            }
            if !seen.insert(garment.id.as_str()) {
                return Err(CatalogError::DuplicateId(garment.id.clone()));
            }
        }

        Ok(Self { garments })
    }

    /// The built-in wardrobe
    pub fn builtin() -> Self {
        Self {
            garments: builtin_garments(),
        }
    }

    /// Load a replacement catalog from a JSON array of garments
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read catalog {}: {}", path.display(), e))?;
        let garments: Vec<Garment> = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse catalog {}: {}", path.display(), e))?;

        let catalog = Self::new(garments)?;
        info!("Loaded {} garments from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// All garments, in display order
    pub fn list(&self) -> &[Garment] {
        &self.garments
    }

    /// Look up a garment by id
    pub fn get(&self, id: &str) -> Option<&Garment> {
        self.garments.iter().find(|g| g.id == id)
    }

    /// Garments in a category (case-insensitive)
    pub fn by_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Garment> + 'a {
        self.garments
            .iter()
            .filter(move |g| g.category.eq_ignore_ascii_case(category))
    }

    pub fn len(&self) -> usize {
        self.garments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.garments.is_empty()
    }
}

fn garment(id: &str, name: &str, photo: &str, tint: Tint) -> Garment {
    Garment {
        id: id.to_string(),
        name: name.to_string(),
        category: "tops".to_string(),
        image_url: format!(
            "https://images.unsplash.com/photo-{}?w=200&h=200&fit=crop",
            photo
        ),
        overlay_color: tint,
    }
}

fn builtin_garments() -> Vec<Garment> {
    vec![
        garment(
            "tshirt-white",
            "White T-Shirt",
            "1521572163474-6864f9cf17ab",
            Tint::new(255, 255, 255, 0.85),
        ),
        garment(
            "tshirt-black",
            "Black T-Shirt",
            "1503341504253-dff4815485f1",
            Tint::new(30, 30, 30, 0.9),
        ),
        garment(
            "hoodie-gray",
            "Gray Hoodie",
            "1556821840-3a63f95609a7",
            Tint::new(100, 100, 100, 0.85),
        ),
        garment(
            "jacket-denim",
            "Denim Jacket",
            "1576995853123-5a10305d93c0",
            Tint::new(70, 100, 140, 0.85),
        ),
        garment(
            "sweater-red",
            "Red Sweater",
            "1434389677669-e08b4cac3105",
            Tint::new(180, 50, 50, 0.85),
        ),
        garment(
            "blazer-navy",
            "Navy Blazer",
            "1507679799987-c73779587ccf",
            Tint::new(30, 40, 70, 0.9),
        ),
    ]
}
