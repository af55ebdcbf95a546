//! Catalog provider contract.
//!
//! Cohorts and promo codes are published by catalog administration. This
//! service only reads them.

use crate::types::{Cohort, CohortId, PromoCode};
use futures::future::BoxFuture;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Catalog failures
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Catalog unreachable
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
    /// Seed file unreadable
    #[error("failed to read catalog seed: {0}")]
    Io(#[from] std::io::Error),
    /// Seed file malformed
    #[error("failed to parse catalog seed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read access to the catalog
pub trait Catalog: Send + Sync {
    /// Cohort read model
    fn cohort(&self, id: CohortId) -> BoxFuture<'_, Result<Option<Cohort>, CatalogError>>;

    /// Promo code by normalized code
    fn promo_code(&self, code: &str) -> BoxFuture<'_, Result<Option<PromoCode>, CatalogError>>;
}

/// Seed file layout
#[derive(Debug, Default, Deserialize)]
pub struct CatalogSeed {
    /// Cohorts
    #[serde(default)]
    pub cohorts: Vec<Cohort>,
    /// Promo codes
    #[serde(default)]
    pub promo_codes: Vec<PromoCode>,
}

#[derive(Debug, Default)]
struct Tables {
    cohorts: HashMap<CohortId, Cohort>,
    promo_codes: HashMap<String, PromoCode>,
}

/// Catalog held in memory, optionally seeded from a JSON file
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryCatalog {
    /// Empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog from an already parsed seed
    #[must_use]
    pub fn from_seed(seed: CatalogSeed) -> Self {
        let catalog = Self::new();
        for cohort in seed.cohorts {
            catalog.upsert_cohort(cohort);
        }
        for promo in seed.promo_codes {
            catalog.upsert_promo_code(promo);
        }
        catalog
    }

    /// Load a JSON seed file (`{"cohorts": [...], "promo_codes": [...]}`)
    ///
    /// # Errors
    ///
    /// If the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        let seed: CatalogSeed = serde_json::from_str(&raw)?;
        tracing::info!(
            cohorts = seed.cohorts.len(),
            promo_codes = seed.promo_codes.len(),
            "Catalog seed loaded"
        );
        Ok(Self::from_seed(seed))
    }

    /// Insert or replace a cohort
    pub fn upsert_cohort(&self, cohort: Cohort) {
        self.write().cohorts.insert(cohort.id, cohort);
    }

    /// Insert or replace a promo code; the code is stored normalized
    pub fn upsert_promo_code(&self, mut promo: PromoCode) {
        promo.code = promo.code.trim().to_ascii_uppercase();
        self.write().promo_codes.insert(promo.code.clone(), promo);
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Catalog for InMemoryCatalog {
    fn cohort(&self, id: CohortId) -> BoxFuture<'_, Result<Option<Cohort>, CatalogError>> {
        let found = self.read().cohorts.get(&id).cloned();
        Box::pin(async move { Ok(found) })
    }

    fn promo_code(&self, code: &str) -> BoxFuture<'_, Result<Option<PromoCode>, CatalogError>> {
        let found = self.read().promo_codes.get(code).cloned();
        Box::pin(async move { Ok(found) })
    }
}
