// src/catalog.rs
//! # Discount Resolver
//! Per-merchant discount lookup against the catalog. Merchant display names
//! split at the first whitespace into `(brand, branch?)`; an unresolved branch
//! still returns brand-level programs, an unresolved brand returns an empty
//! list with a reason. Storage errors become per-merchant error entries; the
//! batch call itself never aborts.
//!
//! The real catalog lives behind [`DiscountCatalog`]; [`MemoryCatalog`] is the
//! in-process implementation used in tests and degraded mode.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::discount::{conditions_satisfied, DiscountProgram, RequiredConditions};
use crate::profile::NormalizedProfile;

/// Process-wide cap on concurrent catalog connections.
pub const MAX_CATALOG_CONNECTIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    pub brand_id: i64,
    pub brand_name: String,
    pub brand_owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub branch_id: i64,
    pub brand_id: i64,
    pub branch_name: String,
}

/// Catalog interface. `find_applicable_discounts` already applies activity and
/// temporal admission; condition lists load separately per program.
#[async_trait]
pub trait DiscountCatalog: Send + Sync {
    async fn find_brand(&self, name: &str) -> Result<Option<Brand>>;
    async fn find_branch(&self, brand_id: i64, branch_name: &str) -> Result<Option<Branch>>;
    async fn find_applicable_discounts(
        &self,
        brand_id: i64,
        branch_id: Option<i64>,
        now: NaiveDateTime,
    ) -> Result<Vec<DiscountProgram>>;
    async fn load_required_conditions(&self, discount_id: i64) -> Result<RequiredConditions>;
}

/// Split "스타벅스 동국대점" into ("스타벅스", Some("동국대점")) at the first
/// whitespace. This exact rule must round-trip the display names merchant
/// discovery produces.
pub fn split_store_name(store: &str) -> (&str, Option<&str>) {
    let store = store.trim();
    match store.split_once(char::is_whitespace) {
        Some((brand, branch)) => {
            let branch = branch.trim();
            if branch.is_empty() {
                (brand, None)
            } else {
                (brand, Some(branch))
            }
        }
        None => (store, None),
    }
}

/// Merchant match info in a resolve result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantMatch {
    pub brand: Option<Brand>,
    pub branch: Option<Branch>,
}

/// Resolve result for one merchant name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDiscounts {
    pub input_store_name: String,
    pub matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub merchant: MerchantMatch,
    #[serde(default)]
    pub discounts: Vec<DiscountProgram>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StoreDiscounts {
    fn brand_not_found(store: String) -> Self {
        Self {
            input_store_name: store,
            matched: false,
            reason: Some("해당 브랜드를 찾을 수 없습니다.".to_string()),
            merchant: MerchantMatch::default(),
            discounts: Vec::new(),
            error: None,
        }
    }

    fn storage_error(store: String, error: String) -> Self {
        Self {
            input_store_name: store,
            matched: false,
            reason: Some("할인 정보 조회 중 오류가 발생했습니다.".to_string()),
            merchant: MerchantMatch::default(),
            discounts: Vec::new(),
            error: Some(error),
        }
    }
}

/// Envelope over a batch resolve; always returned, even on partial failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOutcome {
    pub success: bool,
    pub message: String,
    pub total: usize,
    pub results: Vec<StoreDiscounts>,
}

/// Batch resolver; owns the catalog connection cap.
pub struct DiscountResolver {
    catalog: Arc<dyn DiscountCatalog>,
    pool: Arc<Semaphore>,
}

impl DiscountResolver {
    pub fn new(catalog: Arc<dyn DiscountCatalog>) -> Self {
        Self::with_connection_cap(catalog, MAX_CATALOG_CONNECTIONS)
    }

    pub fn with_connection_cap(catalog: Arc<dyn DiscountCatalog>, cap: usize) -> Self {
        Self {
            catalog,
            pool: Arc::new(Semaphore::new(cap.max(1))),
        }
    }

    /// Resolve discounts for every merchant name. Results come back in input
    /// order; per-merchant failures produce error entries.
    pub async fn resolve(
        &self,
        profile: &NormalizedProfile,
        store_names: &[String],
        now: NaiveDateTime,
    ) -> ResolveOutcome {
        let mut tasks = JoinSet::new();
        for (idx, store) in store_names.iter().enumerate() {
            let catalog = Arc::clone(&self.catalog);
            let pool = Arc::clone(&self.pool);
            let profile = profile.clone();
            let store = store.clone();
            tasks.spawn(async move {
                let _permit = pool.acquire_owned().await.ok();
                let entry = match resolve_single(catalog, &profile, &store, now).await {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(target: "catalog", error = ?e, store = %store, "per-store resolve failed");
                        StoreDiscounts::storage_error(store, e.to_string())
                    }
                };
                (idx, entry)
            });
        }

        let mut slots: Vec<Option<StoreDiscounts>> = (0..store_names.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            if let Ok((idx, entry)) = joined {
                slots[idx] = Some(entry);
            }
        }

        let results: Vec<StoreDiscounts> = slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| {
                    StoreDiscounts::storage_error(
                        store_names.get(idx).cloned().unwrap_or_default(),
                        "resolver task failed".to_string(),
                    )
                })
            })
            .collect();

        ResolveOutcome {
            success: true,
            message: "할인 정보 조회 완료".to_string(),
            total: results.len(),
            results,
        }
    }
}

async fn resolve_single(
    catalog: Arc<dyn DiscountCatalog>,
    profile: &NormalizedProfile,
    store: &str,
    now: NaiveDateTime,
) -> Result<StoreDiscounts> {
    let (brand_name, branch_name) = split_store_name(store);

    let Some(brand) = catalog.find_brand(brand_name).await? else {
        return Ok(StoreDiscounts::brand_not_found(store.to_string()));
    };

    let mut branch = None;
    let mut reason = None;
    if let Some(branch_name) = branch_name {
        match catalog.find_branch(brand.brand_id, branch_name).await? {
            Some(found) => branch = Some(found),
            None => {
                reason = Some(
                    "해당 지점을 찾을 수 없습니다. (브랜드 기준 할인만 조회했습니다.)".to_string(),
                );
            }
        }
    }

    let branch_id = branch.as_ref().map(|b| b.branch_id);
    let mut discounts = catalog
        .find_applicable_discounts(brand.brand_id, branch_id, now)
        .await?;

    for program in &mut discounts {
        if let Some(discount_id) = program.discount_id {
            program.required_conditions = catalog.load_required_conditions(discount_id).await?;
        }
        program.applied_by_user_profile =
            conditions_satisfied(profile, &program.required_conditions);
    }

    // Deterministic ordering.
    discounts.sort_by(|a, b| {
        (a.provider_type, &a.discount_name).cmp(&(b.provider_type, &b.discount_name))
    });

    Ok(StoreDiscounts {
        input_store_name: store.to_string(),
        matched: true,
        reason,
        merchant: MerchantMatch {
            brand: Some(brand),
            branch,
        },
        discounts,
        error: None,
    })
}

// ------------------------------------------------------------
// In-memory catalog
// ------------------------------------------------------------

/// Where a program applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramTarget {
    Brand(i64),
    Branch(i64),
    /// No explicit target: applies to every merchant.
    AllMerchants,
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    program: DiscountProgram,
    target: ProgramTarget,
    is_active: bool,
}

/// In-memory catalog used by tests, the demo binary, and degraded mode.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    brands: Vec<Brand>,
    branches: Vec<Branch>,
    entries: Vec<CatalogEntry>,
    conditions: HashMap<i64, RequiredConditions>,
    next_id: i64,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_brand(&mut self, name: &str) -> i64 {
        let brand_id = self.brands.len() as i64 + 1;
        self.brands.push(Brand {
            brand_id,
            brand_name: name.to_string(),
            brand_owner: None,
        });
        brand_id
    }

    pub fn add_branch(&mut self, brand_id: i64, name: &str) -> i64 {
        let branch_id = self.branches.len() as i64 + 1;
        self.branches.push(Branch {
            branch_id,
            brand_id,
            branch_name: name.to_string(),
        });
        branch_id
    }

    /// Register a program; returns its assigned discount id.
    pub fn add_program(
        &mut self,
        target: ProgramTarget,
        mut program: DiscountProgram,
        conditions: RequiredConditions,
    ) -> i64 {
        self.next_id += 1;
        let discount_id = self.next_id;
        program.discount_id = Some(discount_id);
        self.conditions.insert(discount_id, conditions);
        self.entries.push(CatalogEntry {
            program,
            target,
            is_active: true,
        });
        discount_id
    }

    pub fn deactivate(&mut self, discount_id: i64) {
        for entry in &mut self.entries {
            if entry.program.discount_id == Some(discount_id) {
                entry.is_active = false;
            }
        }
    }
}

#[async_trait]
impl DiscountCatalog for MemoryCatalog {
    async fn find_brand(&self, name: &str) -> Result<Option<Brand>> {
        Ok(self
            .brands
            .iter()
            .find(|b| b.brand_name == name.trim())
            .cloned())
    }

    async fn find_branch(&self, brand_id: i64, branch_name: &str) -> Result<Option<Branch>> {
        Ok(self
            .branches
            .iter()
            .find(|b| b.brand_id == brand_id && b.branch_name == branch_name.trim())
            .cloned())
    }

    async fn find_applicable_discounts(
        &self,
        brand_id: i64,
        branch_id: Option<i64>,
        now: NaiveDateTime,
    ) -> Result<Vec<DiscountProgram>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.is_active)
            .filter(|entry| match entry.target {
                ProgramTarget::Brand(id) => id == brand_id,
                ProgramTarget::Branch(id) => Some(id) == branch_id,
                ProgramTarget::AllMerchants => true,
            })
            .filter(|entry| {
                entry
                    .program
                    .constraints
                    .as_ref()
                    .map(|c| c.admits_instant(now))
                    .unwrap_or(true)
            })
            .map(|entry| entry.program.clone())
            .collect())
    }

    async fn load_required_conditions(&self, discount_id: i64) -> Result<RequiredConditions> {
        Ok(self.conditions.get(&discount_id).cloned().unwrap_or_default())
    }
}

/// Catalog whose every call fails; exercises degraded resolution.
pub struct UnavailableCatalog;

#[async_trait]
impl DiscountCatalog for UnavailableCatalog {
    async fn find_brand(&self, _name: &str) -> Result<Option<Brand>> {
        anyhow::bail!("discount store unavailable")
    }
    async fn find_branch(&self, _brand_id: i64, _branch_name: &str) -> Result<Option<Branch>> {
        anyhow::bail!("discount store unavailable")
    }
    async fn find_applicable_discounts(
        &self,
        _brand_id: i64,
        _branch_id: Option<i64>,
        _now: NaiveDateTime,
    ) -> Result<Vec<DiscountProgram>> {
        anyhow::bail!("discount store unavailable")
    }
    async fn load_required_conditions(&self, _discount_id: i64) -> Result<RequiredConditions> {
        anyhow::bail!("discount store unavailable")
    }
}
