//! 内存价格缓存
//!
//! 以 DashMap 存储，同一 key 的并发写入以最后一次为准。

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use pricing_shared::error::Result;

use super::traits::{ProductCacheRepositoryTrait, ToppingCacheRepositoryTrait};
use crate::models::{PriceConfiguration, ProductPriceEntry, ToppingPriceEntry};

/// 同时实现商品和配料两个仓储接口的内存缓存
#[derive(Default)]
pub struct InMemoryPriceCache {
    products: DashMap<String, PriceConfiguration>,
    toppings: DashMap<String, i64>,
}

impl InMemoryPriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn product(&self, product_id: &str) -> Option<ProductPriceEntry> {
        self.products.get(product_id).map(|entry| ProductPriceEntry {
            product_id: entry.key().clone(),
            price_configuration: entry.value().clone(),
        })
    }

    pub fn topping(&self, topping_id: &str) -> Option<ToppingPriceEntry> {
        self.toppings.get(topping_id).map(|entry| ToppingPriceEntry {
            topping_id: entry.key().clone(),
            price: *entry.value(),
        })
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    pub fn topping_count(&self) -> usize {
        self.toppings.len()
    }
}

/// 按输入顺序去重，保证批量查询结果中每个 id 至多出现一次
fn distinct(ids: &[String]) -> impl Iterator<Item = &String> {
    let mut seen = HashSet::new();
    ids.iter().filter(move |id| seen.insert(id.as_str()))
}

#[async_trait]
impl ProductCacheRepositoryTrait for InMemoryPriceCache {
    async fn upsert(&self, entry: &ProductPriceEntry) -> Result<()> {
        self.products
            .insert(entry.product_id.clone(), entry.price_configuration.clone());
        Ok(())
    }

    async fn find_by_ids(&self, product_ids: &[String]) -> Result<Vec<ProductPriceEntry>> {
        Ok(distinct(product_ids)
            .filter_map(|id| self.product(id))
            .collect())
    }
}

#[async_trait]
impl ToppingCacheRepositoryTrait for InMemoryPriceCache {
    async fn upsert(&self, entry: &ToppingPriceEntry) -> Result<()> {
        self.toppings.insert(entry.topping_id.clone(), entry.price);
        Ok(())
    }

    async fn find_by_ids(&self, topping_ids: &[String]) -> Result<Vec<ToppingPriceEntry>> {
        Ok(distinct(topping_ids)
            .filter_map(|id| self.topping(id))
            .collect())
    }
}
