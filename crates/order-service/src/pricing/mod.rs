//! 订单计价引擎
//!
//! 计价只读价格缓存，与缓存同步之间不做任何协调，读到的是某一时刻的快照。
//!
//! 计算步骤：
//! 1. 收集购物车中去重后的商品 ID 与配料 ID，并发批量查询缓存，同时查询优惠券
//! 2. 单项价格 = 各选中配置项价格之和 + 配料价格之和，再乘以数量
//! 3. 折扣 = round(小计 × 折扣率 / 100)
//! 4. 税费 = round((小计 - 折扣) × 税率 / 100)
//! 5. 合计 = 小计 - 折扣 + 税费 + 配送费

mod rounding;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use price_cache::models::PriceConfiguration;
use price_cache::repository::{ProductCacheRepositoryTrait, ToppingCacheRepositoryTrait};
use pricing_shared::config::PricingConfig;
use pricing_shared::observability::metrics;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::{PricingError, Result};
use crate::models::CartItem;
use crate::repository::CouponRepositoryTrait;

pub use rounding::{percent_of, round_half_up};

/// 配料缓存未命中、回退使用购物车价格的记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToppingFallback {
    pub product_id: String,
    pub topping_id: String,
    /// 实际计入的购物车价格
    pub price: i64,
}

/// 计价结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub subtotal: i64,
    pub discount: i64,
    pub taxes: i64,
    pub delivery_charges: i64,
    pub total: i64,
    pub topping_fallbacks: Vec<ToppingFallback>,
}

/// 订单计价引擎
pub struct PricingEngine {
    products: Arc<dyn ProductCacheRepositoryTrait>,
    toppings: Arc<dyn ToppingCacheRepositoryTrait>,
    coupons: Arc<dyn CouponRepositoryTrait>,
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(
        products: Arc<dyn ProductCacheRepositoryTrait>,
        toppings: Arc<dyn ToppingCacheRepositoryTrait>,
        coupons: Arc<dyn CouponRepositoryTrait>,
        config: PricingConfig,
    ) -> Self {
        Self {
            products,
            toppings,
            coupons,
            config,
        }
    }

    /// 以当前时间计价
    pub async fn calculate(
        &self,
        cart: &[CartItem],
        coupon_code: Option<&str>,
        tenant_id: &str,
    ) -> Result<PriceBreakdown> {
        self.calculate_at(cart, coupon_code, tenant_id, Utc::now())
            .await
    }

    /// 以指定时间计价，`now` 只用于判断优惠券是否过期
    #[instrument(skip(self, cart, now), fields(items = cart.len()))]
    pub async fn calculate_at(
        &self,
        cart: &[CartItem],
        coupon_code: Option<&str>,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PriceBreakdown> {
        let result = self.compute(cart, coupon_code, tenant_id, now).await;

        let status = match &result {
            Ok(_) => "success",
            Err(e) if e.is_client_error() => "rejected",
            Err(_) => "error",
        };
        metrics::record_pricing_calculation(status);

        result
    }

    async fn compute(
        &self,
        cart: &[CartItem],
        coupon_code: Option<&str>,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PriceBreakdown> {
        let product_ids = distinct(cart.iter().map(|item| item.id.as_str()));
        let topping_ids = distinct(cart.iter().flat_map(|item| {
            item.chosen_configuration
                .selected_toppings
                .iter()
                .map(|topping| topping.id.as_str())
        }));

        let (products, toppings, discount_percent) = tokio::try_join!(
            async {
                self.products
                    .find_by_ids(&product_ids)
                    .await
                    .map_err(PricingError::from)
            },
            async {
                self.toppings
                    .find_by_ids(&topping_ids)
                    .await
                    .map_err(PricingError::from)
            },
            self.discount_percent(coupon_code, tenant_id, now),
        )?;

        let product_prices: HashMap<&str, &PriceConfiguration> = products
            .iter()
            .map(|entry| (entry.product_id.as_str(), &entry.price_configuration))
            .collect();
        let topping_prices: HashMap<&str, i64> = toppings
            .iter()
            .map(|entry| (entry.topping_id.as_str(), entry.price))
            .collect();

        let mut subtotal: i64 = 0;
        let mut topping_fallbacks = Vec::new();

        for item in cart {
            let item_total =
                item_total(item, &product_prices, &topping_prices, &mut topping_fallbacks)?;
            subtotal = checked(subtotal.checked_add(item_total))?;
        }

        if !topping_fallbacks.is_empty() {
            warn!(
                fallbacks = topping_fallbacks.len(),
                "配料价格缓存未命中，已使用购物车价格"
            );
            metrics::record_topping_fallback(topping_fallbacks.len() as u64);
        }

        let discount = percent_of(subtotal, discount_percent);
        let after_discount = subtotal - discount;
        let taxes = percent_of(after_discount, self.config.tax_percent);
        let delivery_charges = self.config.delivery_charge;
        let total = checked(
            after_discount
                .checked_add(taxes)
                .and_then(|v| v.checked_add(delivery_charges)),
        )?;

        debug!(subtotal, discount, taxes, delivery_charges, total, "订单计价完成");

        Ok(PriceBreakdown {
            subtotal,
            discount,
            taxes,
            delivery_charges,
            total,
            topping_fallbacks,
        })
    }

    /// 优惠券不存在或已过期都按 0 处理，不视为错误
    async fn discount_percent(
        &self,
        coupon_code: Option<&str>,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let Some(code) = coupon_code.filter(|code| !code.trim().is_empty()) else {
            return Ok(0);
        };

        match self.coupons.find_one(code, tenant_id).await? {
            Some(coupon) if coupon.is_valid_at(now) => Ok(coupon.discount_percent_at(now)),
            Some(coupon) => {
                debug!(code, valid_upto = %coupon.valid_upto, "优惠券已过期");
                Ok(0)
            }
            None => {
                debug!(code, tenant_id, "优惠券不存在");
                Ok(0)
            }
        }
    }
}

/// 单项商品合计：(配置项价格 + 配料价格) × 数量
fn item_total(
    item: &CartItem,
    product_prices: &HashMap<&str, &PriceConfiguration>,
    topping_prices: &HashMap<&str, i64>,
    fallbacks: &mut Vec<ToppingFallback>,
) -> Result<i64> {
    let Some(configuration) = product_prices.get(item.id.as_str()) else {
        return Err(PricingError::CacheMiss {
            product_id: item.id.clone(),
        });
    };

    let mut unit_price: i64 = 0;

    for (option, value) in &item.chosen_configuration.price_configuration {
        let price_option =
            configuration
                .get(option)
                .ok_or_else(|| PricingError::ConfigurationMismatch {
                    product_id: item.id.clone(),
                    option: option.clone(),
                    value: None,
                })?;
        let price = price_option
            .price_of(value)
            .ok_or_else(|| PricingError::ConfigurationMismatch {
                product_id: item.id.clone(),
                option: option.clone(),
                value: Some(value.clone()),
            })?;
        unit_price = checked(unit_price.checked_add(price))?;
    }

    for topping in &item.chosen_configuration.selected_toppings {
        let price = match topping_prices.get(topping.id.as_str()) {
            Some(price) => *price,
            None if topping.price < 0 => {
                return Err(PricingError::InvalidCart(format!(
                    "配料 {} 的价格不能为负数",
                    topping.id
                )));
            }
            None => {
                fallbacks.push(ToppingFallback {
                    product_id: item.id.clone(),
                    topping_id: topping.id.clone(),
                    price: topping.price,
                });
                topping.price
            }
        };
        unit_price = checked(unit_price.checked_add(price))?;
    }

    checked(unit_price.checked_mul(i64::from(item.qty)))
}

fn checked(value: Option<i64>) -> Result<i64> {
    value.ok_or_else(|| PricingError::InvalidCart("订单金额溢出".to_string()))
}

/// 按首次出现的顺序去重
fn distinct<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChosenConfiguration, Coupon, SelectedTopping};
    use crate::repository::MockCouponRepositoryTrait;
    use chrono::Duration;
    use price_cache::models::{PriceOption, ProductPriceEntry, ToppingPriceEntry};
    use price_cache::repository::InMemoryPriceCache;
    use pricing_shared::error::ServiceError;
    use std::collections::BTreeMap;

    /// Margherita：Size Medium 600 + Crust Thick 100，Cheese 配料 50
    async fn seeded_cache() -> Arc<InMemoryPriceCache> {
        let cache = Arc::new(InMemoryPriceCache::new());

        let mut size = BTreeMap::new();
        size.insert("Small".to_string(), 400);
        size.insert("Medium".to_string(), 600);
        let mut crust = BTreeMap::new();
        crust.insert("Thin".to_string(), 50);
        crust.insert("Thick".to_string(), 100);

        let mut configuration = PriceConfiguration::new();
        configuration.insert(
            "Size".to_string(),
            PriceOption {
                price_type: "base".to_string(),
                available_options: size,
            },
        );
        configuration.insert(
            "Crust".to_string(),
            PriceOption {
                price_type: "additional".to_string(),
                available_options: crust,
            },
        );

        ProductCacheRepositoryTrait::upsert(
            cache.as_ref(),
            &ProductPriceEntry {
                product_id: "pizza-1".to_string(),
                price_configuration: configuration,
            },
        )
        .await
        .unwrap();
        ToppingCacheRepositoryTrait::upsert(
            cache.as_ref(),
            &ToppingPriceEntry {
                topping_id: "cheese".to_string(),
                price: 50,
            },
        )
        .await
        .unwrap();

        cache
    }

    fn pizza(qty: u32, size: &str, toppings: Vec<SelectedTopping>) -> CartItem {
        let mut price_configuration = BTreeMap::new();
        price_configuration.insert("Size".to_string(), size.to_string());
        price_configuration.insert("Crust".to_string(), "Thick".to_string());
        CartItem {
            id: "pizza-1".to_string(),
            qty,
            chosen_configuration: ChosenConfiguration {
                price_configuration,
                selected_toppings: toppings,
            },
        }
    }

    fn cheese() -> SelectedTopping {
        SelectedTopping {
            id: "cheese".to_string(),
            price: 999,
        }
    }

    fn no_coupons() -> MockCouponRepositoryTrait {
        let mut coupons = MockCouponRepositoryTrait::new();
        coupons.expect_find_one().never();
        coupons
    }

    fn coupon_valid_until(valid_upto: DateTime<Utc>) -> MockCouponRepositoryTrait {
        let mut coupons = MockCouponRepositoryTrait::new();
        coupons
            .expect_find_one()
            .withf(|code, tenant| code == "WELCOME10" && tenant == "tenant-1")
            .returning(move |_, _| {
                Ok(Some(Coupon {
                    id: 1,
                    code: "WELCOME10".to_string(),
                    tenant_id: "tenant-1".to_string(),
                    discount: 10,
                    valid_upto,
                }))
            });
        coupons
    }

    fn engine(cache: Arc<InMemoryPriceCache>, coupons: MockCouponRepositoryTrait) -> PricingEngine {
        PricingEngine::new(
            cache.clone(),
            cache,
            Arc::new(coupons),
            PricingConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_total_without_coupon() {
        // (Small 400 + Thick 100 + Cheese 50) × 2 = 1100
        let engine = engine(seeded_cache().await, no_coupons());
        let cart = vec![pizza(2, "Small", vec![cheese()])];

        let breakdown = engine.calculate(&cart, None, "tenant-1").await.unwrap();

        assert_eq!(breakdown.subtotal, 1100);
        assert_eq!(breakdown.discount, 0);
        assert_eq!(breakdown.taxes, 198);
        assert_eq!(breakdown.delivery_charges, 100);
        assert_eq!(breakdown.total, 1398);
        assert!(breakdown.topping_fallbacks.is_empty());
    }

    #[tokio::test]
    async fn test_total_with_valid_coupon() {
        let now = Utc::now();
        let engine = engine(seeded_cache().await, coupon_valid_until(now + Duration::days(1)));
        let cart = vec![pizza(2, "Small", vec![cheese()])];

        let breakdown = engine
            .calculate_at(&cart, Some("WELCOME10"), "tenant-1", now)
            .await
            .unwrap();

        assert_eq!(breakdown.discount, 110);
        assert_eq!(breakdown.taxes, 178);
        assert_eq!(breakdown.total, 1268);
    }

    #[tokio::test]
    async fn test_coupon_applies_at_expiry_instant() {
        let now = Utc::now();
        let engine = engine(seeded_cache().await, coupon_valid_until(now));
        let cart = vec![pizza(2, "Small", vec![cheese()])];

        let breakdown = engine
            .calculate_at(&cart, Some("WELCOME10"), "tenant-1", now)
            .await
            .unwrap();

        assert_eq!(breakdown.discount, 110);
    }

    #[tokio::test]
    async fn test_expired_coupon_gives_no_discount() {
        let now = Utc::now();
        let engine = engine(seeded_cache().await, coupon_valid_until(now - Duration::days(1)));
        let cart = vec![pizza(2, "Small", vec![cheese()])];

        let breakdown = engine
            .calculate_at(&cart, Some("WELCOME10"), "tenant-1", now)
            .await
            .unwrap();

        assert_eq!(breakdown.discount, 0);
        assert_eq!(breakdown.total, 1398);
    }

    #[tokio::test]
    async fn test_unknown_coupon_gives_no_discount() {
        let mut coupons = MockCouponRepositoryTrait::new();
        coupons.expect_find_one().times(1).returning(|_, _| Ok(None));
        let engine = engine(seeded_cache().await, coupons);

        let breakdown = engine
            .calculate(&[pizza(2, "Small", vec![cheese()])], Some("NOPE"), "tenant-1")
            .await
            .unwrap();

        assert_eq!(breakdown.discount, 0);
    }

    #[tokio::test]
    async fn test_topping_cache_miss_falls_back_to_cart_price() {
        let engine = engine(seeded_cache().await, no_coupons());
        let olives = SelectedTopping {
            id: "olives".to_string(),
            price: 35,
        };
        let cart = vec![pizza(1, "Small", vec![cheese(), olives])];

        let breakdown = engine.calculate(&cart, None, "tenant-1").await.unwrap();

        // 400 + 100 + 50（缓存）+ 35（回退）
        assert_eq!(breakdown.subtotal, 585);
        assert_eq!(
            breakdown.topping_fallbacks,
            vec![ToppingFallback {
                product_id: "pizza-1".to_string(),
                topping_id: "olives".to_string(),
                price: 35,
            }]
        );
    }

    #[tokio::test]
    async fn test_negative_fallback_price_is_rejected() {
        let engine = engine(seeded_cache().await, no_coupons());
        let uncached = SelectedTopping {
            id: "uncached".to_string(),
            price: -10_000,
        };
        let cart = vec![pizza(1, "Small", vec![uncached])];

        let err = engine.calculate(&cart, None, "tenant-1").await.unwrap_err();

        assert!(matches!(err, PricingError::InvalidCart(_)));
    }

    #[tokio::test]
    async fn test_product_cache_miss_rejects_order() {
        let engine = engine(Arc::new(InMemoryPriceCache::new()), no_coupons());
        let cart = vec![pizza(1, "Small", vec![])];

        let err = engine.calculate(&cart, None, "tenant-1").await.unwrap_err();

        assert!(matches!(err, PricingError::CacheMiss { ref product_id } if product_id == "pizza-1"));
        assert_eq!(err.error_code(), "PRODUCT_CACHE_MISS");
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_unknown_option_value_is_mismatch() {
        let engine = engine(seeded_cache().await, no_coupons());
        let cart = vec![pizza(1, "Huge", vec![])];

        let err = engine.calculate(&cart, None, "tenant-1").await.unwrap_err();

        assert!(matches!(
            err,
            PricingError::ConfigurationMismatch { ref option, value: Some(ref value), .. }
                if option == "Size" && value == "Huge"
        ));
    }

    #[tokio::test]
    async fn test_unknown_option_name_is_mismatch() {
        let engine = engine(seeded_cache().await, no_coupons());
        let mut item = pizza(1, "Small", vec![]);
        item.chosen_configuration
            .price_configuration
            .insert("Sauce".to_string(), "Pesto".to_string());

        let err = engine.calculate(&[item], None, "tenant-1").await.unwrap_err();

        assert!(matches!(
            err,
            PricingError::ConfigurationMismatch { ref option, value: None, .. } if option == "Sauce"
        ));
    }

    #[tokio::test]
    async fn test_coupon_lookup_failure_propagates() {
        let mut coupons = MockCouponRepositoryTrait::new();
        coupons
            .expect_find_one()
            .returning(|_, _| Err(ServiceError::Database(sqlx::Error::PoolTimedOut)));
        let engine = engine(seeded_cache().await, coupons);

        let err = engine
            .calculate(&[pizza(1, "Small", vec![])], Some("WELCOME10"), "tenant-1")
            .await
            .unwrap_err();

        assert!(matches!(err, PricingError::Shared(ServiceError::Database(_))));
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn test_empty_cart_costs_only_delivery() {
        let engine = engine(Arc::new(InMemoryPriceCache::new()), no_coupons());

        let breakdown = engine.calculate(&[], None, "tenant-1").await.unwrap();

        assert_eq!(breakdown.subtotal, 0);
        assert_eq!(breakdown.taxes, 0);
        assert_eq!(breakdown.total, 100);
    }

    #[test]
    fn test_distinct_keeps_first_occurrence() {
        let ids = distinct(["b", "a", "b", "c", "a"].into_iter());
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
