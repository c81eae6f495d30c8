//! 价格缓存领域模型
//!
//! 金额一律为最小货币单位的整数。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 单个可选项的定价，如 `Size` 下各尺寸的价格
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceOption {
    /// catalog 侧的定价类型（base / additional），计价时不区分
    pub price_type: String,
    /// 选项值 -> 价格
    pub available_options: BTreeMap<String, i64>,
}

impl PriceOption {
    pub fn price_of(&self, value: &str) -> Option<i64> {
        self.available_options.get(value).copied()
    }
}

/// 选项名 -> 选项定价
pub type PriceConfiguration = BTreeMap<String, PriceOption>;

/// 商品价格缓存条目，以 product_id 唯一
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPriceEntry {
    pub product_id: String,
    pub price_configuration: PriceConfiguration,
}

/// 配料价格缓存条目，以 topping_id 唯一
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToppingPriceEntry {
    pub topping_id: String,
    pub price: i64,
}

// ---------------------------------------------------------------------------
// 入站消息
// ---------------------------------------------------------------------------

/// `product` topic 的消息体
#[derive(Debug, Clone, Deserialize)]
pub struct ProductMessage {
    pub data: ProductData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductData {
    pub id: String,
    pub price_configuration: PriceConfiguration,
}

impl From<ProductData> for ProductPriceEntry {
    fn from(data: ProductData) -> Self {
        Self {
            product_id: data.id,
            price_configuration: data.price_configuration,
        }
    }
}

/// `topping` topic 的消息体
#[derive(Debug, Clone, Deserialize)]
pub struct ToppingMessage {
    pub data: ToppingData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToppingData {
    pub id: String,
    pub price: i64,
}

impl From<ToppingData> for ToppingPriceEntry {
    fn from(data: ToppingData) -> Self {
        Self {
            topping_id: data.id,
            price: data.price,
        }
    }
}
