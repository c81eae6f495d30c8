//! 购物车
//!
//! 客户端提交的购物车只用于确定"买了什么"，价格一律以缓存为准；
//! 唯一例外是配料缓存未命中时回退到 `SelectedTopping::price`。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// 购物车中的一项商品
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(rename = "_id")]
    #[validate(length(min = 1, message = "商品 ID 不能为空"))]
    pub id: String,
    #[validate(range(min = 1, message = "商品数量必须为正整数"))]
    pub qty: u32,
    #[validate(nested)]
    pub chosen_configuration: ChosenConfiguration,
}

/// 用户选择的商品配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChosenConfiguration {
    /// 选项名 -> 选中的值，如 `Size -> Medium`
    pub price_configuration: BTreeMap<String, String>,
    #[serde(default)]
    #[validate(nested)]
    pub selected_toppings: Vec<SelectedTopping>,
}

/// 选中的配料，`price` 为客户端展示时的价格
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SelectedTopping {
    pub id: String,
    #[validate(range(min = 0, message = "配料价格不能为负数"))]
    pub price: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_item_wire_format() {
        let json = r#"{
            "_id": "pizza-1",
            "qty": 2,
            "name": "Margherita",
            "chosenConfiguration": {
                "priceConfiguration": { "Size": "Medium" },
                "selectedToppings": [{ "id": "cheese", "price": 50, "name": "Cheese" }]
            }
        }"#;

        let item: CartItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, "pizza-1");
        assert_eq!(item.qty, 2);
        assert_eq!(item.chosen_configuration.price_configuration["Size"], "Medium");
        assert_eq!(item.chosen_configuration.selected_toppings[0].price, 50);

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["_id"], "pizza-1");
    }

    #[test]
    fn test_zero_quantity_is_invalid() {
        let item = CartItem {
            id: "pizza-1".to_string(),
            qty: 0,
            chosen_configuration: ChosenConfiguration::default(),
        };
        assert!(item.validate().is_err());
    }

    #[test]
    fn test_negative_topping_price_is_invalid() {
        let item = CartItem {
            id: "pizza-1".to_string(),
            qty: 1,
            chosen_configuration: ChosenConfiguration {
                price_configuration: BTreeMap::new(),
                selected_toppings: vec![SelectedTopping {
                    id: "uncached".to_string(),
                    price: -10_000,
                }],
            },
        };
        assert!(item.validate().is_err());

        let mut free = item.clone();
        free.chosen_configuration.selected_toppings[0].price = 0;
        assert!(free.validate().is_ok());
    }

    #[test]
    fn test_negative_quantity_is_rejected_on_decode() {
        let json = r#"{"_id":"p","qty":-1,"chosenConfiguration":{"priceConfiguration":{}}}"#;
        assert!(serde_json::from_str::<CartItem>(json).is_err());
    }
}
