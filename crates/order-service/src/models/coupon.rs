//! 优惠券

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 租户内按 code 唯一的折扣券
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: i64,
    pub code: String,
    pub tenant_id: String,
    /// 折扣百分比，0-100
    pub discount: i64,
    pub valid_upto: DateTime<Utc>,
}

impl Coupon {
    /// 截止时间当刻仍然有效
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.valid_upto
    }

    /// `now` 时刻可享受的折扣百分比，过期为 0
    pub fn discount_percent_at(&self, now: DateTime<Utc>) -> i64 {
        if self.is_valid_at(now) {
            self.discount.clamp(0, 100)
        } else {
            0
        }
    }
}
