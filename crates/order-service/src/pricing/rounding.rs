//! 金额取整
//!
//! 所有派生金额（折扣、税费）都只在这里取整一次，计算全程使用整数，不经过浮点。

/// 计算 `numerator / denominator` 并四舍五入到整数，恰好一半时远离零
///
/// `denominator` 必须为正。结果超出 i64 范围时饱和。
pub fn round_half_up(numerator: i128, denominator: i128) -> i64 {
    debug_assert!(denominator > 0, "denominator must be positive");

    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    let rounded = if remainder.abs() * 2 >= denominator {
        quotient + numerator.signum()
    } else {
        quotient
    };

    i64::try_from(rounded).unwrap_or(if rounded < 0 { i64::MIN } else { i64::MAX })
}

/// `amount` 的 `percent`%，按 [`round_half_up`] 取整
pub fn percent_of(amount: i64, percent: i64) -> i64 {
    round_half_up(i128::from(amount) * i128::from(percent), 100)
}
