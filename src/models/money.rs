//! 金额运算辅助: 高精度十进制, 末步四舍五入

use bigdecimal::{BigDecimal, RoundingMode};

/// 末步保留 2 位小数 (half-up)
pub fn round2(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(2, RoundingMode::HalfUp)
}

/// base × rate / 100, 仅在最后一步取整, 避免误差累积
pub fn percent_of(base: &BigDecimal, rate: &BigDecimal) -> BigDecimal {
    round2(&(base * rate / BigDecimal::from(100)))
}

/// 绝对差值
pub fn abs_diff(a: &BigDecimal, b: &BigDecimal) -> BigDecimal {
    (a - b).abs()
}

/// 税额校验容差: min(重算值的 1%, 0.02)
pub fn value_tolerance(recomputed: &BigDecimal) -> BigDecimal {
    let relative = recomputed.abs() / BigDecimal::from(100);
    let cents = cents_tolerance();
    if relative < cents {
        relative
    } else {
        cents
    }
}

/// 固定最小容差 (0.02 货币单位)
pub fn cents_tolerance() -> BigDecimal {
    BigDecimal::new(2.into(), 2)
}

/// 发票级合计容差 (0.01 货币单位, 吸收行级取整)
pub fn totals_tolerance() -> BigDecimal {
    BigDecimal::new(1.into(), 2)
}

/// 两值在容差内视为一致
pub fn within(a: &BigDecimal, b: &BigDecimal, tolerance: &BigDecimal) -> bool {
    abs_diff(a, b) <= *tolerance
}

/// 报表金额格式化 ("10.80" 而非 "10.8")
pub fn fmt_money(value: &BigDecimal) -> String {
    round2(value).to_string()
}
