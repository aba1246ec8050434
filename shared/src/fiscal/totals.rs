//! 税率档位与金额汇总

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// RKSV 税率档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxBracket {
    /// 20 %
    Normal,
    /// 10 %
    Reduced1,
    /// 13 %
    Reduced2,
    /// 19 %
    Special,
    /// 0 %
    Zero,
}

impl TaxBracket {
    pub const ALL: [TaxBracket; 5] = [
        TaxBracket::Normal,
        TaxBracket::Reduced1,
        TaxBracket::Reduced2,
        TaxBracket::Special,
        TaxBracket::Zero,
    ];

    /// 税率（百分比）
    pub fn rate_percent(&self) -> Decimal {
        match self {
            Self::Normal => Decimal::from(20),
            Self::Reduced1 => Decimal::from(10),
            Self::Reduced2 => Decimal::from(13),
            Self::Special => Decimal::from(19),
            Self::Zero => Decimal::ZERO,
        }
    }
}

/// 各税率档位的含税总额
///
/// 上游系统负责计算金额，这里只做汇总与校验。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxTotals {
    pub normal: Decimal,
    pub reduced1: Decimal,
    pub reduced2: Decimal,
    pub special: Decimal,
    pub zero: Decimal,
}

impl TaxTotals {
    pub fn get(&self, bracket: TaxBracket) -> Decimal {
        match bracket {
            TaxBracket::Normal => self.normal,
            TaxBracket::Reduced1 => self.reduced1,
            TaxBracket::Reduced2 => self.reduced2,
            TaxBracket::Special => self.special,
            TaxBracket::Zero => self.zero,
        }
    }

    /// 按档位迭代
    pub fn iter(&self) -> impl Iterator<Item = (TaxBracket, Decimal)> + '_ {
        TaxBracket::ALL.into_iter().map(|b| (b, self.get(b)))
    }

    /// 含税总额
    pub fn gross_total(&self) -> Decimal {
        self.iter().map(|(_, v)| v).sum()
    }

    /// 含在总额中的税额，每档四舍五入到分
    pub fn tax_total(&self) -> Decimal {
        let hundred = Decimal::ONE_HUNDRED;
        self.iter()
            .map(|(bracket, gross)| {
                let rate = bracket.rate_percent();
                if rate.is_zero() || gross.is_zero() {
                    return Decimal::ZERO;
                }
                let net = gross * hundred / (hundred + rate);
                (gross - net).round_dp(2)
            })
            .sum()
    }

    /// 逐档相加，溢出返回 None
    pub fn checked_add(&self, other: &TaxTotals) -> Option<TaxTotals> {
        Some(TaxTotals {
            normal: self.normal.checked_add(other.normal)?,
            reduced1: self.reduced1.checked_add(other.reduced1)?,
            reduced2: self.reduced2.checked_add(other.reduced2)?,
            special: self.special.checked_add(other.special)?,
            zero: self.zero.checked_add(other.zero)?,
        })
    }

    pub fn is_zero(&self) -> bool {
        self.iter().all(|(_, v)| v.is_zero())
    }

    pub fn all_non_negative(&self) -> bool {
        self.iter().all(|(_, v)| !v.is_sign_negative() || v.is_zero())
    }

    pub fn all_non_positive(&self) -> bool {
        self.iter().all(|(_, v)| !v.is_sign_positive() || v.is_zero())
    }

    /// 去掉尾随零，保证同一金额的文本表示唯一
    pub fn normalized(&self) -> TaxTotals {
        TaxTotals {
            normal: self.normal.normalize(),
            reduced1: self.reduced1.normalize(),
            reduced2: self.reduced2.normalize(),
            special: self.special.normalize(),
            zero: self.zero.normalize(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn gross_and_tax_totals() {
        let totals = TaxTotals {
            normal: d("12.00"),
            reduced1: d("11.00"),
            zero: d("3.50"),
            ..Default::default()
        };
        assert_eq!(totals.gross_total(), d("26.50"));
        // 12.00 含 20% -> 2.00；11.00 含 10% -> 1.00
        assert_eq!(totals.tax_total(), d("3.00"));
    }

    #[test]
    fn tax_rounds_per_bracket() {
        let totals = TaxTotals {
            reduced2: d("10.00"),
            ..Default::default()
        };
        // 10.00 - 10.00/1.13 = 1.1504...
        assert_eq!(totals.tax_total(), d("1.15"));
    }

    #[test]
    fn checked_add_and_signs() {
        let sale = TaxTotals {
            normal: d("10"),
            ..Default::default()
        };
        let credit = TaxTotals {
            normal: d("-4"),
            ..Default::default()
        };
        let sum = sale.checked_add(&credit).unwrap();
        assert_eq!(sum.normal, d("6"));
        assert!(sale.all_non_negative());
        assert!(!credit.all_non_negative());
        assert!(credit.all_non_positive());
        assert!(TaxTotals::default().is_zero());
        assert!(TaxTotals::default().all_non_negative());
        assert!(TaxTotals::default().all_non_positive());
    }

    #[test]
    fn normalized_strips_scale() {
        let a = TaxTotals {
            normal: d("10.50"),
            ..Default::default()
        };
        let b = TaxTotals {
            normal: d("10.5"),
            ..Default::default()
        };
        assert_eq!(
            a.normalized().normal.to_string(),
            b.normalized().normal.to_string()
        );
    }

    #[test]
    fn missing_brackets_default_to_zero() {
        let totals: TaxTotals = serde_json::from_str(r#"{"normal":"5.00"}"#).unwrap();
        assert_eq!(totals.normal, d("5.00"));
        assert!(totals.special.is_zero());
    }
}
