//! Per-line tax arithmetic.

use rust_decimal::Decimal;

use super::fonts::{can_render, Face};

const RUPEE: char = '\u{20b9}';

/// Derived amounts for one invoice line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    pub taxable_value: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
}

impl LineAmounts {
    /// `tax_rate` is a percentage, e.g. `18` for 18%.
    ///
    /// Returns `None` when an intermediate value leaves the `Decimal` range.
    pub fn compute(unit_price: Decimal, quantity: i32, tax_rate: Decimal) -> Option<Self> {
        let taxable_value = unit_price.checked_mul(Decimal::from(quantity))?;
        let tax_amount = taxable_value
            .checked_mul(tax_rate)?
            .checked_div(Decimal::ONE_HUNDRED)?;
        let line_total = taxable_value.checked_add(tax_amount)?;
        Some(Self {
            taxable_value,
            tax_amount,
            line_total,
        })
    }
}

/// Two-decimal money text in the document's currency notation.
pub fn format_money(amount: Decimal) -> String {
    let amount = amount.round_dp(2);
    if can_render(Face::Regular, RUPEE) && can_render(Face::Bold, RUPEE) {
        format!("{RUPEE} {amount:.2}")
    } else {
        format!("Rs. {amount:.2}")
    }
}
