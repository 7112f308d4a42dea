// src/discount/mod.rs
//! # Discount Domain
//! Shapes, constraints, required conditions, and the two evaluator concerns:
//! profile applicability and savings value on a reference order amount.
//!
//! Pure functions, no I/O; suitable for unit tests and offline evaluation.

pub mod payload;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::profile::NormalizedProfile;

/// Reference order amount for savings rankings (KRW, smallest unit).
pub const DEFAULT_REFERENCE_AMOUNT: i64 = 12_000;

/// Who grants the discount. Sort order follows the declaration order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderType {
    Telco,
    #[serde(alias = "CARD")]
    Payment,
    Membership,
    Affiliation,
    Store,
    Brand,
}

/// Wire form of a discount shape as the catalog emits it:
/// `{"kind": "PERCENT", "amount": 20.0, "maxAmount": 100000.0, "unitRule": null}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShapeWire {
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unit_rule: Option<UnitRuleWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnitRuleWire {
    #[serde(default)]
    unit_amount: Option<f64>,
    #[serde(default)]
    per_unit_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_discount_amount: Option<f64>,
}

/// Discount shape. All currency amounts are integers in the smallest unit;
/// percentages are reals in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ShapeWire", into = "ShapeWire")]
pub enum Shape {
    /// Percentage of the order, optionally capped.
    Percent { amount: f64, max_amount: Option<i64> },
    /// Flat deduction.
    Amount { amount: i64 },
    /// Fixed value per spending unit, e.g. 150 per 1 000, optionally capped.
    PerUnit {
        unit_amount: i64,
        per_unit_value: i64,
        max_discount_amount: Option<i64>,
    },
}

impl TryFrom<ShapeWire> for Shape {
    type Error = String;

    fn try_from(wire: ShapeWire) -> Result<Self, Self::Error> {
        match wire.kind.as_str() {
            "PERCENT" => Ok(Shape::Percent {
                amount: wire.amount.unwrap_or(0.0),
                max_amount: wire.max_amount.map(|v| v as i64),
            }),
            "AMOUNT" => Ok(Shape::Amount {
                amount: wire.amount.unwrap_or(0.0) as i64,
            }),
            "PER_UNIT" => {
                let rule = wire.unit_rule.unwrap_or(UnitRuleWire {
                    unit_amount: None,
                    per_unit_value: None,
                    max_discount_amount: None,
                });
                Ok(Shape::PerUnit {
                    unit_amount: rule.unit_amount.unwrap_or(1_000.0) as i64,
                    per_unit_value: rule.per_unit_value.unwrap_or(0.0) as i64,
                    max_discount_amount: rule.max_discount_amount.map(|v| v as i64),
                })
            }
            other => Err(format!("unknown discount shape kind: {other}")),
        }
    }
}

impl From<Shape> for ShapeWire {
    fn from(shape: Shape) -> Self {
        match shape {
            Shape::Percent { amount, max_amount } => ShapeWire {
                kind: "PERCENT".into(),
                amount: Some(amount),
                max_amount: max_amount.map(|v| v as f64),
                unit_rule: None,
            },
            Shape::Amount { amount } => ShapeWire {
                kind: "AMOUNT".into(),
                amount: Some(amount as f64),
                max_amount: None,
                unit_rule: None,
            },
            Shape::PerUnit {
                unit_amount,
                per_unit_value,
                max_discount_amount,
            } => ShapeWire {
                kind: "PER_UNIT".into(),
                amount: Some(0.0),
                max_amount: None,
                unit_rule: Some(UnitRuleWire {
                    unit_amount: Some(unit_amount as f64),
                    per_unit_value: Some(per_unit_value as f64),
                    max_discount_amount: max_discount_amount.map(|v| v as f64),
                }),
            },
        }
    }
}

/// Temporal/channel/order constraints attached to a program.
///
/// Time-of-day endpoints stay strings ("HH:MM" or "HH:MM:SS") because the
/// catalog wire format is not uniform; unparsable endpoints behave as
/// unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Constraints {
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    /// 7-bit day mask, Monday = bit 0.
    pub day_of_week_mask: Option<u8>,
    pub time_from: Option<String>,
    pub time_to: Option<String>,
    /// "ONLINE" | "OFFLINE" | "ONLINE/OFFLINE".
    pub channel_limit: Option<String>,
    pub required_level: Option<String>,
    pub qualification: Option<String>,
    pub application_menu: Option<String>,
    pub min_order_amount: Option<i64>,
    pub max_order_amount: Option<i64>,
}

fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .ok()
}

impl Constraints {
    /// True when `now` is admitted by the date range, weekday mask, and
    /// time-of-day window. Missing or unparsable parts do not constrain.
    pub fn admits_instant(&self, now: NaiveDateTime) -> bool {
        let today = now.date();
        if let Some(from) = self.valid_from {
            if today < from {
                return false;
            }
        }
        if let Some(to) = self.valid_to {
            if today > to {
                return false;
            }
        }
        if let Some(mask) = self.day_of_week_mask {
            let bit = 1u8 << now.weekday().num_days_from_monday();
            if mask & bit == 0 {
                return false;
            }
        }
        if let (Some(from), Some(to)) = (
            self.time_from.as_deref().and_then(parse_clock),
            self.time_to.as_deref().and_then(parse_clock),
        ) {
            let clock = now.time();
            let clock = clock.with_nanosecond(0).unwrap_or(clock);
            if clock < from || clock > to {
                return false;
            }
        }
        true
    }

    /// True when `channel` is allowed. "ONLINE/OFFLINE" admits both.
    pub fn channel_allows(&self, channel: &str) -> bool {
        match self.channel_limit.as_deref() {
            None => true,
            Some(limit) => limit
                .to_uppercase()
                .split('/')
                .any(|part| part.trim() == channel.trim().to_uppercase()),
        }
    }
}

/// Named references inside required conditions. Only the display name matters
/// for matching; identifiers never leave the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentRef {
    pub payment_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelcoRef {
    pub telco_name: String,
    pub telco_app_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MembershipRef {
    pub membership_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AffiliationRef {
    pub organization_name: String,
}

/// What a user must hold for the program to apply. All lists empty means the
/// program is public.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequiredConditions {
    pub payments: Vec<PaymentRef>,
    pub telcos: Vec<TelcoRef>,
    pub memberships: Vec<MembershipRef>,
    pub affiliations: Vec<AffiliationRef>,
}

impl RequiredConditions {
    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
            && self.telcos.is_empty()
            && self.memberships.is_empty()
            && self.affiliations.is_empty()
    }
}

/// One discount program as resolved for a merchant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountProgram {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_id: Option<i64>,
    pub discount_name: String,
    pub provider_type: ProviderType,
    pub provider_name: String,
    #[serde(default)]
    pub shape: Option<Shape>,
    #[serde(default)]
    pub constraints: Option<Constraints>,
    #[serde(default)]
    pub required_conditions: RequiredConditions,
    #[serde(default)]
    pub applied_by_user_profile: bool,
    /// `false` marks a points-accrual program, not a price reduction.
    #[serde(default = "default_true")]
    pub is_discount: bool,
}

fn default_true() -> bool {
    true
}

// ------------------------------------------------------------
// Savings value
// ------------------------------------------------------------

/// Effective savings of a shape on an order of `amount`.
///
/// The result never exceeds the order amount or the shape's cap.
pub fn savings_value(shape: &Shape, amount: i64) -> i64 {
    if amount <= 0 {
        return 0;
    }
    let value = match *shape {
        Shape::Percent {
            amount: percent,
            max_amount,
        } => {
            let raw = ((amount as f64) * percent / 100.0).floor() as i64;
            raw.min(max_amount.unwrap_or(i64::MAX))
        }
        Shape::Amount { amount: flat } => flat,
        Shape::PerUnit {
            unit_amount,
            per_unit_value,
            max_discount_amount,
        } => {
            if unit_amount <= 0 {
                return 0;
            }
            let units = amount / unit_amount;
            (units * per_unit_value).min(max_discount_amount.unwrap_or(i64::MAX))
        }
    };
    value.clamp(0, amount)
}

/// Best savings of a program; zero when it carries no shape.
pub fn program_value(program: &DiscountProgram, amount: i64) -> i64 {
    program
        .shape
        .as_ref()
        .map(|s| savings_value(s, amount))
        .unwrap_or(0)
}

/// Savings as a percentage of the order amount, rounded to two decimals.
pub fn discount_rate(value: i64, amount: i64) -> f64 {
    if amount == 0 {
        return 0.0;
    }
    ((value as f64) / (amount as f64) * 10_000.0).round() / 100.0
}

// ------------------------------------------------------------
// Applicability
// ------------------------------------------------------------

/// Case-insensitive equality or mutual containment, to absorb minor naming
/// drift ("KT" vs "KT 멤버십").
fn fuzzy_match(a: &str, b: &str) -> bool {
    let a = a.trim().to_uppercase();
    let b = b.trim().to_uppercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.contains(&b) || b.contains(&a)
}

/// Do the required conditions hold for the profile?
///
/// Empty conditions mean the program is public; otherwise any single match
/// across the four lists suffices.
pub fn conditions_satisfied(profile: &NormalizedProfile, required: &RequiredConditions) -> bool {
    if required.is_empty() {
        return true;
    }
    if let Some(telco) = &profile.telco {
        if required.telcos.iter().any(|t| fuzzy_match(telco, &t.telco_name)) {
            return true;
        }
    }
    if required
        .payments
        .iter()
        .any(|p| profile.cards.iter().any(|c| fuzzy_match(c, &p.payment_name)))
    {
        return true;
    }
    if required.memberships.iter().any(|m| {
        profile
            .memberships
            .iter()
            .any(|um| fuzzy_match(um, &m.membership_name))
    }) {
        return true;
    }
    required.affiliations.iter().any(|a| {
        profile
            .affiliations
            .iter()
            .any(|ua| fuzzy_match(ua, &a.organization_name))
    })
}

/// Full applicability of a program to a profile: the resolver's pre-computed
/// flag, public conditions, any condition match, or a public store promotion.
pub fn is_applicable(profile: &NormalizedProfile, program: &DiscountProgram) -> bool {
    if program.applied_by_user_profile {
        return true;
    }
    if program.provider_type == ProviderType::Store {
        return true;
    }
    conditions_satisfied(profile, &program.required_conditions)
}

// ------------------------------------------------------------
// Runtime constraint check (channel / order amount / clock)
// ------------------------------------------------------------

/// Runtime context for an on-the-spot eligibility check.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub now: NaiveDateTime,
    pub channel: String,
    pub order_amount: i64,
}

/// Check a program against runtime constraints. Returns `(applicable, reason)`
/// where the reason explains the first failing constraint.
pub fn check_runtime(program: &DiscountProgram, ctx: &RuntimeContext) -> (bool, Option<String>) {
    let Some(constraints) = &program.constraints else {
        return (true, None);
    };

    if !constraints.admits_instant(ctx.now) {
        return (false, Some("유효 기간 또는 요일/시간 제한".to_string()));
    }
    if !constraints.channel_allows(&ctx.channel) {
        return (
            false,
            Some(format!(
                "채널 불일치 (가능: {})",
                constraints.channel_limit.as_deref().unwrap_or("-")
            )),
        );
    }
    if let Some(min) = constraints.min_order_amount {
        if ctx.order_amount < min {
            return (false, Some(format!("최소 주문 금액 미달 (최소: {min}원)")));
        }
    }
    if let Some(max) = constraints.max_order_amount {
        if ctx.order_amount > max {
            return (false, Some(format!("최대 주문 금액 초과 (최대: {max}원)")));
        }
    }
    (true, None)
}
