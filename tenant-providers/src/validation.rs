//! Provider configuration validation.
//!
//! Validation is a pure function of a [`TenantProviderConfig`]. It collects
//! every violation in one pass so an admin form can show complete feedback.
//! Messages name the offending field but never echo its value.

use crate::types::{ConfigMap, Provider, ProviderType, TenantProviderConfig};
use serde::Serialize;
use serde_json::Value;

/// Outcome of validating one configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// `true` when `errors` is empty
    pub valid: bool,
    /// Violations in the order they were found
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    fn push(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.valid = false;
    }

    /// Whether the configuration passed every check.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }
}

/// One field rule.
#[derive(Debug, Clone, Copy)]
enum Rule {
    /// Non-empty string
    Required(&'static str),
    /// Non-empty string starting with one of the prefixes
    Prefixed {
        field: &'static str,
        prefixes: &'static [&'static str],
        required: bool,
    },
    /// Number (or numeric string) within an inclusive range
    Number {
        field: &'static str,
        min: f64,
        max: f64,
        integer: bool,
    },
    /// Absolute http(s) URL, when present
    OptionalUrl(&'static str),
}

const API_BASE: Rule = Rule::OptionalUrl("api_base");

static PERCENTAGE_RULES: &[Rule] = &[Rule::Number {
    field: "rate",
    min: 0.0,
    max: 100.0,
    integer: false,
}];

static STRIPE_TAX_RULES: &[Rule] = &[
    Rule::Prefixed {
        field: "api_key",
        prefixes: &["sk_live_", "sk_test_", "rk_live_", "rk_test_"],
        required: true,
    },
    API_BASE,
];

static TAXJAR_RULES: &[Rule] = &[Rule::Required("api_key"), API_BASE];

static AVALARA_RULES: &[Rule] = &[
    Rule::Required("account_id"),
    Rule::Required("license_key"),
    Rule::Required("company_code"),
    API_BASE,
];

static STRIPE_RULES: &[Rule] = &[
    Rule::Prefixed {
        field: "secret_key",
        prefixes: &["sk_"],
        required: true,
    },
    Rule::Prefixed {
        field: "publishable_key",
        prefixes: &["pk_"],
        required: true,
    },
    Rule::Prefixed {
        field: "webhook_secret",
        prefixes: &["whsec_"],
        required: false,
    },
    API_BASE,
];

static FLAT_RATE_RULES: &[Rule] = &[
    Rule::Number {
        field: "amount_minor",
        min: 0.0,
        max: 100_000_000.0,
        integer: true,
    },
    Rule::Required("currency"),
];

static SHIPPO_RULES: &[Rule] = &[
    Rule::Prefixed {
        field: "api_key",
        prefixes: &["shippo_live_", "shippo_test_"],
        required: true,
    },
    API_BASE,
];

static SMTP_RULES: &[Rule] = &[
    Rule::Required("host"),
    Rule::Number {
        field: "port",
        min: 1.0,
        max: 65535.0,
        integer: true,
    },
    Rule::Required("username"),
    Rule::Required("password"),
    Rule::Required("from_address"),
];

static SENDGRID_RULES: &[Rule] = &[
    Rule::Prefixed {
        field: "api_key",
        prefixes: &["SG."],
        required: true,
    },
    Rule::Required("from_address"),
    API_BASE,
];

fn rules(provider: Provider) -> &'static [Rule] {
    match provider {
        Provider::PercentageTax => PERCENTAGE_RULES,
        Provider::NoTax => &[],
        Provider::StripeTax => STRIPE_TAX_RULES,
        Provider::TaxJar => TAXJAR_RULES,
        Provider::Avalara => AVALARA_RULES,
        Provider::Stripe => STRIPE_RULES,
        Provider::FlatRateShipping => FLAT_RATE_RULES,
        Provider::Shippo => SHIPPO_RULES,
        Provider::Smtp => SMTP_RULES,
        Provider::SendGrid => SENDGRID_RULES,
    }
}

impl Rule {
    fn check(self, config: &ConfigMap, result: &mut ValidationResult) {
        match self {
            Self::Required(field) => {
                check_string(config, field, true, result);
            }
            Self::Prefixed {
                field,
                prefixes,
                required,
            } => {
                if let Some(value) = check_string(config, field, required, result) {
                    if !prefixes.iter().any(|p| value.starts_with(p)) {
                        result.push(prefix_message(field, prefixes));
                    }
                }
            }
            Self::Number {
                field,
                min,
                max,
                integer,
            } => check_number(config, field, min, max, integer, result),
            Self::OptionalUrl(field) => {
                if let Some(value) = check_string(config, field, false, result) {
                    match url::Url::parse(value) {
                        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                        _ => result.push(format!("{field} must be an absolute http(s) URL")),
                    }
                }
            }
        }
    }
}

/// Returns the trimmed value when the field is a non-empty string.
fn check_string<'a>(
    config: &'a ConfigMap,
    field: &str,
    required: bool,
    result: &mut ValidationResult,
) -> Option<&'a str> {
    match config.get(field) {
        None | Some(Value::Null) => {
            if required {
                result.push(format!("{field} is required"));
            }
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            result.push(format!("{field} must not be empty"));
            None
        }
        Some(Value::String(s)) => Some(s.trim()),
        Some(_) => {
            result.push(format!("{field} must be a string"));
            None
        }
    }
}

fn prefix_message(field: &str, prefixes: &[&str]) -> String {
    match prefixes {
        [single] => format!("{field} must start with \"{single}\""),
        _ => format!("{field} must start with one of: {}", prefixes.join(", ")),
    }
}

fn check_number(
    config: &ConfigMap,
    field: &str,
    min: f64,
    max: f64,
    integer: bool,
    result: &mut ValidationResult,
) {
    let parsed = match config.get(field) {
        None | Some(Value::Null) => {
            result.push(format!("{field} is required"));
            return;
        }
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if s.trim().is_empty() => {
            result.push(format!("{field} must not be empty"));
            return;
        }
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    let Some(value) = parsed.filter(|v| v.is_finite()) else {
        result.push(format!("{field} must be a number"));
        return;
    };

    if integer && value.fract() != 0.0 {
        result.push(format!("{field} must be an integer"));
        return;
    }

    if value < min || value > max {
        result.push(format!("{field} must be between {min} and {max}"));
    }
}

/// Read a numeric field that has already passed validation.
pub(crate) fn number_field(config: &ConfigMap, field: &str) -> Option<f64> {
    match config.get(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a string field that has already passed validation.
pub(crate) fn string_field<'a>(config: &'a ConfigMap, field: &str) -> Option<&'a str> {
    config
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn validate_as(expected: ProviderType, config: &TenantProviderConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    if config.provider_type != expected {
        result.push(format!(
            "expected provider type {expected}, got {}",
            config.provider_type
        ));
    }

    let Some(map) = config.config.as_ref() else {
        result.push("config is required");
        return result;
    };

    match Provider::resolve(expected, &config.provider_name) {
        Some(provider) => {
            for rule in rules(provider) {
                rule.check(map, &mut result);
            }
        }
        None => result.push(format!(
            "unknown {expected} provider: {}",
            config.provider_name
        )),
    }

    result
}

/// Validate a tax provider configuration.
#[must_use]
pub fn validate_tax_config(config: &TenantProviderConfig) -> ValidationResult {
    validate_as(ProviderType::Tax, config)
}

/// Validate a billing provider configuration.
#[must_use]
pub fn validate_billing_config(config: &TenantProviderConfig) -> ValidationResult {
    validate_as(ProviderType::Billing, config)
}

/// Validate a shipping provider configuration.
#[must_use]
pub fn validate_shipping_config(config: &TenantProviderConfig) -> ValidationResult {
    validate_as(ProviderType::Shipping, config)
}

/// Validate an email provider configuration.
#[must_use]
pub fn validate_email_config(config: &TenantProviderConfig) -> ValidationResult {
    validate_as(ProviderType::Email, config)
}

/// Validate a configuration against its own declared type.
#[must_use]
pub fn validate_config(config: &TenantProviderConfig) -> ValidationResult {
    validate_as(config.provider_type, config)
}
