// crates/core/src/params.rs
//! Required-shape validation for job params.
//!
//! Params stay opaque to the scheduler and backends; admission only checks
//! that the payload carries what the target job type needs.

use serde_json::Value;

use crate::error::OrchestrationError;
use crate::job::JobType;

/// Validate a params payload against the required shape of its job type.
pub fn validate_params(job_type: JobType, params: &Value) -> Result<(), OrchestrationError> {
    if !params.is_object() {
        return Err(invalid("params must be a JSON object"));
    }
    match job_type {
        JobType::MarketDataAnalysis | JobType::SentimentAnalysis => {
            require_symbols(params, 1)
        }
        JobType::PortfolioOptimization => {
            require_symbols(params, 1)?;
            if let Some(risk) = params.get("riskTolerance") {
                let risk = risk
                    .as_f64()
                    .ok_or_else(|| invalid("riskTolerance must be a number"))?;
                if risk <= 0.0 || risk > 1.0 {
                    return Err(invalid("riskTolerance must be in (0, 1]"));
                }
            }
            Ok(())
        }
        JobType::FinancialForecasting => {
            require_string(params, "symbol")?;
            let horizon = params
                .get("horizonDays")
                .and_then(Value::as_i64)
                .ok_or_else(|| invalid("horizonDays must be an integer"))?;
            if !(1..=365).contains(&horizon) {
                return Err(invalid("horizonDays must be between 1 and 365"));
            }
            Ok(())
        }
        JobType::AnomalyDetection => {
            require_string(params, "symbol")?;
            if let Some(lookback) = params.get("lookbackDays") {
                let lookback = lookback
                    .as_i64()
                    .ok_or_else(|| invalid("lookbackDays must be an integer"))?;
                if lookback < 1 {
                    return Err(invalid("lookbackDays must be at least 1"));
                }
            }
            Ok(())
        }
        JobType::CorrelationAnalysis => require_symbols(params, 2),
    }
}

fn invalid(msg: &str) -> OrchestrationError {
    OrchestrationError::Validation(msg.to_string())
}

fn require_string(params: &Value, field: &str) -> Result<(), OrchestrationError> {
    match params.get(field).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(invalid(&format!("{field} must be a non-empty string"))),
    }
}

fn require_symbols(params: &Value, min_len: usize) -> Result<(), OrchestrationError> {
    let symbols = params
        .get("symbols")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("symbols must be an array"))?;
    if symbols.len() < min_len {
        return Err(invalid(&format!(
            "symbols must contain at least {min_len} entr{}",
            if min_len == 1 { "y" } else { "ies" }
        )));
    }
    if !symbols
        .iter()
        .all(|s| s.as_str().is_some_and(|s| !s.trim().is_empty()))
    {
        return Err(invalid("symbols entries must be non-empty strings"));
    }
    Ok(())
}
