use crate::ChatClient;
use crate::extract::extract_json_object;
use core_types::{
    ParameterBounds, ParameterProposal, RoiTable, StrategyParameters, decimal_from_value,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Turns a model reply into a proposal.
///
/// Anything short of a JSON object with a usable stoploss and ROI yields the fallback.
/// Suggested values are always clamped into `bounds`.
pub fn proposal_from_text(
    text: &str,
    bounds: &ParameterBounds,
    fallback: &StrategyParameters,
) -> ParameterProposal {
    match extract_json_object(text) {
        Some(value) => proposal_from_value(&value, bounds, fallback),
        None => ParameterProposal::Fallback {
            params: fallback.clone(),
            reason: "no JSON object in response".to_string(),
        },
    }
}

/// Validates a JSON object of either shape:
/// `{"minimal_roi_0": x, "stoploss": y}` or `{"minimal_roi": {"0": x, ...}, "stoploss": y}`.
pub fn proposal_from_value(
    value: &Value,
    bounds: &ParameterBounds,
    fallback: &StrategyParameters,
) -> ParameterProposal {
    match parse_parameters(value) {
        Ok(raw) => {
            let params = bounds.clamp(&raw);
            if params != raw {
                tracing::debug!(suggested = %raw, clamped = %params, "Clamped suggestion into bounds");
            }
            ParameterProposal::Suggested { params }
        }
        Err(reason) => ParameterProposal::Fallback {
            params: fallback.clone(),
            reason,
        },
    }
}

fn parse_parameters(value: &Value) -> Result<StrategyParameters, String> {
    let object = value
        .as_object()
        .ok_or_else(|| "suggestion is not a JSON object".to_string())?;

    let stoploss = object
        .get("stoploss")
        .and_then(decimal_from_value)
        .ok_or_else(|| "missing or non-numeric stoploss".to_string())?;

    let minimal_roi = match object.get("minimal_roi") {
        Some(Value::Object(table)) => {
            let mut roi = RoiTable::default();
            for (minutes, target) in table {
                let minutes: u32 = minutes
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid minimal_roi key {:?}", minutes))?;
                let target = decimal_from_value(target)
                    .ok_or_else(|| format!("non-numeric minimal_roi value at {}", minutes))?;
                roi.insert(minutes, target);
            }
            if roi.is_empty() {
                return Err("empty minimal_roi table".to_string());
            }
            roi
        }
        Some(other) => RoiTable::single(
            decimal_from_value(other).ok_or_else(|| "non-numeric minimal_roi".to_string())?,
        ),
        None => RoiTable::single(
            object
                .get("minimal_roi_0")
                .and_then(decimal_from_value)
                .ok_or_else(|| "missing or non-numeric minimal_roi_0".to_string())?,
        ),
    };

    Ok(StrategyParameters {
        minimal_roi,
        stoploss,
    })
}

/// The suggestion step of the loop: ask, validate, clamp, retry, fall back.
///
/// `suggest` never fails. Network errors, timeouts, replies without JSON and replies
/// with unusable fields all count as a failed attempt; after the last attempt the
/// fallback pair is returned together with the last failure reason.
pub struct Suggester {
    client: Arc<dyn ChatClient>,
    system_prompt: String,
    bounds: ParameterBounds,
    fallback: StrategyParameters,
    attempts: u32,
    retry_delay: Duration,
}

impl Suggester {
    pub fn new(
        client: Arc<dyn ChatClient>,
        system_prompt: impl Into<String>,
        bounds: ParameterBounds,
        fallback: StrategyParameters,
    ) -> Self {
        // The fallback is written into the strategy file too, so it obeys the same bounds.
        let fallback = bounds.clamp(&fallback);
        Self {
            client,
            system_prompt: system_prompt.into(),
            bounds,
            fallback,
            attempts: 1,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn with_retries(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn bounds(&self) -> &ParameterBounds {
        &self.bounds
    }

    pub fn fallback(&self) -> &StrategyParameters {
        &self.fallback
    }

    pub async fn suggest(&self, prompt: &str) -> ParameterProposal {
        let mut last_reason = String::from("no attempt made");

        for attempt in 1..=self.attempts {
            match self.client.chat(&self.system_prompt, prompt).await {
                Ok(text) => match proposal_from_text(&text, &self.bounds, &self.fallback) {
                    proposal @ ParameterProposal::Suggested { .. } => {
                        tracing::info!(attempt, params = %proposal.params(), "Model suggested parameters");
                        return proposal;
                    }
                    ParameterProposal::Fallback { reason, .. } => {
                        tracing::warn!(attempt, %reason, response = %text, "Unusable model reply");
                        last_reason = reason;
                    }
                },
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Model request failed");
                    last_reason = e.to_string();
                }
            }

            if attempt < self.attempts && !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        tracing::warn!(reason = %last_reason, params = %self.fallback, "Using fallback parameters");
        ParameterProposal::Fallback {
            params: self.fallback.clone(),
            reason: last_reason,
        }
    }
}
