use core_types::ParameterBounds;
use memory::MemoryWindow;

/// The instruction sent when there is no memory to learn from yet.
pub fn default_prompt(bounds: &ParameterBounds) -> String {
    format!(
        "You are a JSON API that responds only with valid JSON. Your task is to generate Freqtrade trading parameters.\n\n\
         STRICT REQUIREMENTS:\n\
         1. Respond with ONLY a single line of JSON\n\
         2. Use exactly this format: {{\"minimal_roi_0\": <number>, \"stoploss\": <number>}}\n\
         3. minimal_roi_0 must be a float between {} and {}\n\
         4. stoploss must be a float between {} and {}\n\
         5. NO explanations, NO markdown, NO extra text\n\n\
         Example valid response: {{\"minimal_roi_0\": 0.025, \"stoploss\": -0.12}}\n\n\
         Generate trading parameters now:",
        bounds.roi.min, bounds.roi.max, bounds.stoploss.min, bounds.stoploss.max
    )
}

/// Appended to the prompt after the stagnation guard has perturbed the parameters.
pub const STAGNATION_NOTE: &str = "\nYour suggestions have not changed for a while, so the last \
     ones were perturbed at random. Propose a noticeably different pair within the bounds.\n";

/// Builds the prompt for one iteration.
///
/// With empty memory this is `spec` unchanged. Otherwise the model is asked for a small
/// tweak and shown the newest `prompt_window` short-term summaries plus the best
/// iteration so far.
pub fn build_prompt(
    spec: &str,
    window: &MemoryWindow,
    strategy_name: &str,
    bounds: &ParameterBounds,
    prompt_window: usize,
) -> String {
    if window.is_empty() {
        return spec.to_string();
    }

    let recent: Vec<&str> = window.short_term().collect();
    let shown = &recent[recent.len().saturating_sub(prompt_window.max(1))..];

    let mut prompt = format!(
        "You are improving a Freqtrade strategy in Python called {strategy_name}.\n\
         Only suggest SMALL numeric tweaks to either or both of:\n\
         - minimal_roi (dict like {{\"0\": float}}, each value between {} and {})\n\
         - stoploss (negative float between {} and {}).\n\n\
         Return STRICT JSON only with keys: minimal_roi_0 (float), stoploss (float).\n\
         Do not include text outside the JSON.\n\n\
         Short-term memory (last {} summaries):\n{}\n",
        bounds.roi.min,
        bounds.roi.max,
        bounds.stoploss.min,
        bounds.stoploss.max,
        shown.len(),
        shown.join("\n---\n"),
    );

    prompt.push_str(&format!(
        "\nLong-term memory: {} successful backtests so far.\n",
        window.long_term().len()
    ));
    if let Some(best) = window.best() {
        prompt.push_str(&format!("Best so far: {}\n", best.summary()));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::{BacktestMetrics, LoopRecord, Metric, StrategyParameters};
    use rust_decimal_macros::dec;

    fn record(loop_index: u32, profit: rust_decimal::Decimal) -> LoopRecord {
        LoopRecord {
            loop_index,
            parameters: StrategyParameters::new(dec!(0.02), dec!(-0.1)),
            used_fallback: false,
            backtest_success: true,
            metrics: BacktestMetrics {
                profit_percent: Metric::Parsed(profit),
                ..BacktestMetrics::default()
            },
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn default_prompt_states_the_bounds() {
        let prompt = default_prompt(&ParameterBounds::default());
        assert!(prompt.contains("minimal_roi_0 must be a float between 0.001 and 0.10"));
        assert!(prompt.contains("stoploss must be a float between -0.30 and -0.01"));
    }

    #[test]
    fn empty_memory_uses_the_spec_verbatim() {
        let window = MemoryWindow::new(10);
        let prompt = build_prompt("custom spec", &window, "S", &ParameterBounds::default(), 3);
        assert_eq!(prompt, "custom spec");
    }

    #[test]
    fn memory_prompt_quotes_recent_and_best() {
        let mut window = MemoryWindow::new(10);
        for (i, profit) in [(1, dec!(0.5)), (2, dec!(3.0)), (3, dec!(1.0)), (4, dec!(-2.0))] {
            window.record(&record(i, profit));
        }
        let prompt = build_prompt(
            "unused",
            &window,
            "SimpleAlwaysBuySell",
            &ParameterBounds::default(),
            2,
        );

        assert!(prompt.contains("called SimpleAlwaysBuySell"));
        assert!(prompt.contains("Short-term memory (last 2 summaries)"));
        assert!(!prompt.contains("Loop 1:"));
        assert!(prompt.contains("Loop 3:"));
        assert!(prompt.contains("Loop 4:"));
        assert!(prompt.contains("4 successful backtests"));
        assert!(prompt.contains("Best so far: Loop 2:"));
    }
}
