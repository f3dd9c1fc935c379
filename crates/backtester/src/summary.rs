/// Number of trailing lines kept when no summary table is found.
pub const TAIL_LINES: usize = 20;

/// Cuts the strategy summary table out of a backtest's output.
///
/// The table starts at the line containing `STRATEGY SUMMARY` and ends at the first
/// following line that starts with `└`. Output without such a table (older versions,
/// crashes) falls back to its last [`TAIL_LINES`] lines.
pub fn extract_summary(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if let Some(start) = lines.iter().position(|l| l.contains("STRATEGY SUMMARY")) {
        let end = lines[start..]
            .iter()
            .position(|l| l.trim_start().starts_with('└'))
            .map(|offset| start + offset)
            .unwrap_or(lines.len() - 1);
        return lines[start..=end].join("\n");
    }

    let from = lines.len().saturating_sub(TAIL_LINES);
    lines[from..].join("\n")
}
