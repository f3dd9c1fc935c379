/// Source of the always-in-the-market strategy the loop starts from.
///
/// The two assignments the mutator rewrites sit at class level, one per line.
pub fn baseline_strategy(class_name: &str, timeframe: &str) -> String {
    format!(
        r#"from freqtrade.strategy import IStrategy
from pandas import DataFrame


class {class_name}(IStrategy):
    INTERFACE_VERSION = 3

    minimal_roi = {{"0": 0.01}}
    stoploss = -0.10
    timeframe = "{timeframe}"
    startup_candle_count = 10

    def populate_indicators(self, dataframe: DataFrame, metadata: dict) -> DataFrame:
        return dataframe

    def populate_entry_trend(self, dataframe: DataFrame, metadata: dict) -> DataFrame:
        dataframe["enter_long"] = 1
        return dataframe

    def populate_exit_trend(self, dataframe: DataFrame, metadata: dict) -> DataFrame:
        dataframe["exit_long"] = 1
        return dataframe
"#
    )
}
