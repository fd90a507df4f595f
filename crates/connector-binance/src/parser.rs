use model::PriceTick;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Raw `<symbol>@markPrice` event.
#[derive(Debug, Deserialize)]
pub struct BinanceMarkPriceRaw {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub mark_price: Decimal,
}

/// Combined stream wrapper that holds generic event data.
#[derive(Debug, Deserialize)]
pub struct CombinedStreamWrapper {
    pub stream: String,
    pub data: serde_json::Value,
}

pub enum ParsedMessage {
    MarkPrice(PriceTick),
    Unknown,
}

impl From<BinanceMarkPriceRaw> for PriceTick {
    fn from(raw: BinanceMarkPriceRaw) -> Self {
        PriceTick {
            symbol: raw.symbol,
            price: raw.mark_price,
            timestamp_ms: raw.event_time,
        }
    }
}

fn parse_event(value: serde_json::Value) -> Result<ParsedMessage, serde_json::Error> {
    match value.get("e").and_then(|v| v.as_str()) {
        Some("markPriceUpdate") => {
            let raw: BinanceMarkPriceRaw = serde_json::from_value(value)?;
            Ok(ParsedMessage::MarkPrice(raw.into()))
        }
        _ => Ok(ParsedMessage::Unknown),
    }
}

/// Parse a market stream frame, raw or combined (`{"stream", "data"}`).
pub fn parse_message(text: &str) -> Result<ParsedMessage, serde_json::Error> {
    if text.contains("\"stream\"") {
        let wrapper: CombinedStreamWrapper = serde_json::from_str(text)?;
        return parse_event(wrapper.data);
    }

    let raw: serde_json::Value = serde_json::from_str(text)?;
    parse_event(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_raw_mark_price() {
        let json = r#"{
            "e": "markPriceUpdate",
            "E": 1562305380000,
            "s": "BTCUSDT",
            "p": "60000.15000000",
            "ap": "60001.02000000",
            "P": "60004.25641265",
            "i": "59999.62659091",
            "r": "0.00038167",
            "T": 1562306400000
        }"#;

        match parse_message(json).unwrap() {
            ParsedMessage::MarkPrice(tick) => {
                assert_eq!(tick.symbol, "BTCUSDT");
                assert_eq!(tick.price, dec!(60000.15));
                assert_eq!(tick.timestamp_ms, 1562305380000);
            }
            _ => panic!("Expected MarkPrice"),
        }
    }

    #[test]
    fn test_parse_combined_mark_price() {
        let json = r#"{
            "stream": "btcusdt@markPrice@1s",
            "data": {
                "e": "markPriceUpdate",
                "E": 1562305380000,
                "s": "BTCUSDT",
                "p": "58800.00000000",
                "i": "58790.1",
                "P": "58801.2",
                "r": "0.0001",
                "T": 1562306400000
            }
        }"#;

        match parse_message(json).unwrap() {
            ParsedMessage::MarkPrice(tick) => assert_eq!(tick.price, dec!(58800)),
            _ => panic!("Expected MarkPrice"),
        }
    }

    #[test]
    fn test_parse_unknown_event() {
        let json = r#"{"e": "aggTrade", "E": 1672515782136, "s": "BTCUSDT"}"#;
        assert!(matches!(parse_message(json).unwrap(), ParsedMessage::Unknown));
    }

    #[test]
    fn test_parse_malformed_price_is_error() {
        let json = r#"{"e": "markPriceUpdate", "E": 1, "s": "BTCUSDT", "p": "abc"}"#;
        assert!(parse_message(json).is_err());
    }
}
