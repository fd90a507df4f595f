//! Binance USD-M futures stream sessions.
//!
//! - **Mark price**: `<symbol>@markPrice@1s` into `StreamEvent::Price`
//! - **User data**: `ORDER_TRADE_UPDATE` executions into `StreamEvent::OrderFilled`,
//!   with listen-key renewal on an independent timer
//!
//! Both sessions reconnect after a fixed delay, forever, until shutdown.

mod market_stream;
mod parser;
mod session;
mod user_data_parser;
mod user_data_stream;

pub use market_stream::run_market_stream;
pub use parser::{parse_message, ParsedMessage};
pub use user_data_parser::{parse_user_data_message, OrderUpdate, UserDataMessage};
pub use user_data_stream::{run_user_data_stream, ListenKeyApi};
