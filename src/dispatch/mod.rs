//! Command parsing and access policy.
//!
//! Free-text chat messages become typed commands here; the access rules
//! (who may issue which command, and where) are checked at this boundary so
//! the ledger engine stays free of transport and identity concerns.

use rust_decimal::Decimal;

use crate::models::InstrumentClass;
use crate::portfolio::PortfolioFilter;

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    /// /new_spot or /new_future: open a position
    NewTrade {
        class: InstrumentClass,
        ticker: String,
        price: Decimal,
        size: Decimal,
    },
    /// /buy: accumulate into an open position
    Buy {
        class: InstrumentClass,
        ticker: String,
        size: Decimal,
        price: Decimal,
    },
    /// /sell: sell a percentage of an open position
    Sell {
        class: InstrumentClass,
        ticker: String,
        percent: u8,
        price: Decimal,
    },
    /// /close: close the entire remaining position
    Close {
        class: InstrumentClass,
        ticker: String,
        price: Decimal,
    },
    /// /portfolio, /portfolio_all, /portfolio_spot, /portfolio_futures
    Portfolio(PortfolioFilter),
}

impl Command {
    /// Trade-management commands are reserved for the admin in the
    /// group/channel; portfolio queries are private-chat only.
    pub fn is_admin_command(&self) -> bool {
        matches!(
            self,
            Command::NewTrade { .. } | Command::Buy { .. } | Command::Sell { .. } | Command::Close { .. }
        )
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParseError {
    /// Message is not a slash command at all; ignored silently.
    #[error("not a command")]
    NotACommand,

    /// Slash command this bot does not handle; ignored silently.
    #[error("unrecognized command")]
    Unrecognized,

    /// Recognized command with malformed arguments; the expected syntax is
    /// echoed back to the user.
    #[error("invalid format, use: {usage}")]
    InvalidFormat { usage: &'static str },
}

/// Parse a chat message into a command.
///
/// The command word is case-insensitive and may carry the `@botname` suffix
/// Telegram appends in group chats.
pub fn parse(text: &str) -> Result<Command, ParseError> {
    let mut tokens = text.split_whitespace();
    let head = tokens.next().ok_or(ParseError::NotACommand)?;

    let command = head.strip_prefix('/').ok_or(ParseError::NotACommand)?;
    let command = command
        .split('@')
        .next()
        .unwrap_or(command)
        .to_lowercase();

    let args: Vec<&str> = tokens.collect();

    match command.as_str() {
        "start" => Ok(Command::Start),
        "new_spot" => parse_new(InstrumentClass::Spot, &args, "/new_spot [ticker] [price] [size]"),
        "new_future" => parse_new(
            InstrumentClass::Futures,
            &args,
            "/new_future [ticker] [price] [size]",
        ),
        "buy" => parse_buy(&args),
        "sell" => parse_sell(&args),
        "close" => parse_close(&args),
        "portfolio" | "portfolio_all" => Ok(Command::Portfolio(PortfolioFilter::All)),
        "portfolio_spot" => Ok(Command::Portfolio(PortfolioFilter::Spot)),
        "portfolio_futures" => Ok(Command::Portfolio(PortfolioFilter::Futures)),
        _ => Err(ParseError::Unrecognized),
    }
}

fn parse_new(
    class: InstrumentClass,
    args: &[&str],
    usage: &'static str,
) -> Result<Command, ParseError> {
    let [ticker, price, size] = args else {
        return Err(ParseError::InvalidFormat { usage });
    };

    Ok(Command::NewTrade {
        class,
        ticker: ticker.to_uppercase(),
        price: parse_decimal(price, usage)?,
        size: parse_decimal(size, usage)?,
    })
}

fn parse_buy(args: &[&str]) -> Result<Command, ParseError> {
    const USAGE: &str = "/buy [type] [ticker] [amount] [price]";
    let [class, ticker, size, price] = args else {
        return Err(ParseError::InvalidFormat { usage: USAGE });
    };

    Ok(Command::Buy {
        class: parse_class(class, USAGE)?,
        ticker: ticker.to_uppercase(),
        size: parse_decimal(size, USAGE)?,
        price: parse_decimal(price, USAGE)?,
    })
}

fn parse_sell(args: &[&str]) -> Result<Command, ParseError> {
    const USAGE: &str = "/sell [type] [ticker] [percent] [price]";
    let [class, ticker, percent, price] = args else {
        return Err(ParseError::InvalidFormat { usage: USAGE });
    };

    Ok(Command::Sell {
        class: parse_class(class, USAGE)?,
        ticker: ticker.to_uppercase(),
        percent: percent
            .parse()
            .map_err(|_| ParseError::InvalidFormat { usage: USAGE })?,
        price: parse_decimal(price, USAGE)?,
    })
}

fn parse_close(args: &[&str]) -> Result<Command, ParseError> {
    const USAGE: &str = "/close [type] [ticker] [price]";
    let [class, ticker, price] = args else {
        return Err(ParseError::InvalidFormat { usage: USAGE });
    };

    Ok(Command::Close {
        class: parse_class(class, USAGE)?,
        ticker: ticker.to_uppercase(),
        price: parse_decimal(price, USAGE)?,
    })
}

fn parse_class(s: &str, usage: &'static str) -> Result<InstrumentClass, ParseError> {
    InstrumentClass::parse(s).ok_or(ParseError::InvalidFormat { usage })
}

fn parse_decimal(s: &str, usage: &'static str) -> Result<Decimal, ParseError> {
    s.parse()
        .map_err(|_| ParseError::InvalidFormat { usage })
}

// ==================== Access policy ====================

/// Where a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Channel,
}

impl ChatKind {
    pub fn from_api(kind: &str) -> Self {
        match kind {
            "private" => ChatKind::Private,
            "channel" => ChatKind::Channel,
            _ => ChatKind::Group,
        }
    }
}

/// Identity and chat context of an inbound command.
#[derive(Debug, Clone, Copy)]
pub struct CommandOrigin {
    pub chat_kind: ChatKind,
    /// Absent for channel posts, which carry no sender.
    pub sender_id: Option<i64>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AccessDenied {
    #[error("trade management commands belong in the main channel")]
    AdminChatOnly,

    #[error("only the admin can manage trades")]
    NotAdmin,

    #[error("portfolio queries are private-chat only")]
    PrivateChatOnly,
}

/// Capability check applied before a command reaches the engine.
///
/// Admin commands must come from the admin in a non-private chat; channel
/// posts carry no sender and are treated as admin-authored. Portfolio
/// queries are restricted to private chats.
pub fn authorize(command: &Command, origin: CommandOrigin, admin_id: i64) -> Result<(), AccessDenied> {
    if command.is_admin_command() {
        if origin.chat_kind == ChatKind::Private {
            return Err(AccessDenied::AdminChatOnly);
        }
        if let Some(sender) = origin.sender_id {
            if sender != admin_id {
                return Err(AccessDenied::NotAdmin);
            }
        }
        return Ok(());
    }

    if let Command::Portfolio(_) = command {
        if origin.chat_kind != ChatKind::Private {
            return Err(AccessDenied::PrivateChatOnly);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_new_spot() {
        let cmd = parse("/new_spot BTC 118000 0.1").unwrap();
        assert_eq!(
            cmd,
            Command::NewTrade {
                class: InstrumentClass::Spot,
                ticker: "BTC".to_string(),
                price: dec!(118000),
                size: dec!(0.1),
            }
        );
    }

    #[test]
    fn test_parse_new_future_uppercases_ticker() {
        let cmd = parse("/new_future eth 3000 2").unwrap();
        assert_eq!(
            cmd,
            Command::NewTrade {
                class: InstrumentClass::Futures,
                ticker: "ETH".to_string(),
                price: dec!(3000),
                size: dec!(2),
            }
        );
    }

    #[test]
    fn test_parse_strips_botname_suffix() {
        let cmd = parse("/buy@TradeTrackerBot spot BTC 0.5 65000").unwrap();
        assert_eq!(
            cmd,
            Command::Buy {
                class: InstrumentClass::Spot,
                ticker: "BTC".to_string(),
                size: dec!(0.5),
                price: dec!(65000),
            }
        );
    }

    #[test]
    fn test_parse_sell() {
        let cmd = parse("/sell spot BTC 50 72000").unwrap();
        assert_eq!(
            cmd,
            Command::Sell {
                class: InstrumentClass::Spot,
                ticker: "BTC".to_string(),
                percent: 50,
                price: dec!(72000),
            }
        );
    }

    #[test]
    fn test_parse_portfolio_variants() {
        assert_eq!(
            parse("/portfolio").unwrap(),
            Command::Portfolio(PortfolioFilter::All)
        );
        assert_eq!(
            parse("/portfolio_all").unwrap(),
            Command::Portfolio(PortfolioFilter::All)
        );
        assert_eq!(
            parse("/portfolio_spot").unwrap(),
            Command::Portfolio(PortfolioFilter::Spot)
        );
        assert_eq!(
            parse("/Portfolio_Futures").unwrap(),
            Command::Portfolio(PortfolioFilter::Futures)
        );
    }

    #[test]
    fn test_parse_malformed_arguments() {
        let err = parse("/new_spot BTC").unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidFormat {
                usage: "/new_spot [ticker] [price] [size]"
            }
        );

        let err = parse("/buy spot BTC half 65000").unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidFormat {
                usage: "/buy [type] [ticker] [amount] [price]"
            }
        );

        let err = parse("/sell margin BTC 50 72000").unwrap_err();
        assert!(matches!(err, ParseError::InvalidFormat { .. }));
    }

    #[test]
    fn test_parse_non_commands() {
        assert_eq!(parse("gm everyone").unwrap_err(), ParseError::NotACommand);
        assert_eq!(parse("").unwrap_err(), ParseError::NotACommand);
        assert_eq!(parse("/moon").unwrap_err(), ParseError::Unrecognized);
    }

    fn sell_command() -> Command {
        Command::Sell {
            class: InstrumentClass::Spot,
            ticker: "BTC".to_string(),
            percent: 50,
            price: dec!(72000),
        }
    }

    #[test]
    fn test_admin_command_scope() {
        let cmd = sell_command();

        let in_private = CommandOrigin {
            chat_kind: ChatKind::Private,
            sender_id: Some(7),
        };
        assert_eq!(
            authorize(&cmd, in_private, 7),
            Err(AccessDenied::AdminChatOnly)
        );

        let stranger_in_group = CommandOrigin {
            chat_kind: ChatKind::Group,
            sender_id: Some(8),
        };
        assert_eq!(
            authorize(&cmd, stranger_in_group, 7),
            Err(AccessDenied::NotAdmin)
        );

        let admin_in_group = CommandOrigin {
            chat_kind: ChatKind::Group,
            sender_id: Some(7),
        };
        assert_eq!(authorize(&cmd, admin_in_group, 7), Ok(()));

        // Channel posts carry no sender
        let channel_post = CommandOrigin {
            chat_kind: ChatKind::Channel,
            sender_id: None,
        };
        assert_eq!(authorize(&cmd, channel_post, 7), Ok(()));
    }

    #[test]
    fn test_portfolio_command_scope() {
        let cmd = Command::Portfolio(PortfolioFilter::All);

        let in_group = CommandOrigin {
            chat_kind: ChatKind::Group,
            sender_id: Some(8),
        };
        assert_eq!(
            authorize(&cmd, in_group, 7),
            Err(AccessDenied::PrivateChatOnly)
        );

        let in_private = CommandOrigin {
            chat_kind: ChatKind::Private,
            sender_id: Some(8),
        };
        assert_eq!(authorize(&cmd, in_private, 7), Ok(()));
    }

    #[test]
    fn test_start_is_unrestricted() {
        let anywhere = CommandOrigin {
            chat_kind: ChatKind::Group,
            sender_id: Some(99),
        };
        assert_eq!(authorize(&Command::Start, anywhere, 7), Ok(()));
    }
}
