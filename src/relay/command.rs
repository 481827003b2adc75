//! Command parsing.
//!
//! Every inbound message is classified exactly once into a [`Command`].
//! Matching is ASCII case-insensitive on prefixes and sub-command keywords;
//! arguments keep their original case.

use crate::config::CommandPrefixes;
use crate::error::ValidationError;
use crate::relay::turn::parse_turn;

/// A parsed inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// One or more orders; segments are split by the order composer.
    Order,
    TurnSet(u32),
    TurnClear,
    TurnCheck,
    TurnDefaultSet(u32),
    TurnDefaultClear,
    AffilSet(String),
    AffilClear,
    AffilCheck,
    Help,
    /// Right shape, unusable value (e.g. `!turn abc`).
    Invalid(ValidationError),
    /// No prefix matched in a shared channel.
    Unrecognized,
}

impl Command {
    /// Commands that need the sender to be a home-server member.
    pub fn requires_membership(&self) -> bool {
        !matches!(
            self,
            Command::Help | Command::Unrecognized | Command::Invalid(_)
        )
    }
}

/// Parses message text into [`Command`]s for a fixed set of prefixes.
#[derive(Debug, Clone)]
pub struct CommandParser {
    prefixes: CommandPrefixes,
}

impl CommandParser {
    pub fn new(prefixes: CommandPrefixes) -> Self {
        Self { prefixes }
    }

    pub fn prefixes(&self) -> &CommandPrefixes {
        &self.prefixes
    }

    /// Classify `content`. Unmatched private messages fall back to help.
    pub fn parse(&self, content: &str, is_private: bool) -> Command {
        let trimmed = content.trim_start();

        if starts_with_order_prefix(trimmed, &self.prefixes.order) {
            return Command::Order;
        }

        let mut tokens = trimmed.split_whitespace();
        let head = tokens.next().unwrap_or_default();
        let args: Vec<&str> = tokens.collect();

        if head.eq_ignore_ascii_case(&self.prefixes.turn) {
            parse_turn_command(&args)
        } else if head.eq_ignore_ascii_case(&self.prefixes.affil) {
            parse_affil_command(&args)
        } else if head.eq_ignore_ascii_case(&self.prefixes.help) {
            Command::Help
        } else if is_private {
            Command::Help
        } else {
            Command::Unrecognized
        }
    }
}

/// The order prefix may be followed directly by a bracketed override, so
/// it is matched on the raw text rather than on the first token.
pub(crate) fn starts_with_order_prefix(text: &str, prefix: &str) -> bool {
    let Some(head) = text.get(..prefix.len()) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(prefix) {
        return false;
    }
    match text[prefix.len()..].chars().next() {
        None => true,
        Some(c) => c.is_whitespace() || c == '[',
    }
}

fn keyword(arg: &str, word: &str) -> bool {
    arg.eq_ignore_ascii_case(word)
}

fn parse_turn_command(args: &[&str]) -> Command {
    match args {
        [one] if keyword(one, "clear") => Command::TurnClear,
        [one] if keyword(one, "check") => Command::TurnCheck,
        [one] if keyword(one, "default") => Command::Help,
        [value] => match parse_turn(value) {
            Ok(n) => Command::TurnSet(n),
            Err(e) => Command::Invalid(e),
        },
        [first, second] if keyword(first, "default") => {
            if keyword(second, "clear") {
                Command::TurnDefaultClear
            } else {
                match parse_turn(second) {
                    Ok(n) => Command::TurnDefaultSet(n),
                    Err(e) => Command::Invalid(e),
                }
            }
        }
        _ => Command::Help,
    }
}

fn parse_affil_command(args: &[&str]) -> Command {
    match args {
        [] => Command::Help,
        [one] if keyword(one, "clear") => Command::AffilClear,
        [one] if keyword(one, "check") => Command::AffilCheck,
        words => Command::AffilSet(words.join(" ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> CommandParser {
        CommandParser::new(CommandPrefixes::default())
    }

    fn parse(text: &str) -> Command {
        parser().parse(text, false)
    }

    #[test]
    fn order_with_space() {
        assert_eq!(parse("!sendorder attack"), Command::Order);
    }

    #[test]
    fn order_with_bracket_no_space() {
        assert_eq!(parse("!sendorder[Crimson Guard] attack"), Command::Order);
    }

    #[test]
    fn order_case_insensitive() {
        assert_eq!(parse("!SendOrder attack"), Command::Order);
    }

    #[test]
    fn order_prefix_alone() {
        assert_eq!(parse("!sendorder"), Command::Order);
    }

    #[test]
    fn order_prefix_glued_to_word_is_not_an_order() {
        assert_eq!(parse("!sendorders attack"), Command::Unrecognized);
    }

    #[test]
    fn leading_whitespace_ignored() {
        assert_eq!(parse("   !sendorder go"), Command::Order);
    }

    #[test]
    fn turn_set() {
        assert_eq!(parse("!turn 4"), Command::TurnSet(4));
    }

    #[test]
    fn turn_keywords() {
        assert_eq!(parse("!turn clear"), Command::TurnClear);
        assert_eq!(parse("!turn CHECK"), Command::TurnCheck);
        assert_eq!(parse("!TURN check"), Command::TurnCheck);
    }

    #[test]
    fn turn_default_forms() {
        assert_eq!(parse("!turn default 7"), Command::TurnDefaultSet(7));
        assert_eq!(parse("!turn default clear"), Command::TurnDefaultClear);
    }

    #[test]
    fn turn_invalid_values() {
        assert!(matches!(
            parse("!turn abc"),
            Command::Invalid(ValidationError::NotANumber { .. })
        ));
        assert!(matches!(
            parse("!turn 0"),
            Command::Invalid(ValidationError::NotPositive { .. })
        ));
        assert!(matches!(
            parse("!turn -5"),
            Command::Invalid(ValidationError::NotPositive { .. })
        ));
        assert!(matches!(
            parse("!turn default xyz"),
            Command::Invalid(ValidationError::NotANumber { .. })
        ));
    }

    #[test]
    fn turn_wrong_shape_falls_back_to_help() {
        assert_eq!(parse("!turn"), Command::Help);
        assert_eq!(parse("!turn default"), Command::Help);
        assert_eq!(parse("!turn 1 2"), Command::Help);
        assert_eq!(parse("!turn default 1 2"), Command::Help);
        assert_eq!(parse("!turn check now"), Command::Help);
    }

    #[test]
    fn affil_forms() {
        assert_eq!(parse("!faction clear"), Command::AffilClear);
        assert_eq!(parse("!faction check"), Command::AffilCheck);
        assert_eq!(
            parse("!faction   Crimson    Guard "),
            Command::AffilSet("Crimson Guard".into())
        );
        assert_eq!(parse("!faction"), Command::Help);
    }

    #[test]
    fn affil_keyword_inside_name_is_a_name() {
        assert_eq!(
            parse("!faction clear skies"),
            Command::AffilSet("clear skies".into())
        );
    }

    #[test]
    fn help_prefix() {
        assert_eq!(parse("!plshelp"), Command::Help);
        assert_eq!(parse("!plshelp me"), Command::Help);
    }

    #[test]
    fn unmatched_shared_channel_ignored() {
        assert_eq!(parse("hello everyone"), Command::Unrecognized);
        assert_eq!(parse(""), Command::Unrecognized);
        assert_eq!(parse("!turnip 3"), Command::Unrecognized);
    }

    #[test]
    fn unmatched_private_channel_gets_help() {
        assert_eq!(parser().parse("hello bot", true), Command::Help);
    }

    #[test]
    fn custom_prefixes() {
        let parser = CommandParser::new(CommandPrefixes {
            order: "?o".into(),
            turn: "?t".into(),
            affil: "?f".into(),
            help: "?h".into(),
        });
        assert_eq!(parser.parse("?o[X] go", false), Command::Order);
        assert_eq!(parser.parse("?t 2", false), Command::TurnSet(2));
        assert_eq!(parser.parse("!sendorder go", false), Command::Unrecognized);
    }

    #[test]
    fn membership_requirements() {
        assert!(Command::Order.requires_membership());
        assert!(Command::TurnSet(1).requires_membership());
        assert!(Command::AffilCheck.requires_membership());
        assert!(!Command::Help.requires_membership());
        assert!(!Command::Unrecognized.requires_membership());
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        assert_eq!(parse("é"), Command::Unrecognized);
        assert_eq!(parse("日本語のメッセージ"), Command::Unrecognized);
    }
}
