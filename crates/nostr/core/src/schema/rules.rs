//! Built-in rule table for the card-trading event kinds.
//!
//! Addressable kinds do not list `d` here; its presence is enforced when the
//! event is classified.

use super::{Arity, Constraint, ContentRule, TagRule, ValidationRule, ValueType};

pub const KIND_TRADE_OFFER: u16 = 1500;
pub const KIND_TRADE_ACCEPT: u16 = 1501;
pub const KIND_TRADE_CANCEL: u16 = 1502;
pub const KIND_PRICE_QUOTE: u16 = 1503;
pub const KIND_CARD_DEFINITION: u16 = 30500;
pub const KIND_PORTFOLIO: u16 = 30501;

pub const RARITIES: &[&str] = &["common", "uncommon", "rare", "epic", "legendary"];
pub const SIDES: &[&str] = &["buy", "sell"];

pub static STANDARD_RULES: &[ValidationRule] = &[
    ValidationRule {
        kind: KIND_TRADE_OFFER,
        name: "trade offer",
        tags: &[
            TagRule::required("card", &[ValueType::Address]),
            TagRule::required("quantity", &[ValueType::Integer]),
            TagRule::required("side", &[ValueType::Enum(SIDES)]),
            TagRule::optional("price", &[ValueType::Integer]),
            TagRule::optional("swap", &[ValueType::Address]),
            TagRule::optional("expiration", &[ValueType::Integer]),
        ],
        constraints: &[Constraint::ExactlyOneOf(&["price", "swap"])],
        content: ContentRule::Any,
    },
    ValidationRule {
        kind: KIND_TRADE_ACCEPT,
        name: "trade accept",
        tags: &[
            TagRule::required("e", &[ValueType::Hex32]),
            TagRule::required("p", &[ValueType::Hex32]),
            TagRule::required("quantity", &[ValueType::Integer]),
        ],
        constraints: &[],
        content: ContentRule::Any,
    },
    ValidationRule {
        kind: KIND_TRADE_CANCEL,
        name: "trade cancel",
        tags: &[TagRule::required("e", &[ValueType::Hex32]).repeatable()],
        constraints: &[],
        content: ContentRule::Any,
    },
    ValidationRule {
        kind: KIND_PRICE_QUOTE,
        name: "price quote",
        tags: &[
            TagRule::required("card", &[ValueType::Address]),
            TagRule::required("price", &[ValueType::Integer]),
        ],
        constraints: &[],
        content: ContentRule::Any,
    },
    ValidationRule {
        kind: KIND_CARD_DEFINITION,
        name: "card definition",
        tags: &[
            TagRule::required("name", &[ValueType::Text]),
            TagRule::required("rarity", &[ValueType::Enum(RARITIES)]),
            TagRule::optional("supply", &[ValueType::Integer]),
            TagRule::optional("image", &[ValueType::Text]),
        ],
        constraints: &[],
        content: ContentRule::JsonObject,
    },
    ValidationRule {
        kind: KIND_PORTFOLIO,
        name: "portfolio",
        tags: &[TagRule::optional("card", &[ValueType::Address, ValueType::Integer])
            .repeatable()
            .arity(Arity::Exactly(2))],
        constraints: &[],
        content: ContentRule::JsonObject,
    },
];
