//! 游戏核心逻辑模块（牌堆、状态机、各阶段规则）。

pub mod bus;
pub mod cards;
pub mod prediction;
pub mod pyramid;
pub mod rules;
pub mod state;

pub use bus::{BusEngine, BusOutcome, Direction};
pub use cards::{create_deck, Card, CardColor, Deck, DeckError, Rank, Suit, DECK_SIZE};
pub use prediction::{Prediction, PredictionEngine, PredictionKind};
pub use pyramid::{MatchReport, PyramidEngine};
pub use rules::{RuleEngine, RuleError, RuleResolution};
pub use state::{
    BusCard, BusRide, GameEvent, GameSession, HandCard, HandStatus, IntegrityError, MatchNotice,
    Phase, PredictionRecord, Pyramid, PyramidCard, PyramidPos, PyramidStatus, Variant,
    VariantConfig, Zone, BUS_LENGTH, EVENT_LOG_LIMIT, MATCH_NOTICE_MS, PYRAMID_ROW_SIZES,
    PYRAMID_SIZE,
};
