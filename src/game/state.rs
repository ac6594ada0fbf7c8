use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::cards::{Card, Deck};
use super::prediction::Prediction;

/// 金字塔每行张数（从上到下）。
pub const PYRAMID_ROW_SIZES: [usize; 5] = [1, 2, 3, 4, 1];
/// 金字塔总张数。
pub const PYRAMID_SIZE: usize = 11;
/// 巴士阶段的牌数。
pub const BUS_LENGTH: usize = 10;
/// 配对提示自动消失前的毫秒数。
pub const MATCH_NOTICE_MS: u32 = 3_000;

/// 会话事件日志最多保留的条数，超出时丢弃最早的事件。
pub const EVENT_LOG_LIMIT: usize = 256;

const NORMAL_HAND_SIZE: usize = 4;
const EXTREME_HAND_SIZE: usize = 6;
const NORMAL_BUS_START: usize = 25;
const EXTREME_BUS_START: usize = 31;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    #[default]
    Normal,
    Extreme,
}

impl Variant {
    pub fn title(self) -> &'static str {
        match self {
            Variant::Normal => "Bussen",
            Variant::Extreme => "Extreem Bussen",
        }
    }

    /// 顶部阶段提示，例如 `Extreem Bussen - Phase 2: Pyramid`。
    pub fn phase_label(self, phase: Phase) -> String {
        match self {
            Variant::Normal => phase.label().to_string(),
            Variant::Extreme => format!("{} - {}", self.title(), phase.label()),
        }
    }
}

impl FromStr for Variant {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" | "bussen" => Ok(Variant::Normal),
            "extreme" | "extreem" | "extreem-bussen" => Ok(Variant::Extreme),
            _ => Err(()),
        }
    }
}

/// 每种玩法对应的发牌区间。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariantConfig {
    pub hand_size: usize,
    pub pyramid_start: usize,
    pub bus_start: usize,
}

impl VariantConfig {
    pub fn from_variant(variant: Variant) -> Self {
        match variant {
            Variant::Normal => Self {
                hand_size: NORMAL_HAND_SIZE,
                pyramid_start: NORMAL_HAND_SIZE,
                bus_start: NORMAL_BUS_START,
            },
            // 17..31 不属于任何阶段，沿用原有规则。
            Variant::Extreme => Self {
                hand_size: EXTREME_HAND_SIZE,
                pyramid_start: EXTREME_HAND_SIZE,
                bus_start: EXTREME_BUS_START,
            },
        }
    }

    /// 猜花色的轮数（手牌第 4 张起）。
    pub fn suit_rounds(&self) -> usize {
        self.hand_size.saturating_sub(3)
    }

    pub fn hand_range(&self) -> Range<usize> {
        0..self.hand_size
    }

    pub fn pyramid_range(&self) -> Range<usize> {
        self.pyramid_start..self.pyramid_start + PYRAMID_SIZE
    }

    pub fn bus_range(&self) -> Range<usize> {
        self.bus_start..self.bus_start + BUS_LENGTH
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Prediction,
    Pyramid,
    Bus,
    Finished,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Prediction => "Phase 1: Predict",
            Phase::Pyramid => "Phase 2: Pyramid",
            Phase::Bus => "Phase 3: The Bus",
            Phase::Finished => "Bus completed",
        }
    }
}

/// 手牌状态：翻开前、已翻开、在金字塔阶段打出未配对、已配对。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum HandStatus {
    #[default]
    Hidden,
    Revealed,
    Played,
    Matched,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PredictionRecord {
    pub prediction: Prediction,
    pub correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandCard {
    pub card: Card,
    #[serde(default)]
    pub status: HandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<PredictionRecord>,
}

impl HandCard {
    pub fn new(card: Card) -> Self {
        Self {
            card,
            status: HandStatus::Hidden,
            prediction: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status != HandStatus::Hidden
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PyramidStatus {
    #[default]
    Hidden,
    Revealed,
    Matched,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PyramidPos {
    pub row: usize,
    pub col: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PyramidCard {
    pub card: Card,
    #[serde(default)]
    pub status: PyramidStatus,
    pub drink_value: u32,
}

/// 第 `row` 行（从 0 开始）每张牌对应的口数：10, 8, 6, 4, 2。
pub fn drink_value(row: usize) -> u32 {
    ((PYRAMID_ROW_SIZES.len() - row) * 2) as u32
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Pyramid {
    pub rows: Vec<Vec<PyramidCard>>,
}

impl Pyramid {
    /// 按 [1, 2, 3, 4, 1] 的顺序把 11 张牌排成金字塔，全部背面朝上。
    pub fn deal(cards: &[Card]) -> Self {
        assert_eq!(cards.len(), PYRAMID_SIZE, "pyramid needs {PYRAMID_SIZE} cards");
        let mut remaining = cards.iter();
        let rows = PYRAMID_ROW_SIZES
            .iter()
            .enumerate()
            .map(|(row, &size)| {
                remaining
                    .by_ref()
                    .take(size)
                    .map(|&card| PyramidCard {
                        card,
                        status: PyramidStatus::Hidden,
                        drink_value: drink_value(row),
                    })
                    .collect()
            })
            .collect();
        Self { rows }
    }

    pub fn get(&self, pos: PyramidPos) -> Option<&PyramidCard> {
        self.rows.get(pos.row).and_then(|row| row.get(pos.col))
    }

    pub fn get_mut(&mut self, pos: PyramidPos) -> Option<&mut PyramidCard> {
        self.rows.get_mut(pos.row).and_then(|row| row.get_mut(pos.col))
    }

    pub fn positions(&self) -> impl Iterator<Item = (PyramidPos, &PyramidCard)> + '_ {
        self.rows.iter().enumerate().flat_map(|(row, cards)| {
            cards
                .iter()
                .enumerate()
                .map(move |(col, card)| (PyramidPos { row, col }, card))
        })
    }

    pub fn hidden_count(&self) -> usize {
        self.positions()
            .filter(|(_, card)| card.status == PyramidStatus::Hidden)
            .count()
    }

    pub fn all_revealed(&self) -> bool {
        self.hidden_count() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusCard {
    pub card: Card,
    #[serde(default)]
    pub revealed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BusRide {
    pub cards: Vec<BusCard>,
    /// 未开始时为 `None`。
    #[serde(default)]
    pub current_index: Option<usize>,
}

impl BusRide {
    pub fn deal(cards: &[Card]) -> Self {
        assert_eq!(cards.len(), BUS_LENGTH, "bus needs {BUS_LENGTH} cards");
        Self {
            cards: cards
                .iter()
                .map(|&card| BusCard {
                    card,
                    revealed: false,
                })
                .collect(),
            current_index: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.current_index.is_some()
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.current_index, Some(index) if index + 1 >= self.cards.len())
    }

    pub fn revealed_count(&self) -> usize {
        self.cards.iter().filter(|card| card.revealed).count()
    }
}

/// 配对提示。计时由外壳负责，这里只保存开关和令牌，
/// 过期时令牌不一致说明提示已被新的配对或重开取代。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MatchNotice {
    pub active: bool,
    pub token: u64,
}

impl MatchNotice {
    pub fn raise(&mut self) -> u64 {
        self.token = self.token.wrapping_add(1);
        self.active = true;
        self.token
    }

    pub fn expire(&mut self, token: u64) -> bool {
        if self.active && self.token == token {
            self.active = false;
            return true;
        }
        false
    }

    pub fn supersede(&mut self) {
        self.token = self.token.wrapping_add(1);
        self.active = false;
    }
}

/// 事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    SessionStarted {
        variant: Variant,
    },
    PhaseEntered {
        phase: Phase,
    },
    CardPredicted {
        index: usize,
        card: Card,
        prediction: Prediction,
        correct: bool,
    },
    CardAdvanced {
        index: usize,
    },
    PyramidCardRevealed {
        row: usize,
        col: usize,
        card: Card,
        drink_value: u32,
    },
    HandCardPlayed {
        index: usize,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        matches: Vec<PyramidPos>,
        drinks: u32,
    },
    BusRideStarted {
        card: Card,
    },
    BusCardRevealed {
        index: usize,
        card: Card,
    },
    BusRideReset {
        missed_at: usize,
        card: Card,
    },
    BusRideCompleted,
    SessionRestarted {
        variant: Variant,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Hand,
    Pyramid,
    Bus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    HandSize { expected: usize, actual: usize },
    CursorOutOfRange { cursor: usize, hand_size: usize },
    HandOrderViolated { index: usize },
    PyramidRowCount { expected: usize, actual: usize },
    PyramidRowSize { row: usize, expected: usize, actual: usize },
    DrinkValue { row: usize, expected: u32, actual: u32 },
    BusLength { expected: usize, actual: usize },
    BusIndexOutOfRange { index: usize },
    BusRevealMismatch { index: usize },
    DealMismatch { zone: Zone },
    HandStatusOutOfPhase { index: usize, status: HandStatus, phase: Phase },
    PyramidStatusOutOfPhase { pos: PyramidPos, status: PyramidStatus, phase: Phase },
    PyramidNotRevealed { hidden: usize, phase: Phase },
    BusOutOfPhase { phase: Phase },
    RideNotComplete,
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// 一局游戏的全部状态，由外壳独占持有，所有规则调用都以 `&mut` 传入。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSession {
    pub variant: Variant,
    pub phase: Phase,
    pub deck: Deck,
    pub hand: Vec<HandCard>,
    /// 预测阶段当前处理的手牌下标。
    #[serde(default)]
    pub current_card: usize,
    pub pyramid: Pyramid,
    pub bus: BusRide,
    #[serde(default)]
    pub match_notice: MatchNotice,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
}

impl GameSession {
    pub fn new(variant: Variant) -> Self {
        Self::with_deck(variant, Deck::shuffled())
    }

    pub fn with_deck(variant: Variant, deck: Deck) -> Self {
        let config = VariantConfig::from_variant(variant);
        let hand = deck
            .deal(config.hand_range())
            .iter()
            .map(|&card| HandCard::new(card))
            .collect();
        let pyramid = Pyramid::deal(deck.deal(config.pyramid_range()));
        let bus = BusRide::deal(deck.deal(config.bus_range()));
        Self {
            variant,
            phase: Phase::Prediction,
            deck,
            hand,
            current_card: 0,
            pyramid,
            bus,
            match_notice: MatchNotice::default(),
            event_log: Vec::new(),
        }
    }

    pub fn config(&self) -> VariantConfig {
        VariantConfig::from_variant(self.variant)
    }

    pub fn record_event(&mut self, event: GameEvent) {
        if self.event_log.len() >= EVENT_LOG_LIMIT {
            let overflow = self.event_log.len() + 1 - EVENT_LOG_LIMIT;
            self.event_log.drain(..overflow);
        }
        self.event_log.push(event);
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    pub fn hand_cards(&self) -> Vec<Card> {
        self.hand.iter().map(|hand_card| hand_card.card).collect()
    }

    /// 等待预测的手牌下标；当前牌已翻开时为 `None`。
    pub fn pending_card(&self) -> Option<usize> {
        if self.phase != Phase::Prediction {
            return None;
        }
        self.hand
            .get(self.current_card)
            .filter(|hand_card| !hand_card.is_resolved())
            .map(|_| self.current_card)
    }

    pub fn unresolved_count(&self) -> usize {
        self.hand.iter().filter(|card| !card.is_resolved()).count()
    }

    pub fn hand_resolved(&self) -> bool {
        self.unresolved_count() == 0
    }

    /// 重新进入预测阶段：手牌按原下标重发，之后各阶段进度全部丢弃。
    pub fn enter_prediction(&mut self) {
        let config = self.config();
        self.hand = self
            .deck
            .deal(config.hand_range())
            .iter()
            .map(|&card| HandCard::new(card))
            .collect();
        self.current_card = 0;
        self.pyramid = Pyramid::deal(self.deck.deal(config.pyramid_range()));
        self.bus = BusRide::deal(self.deck.deal(config.bus_range()));
        self.match_notice.supersede();
        self.phase = Phase::Prediction;
    }

    /// 进入金字塔阶段：金字塔重新发牌，手牌的打出/配对标记清空，预测记录保留。
    pub fn enter_pyramid(&mut self) {
        let config = self.config();
        for hand_card in &mut self.hand {
            hand_card.status = HandStatus::Revealed;
        }
        self.pyramid = Pyramid::deal(self.deck.deal(config.pyramid_range()));
        self.bus = BusRide::deal(self.deck.deal(config.bus_range()));
        self.match_notice.supersede();
        self.phase = Phase::Pyramid;
    }

    pub fn enter_bus(&mut self) {
        let config = self.config();
        self.bus = BusRide::deal(self.deck.deal(config.bus_range()));
        self.match_notice.supersede();
        self.phase = Phase::Bus;
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        let config = self.config();

        if self.hand.len() != config.hand_size {
            return Err(IntegrityError::HandSize {
                expected: config.hand_size,
                actual: self.hand.len(),
            });
        }
        if self.current_card >= config.hand_size {
            return Err(IntegrityError::CursorOutOfRange {
                cursor: self.current_card,
                hand_size: config.hand_size,
            });
        }
        for (index, hand_card) in self.hand.iter().enumerate() {
            let out_of_order = if index < self.current_card {
                !hand_card.is_resolved()
            } else if index > self.current_card {
                self.phase == Phase::Prediction && hand_card.is_resolved()
            } else {
                false
            };
            if out_of_order {
                return Err(IntegrityError::HandOrderViolated { index });
            }
        }

        if self.pyramid.rows.len() != PYRAMID_ROW_SIZES.len() {
            return Err(IntegrityError::PyramidRowCount {
                expected: PYRAMID_ROW_SIZES.len(),
                actual: self.pyramid.rows.len(),
            });
        }
        for (row, (cards, &expected)) in self
            .pyramid
            .rows
            .iter()
            .zip(PYRAMID_ROW_SIZES.iter())
            .enumerate()
        {
            if cards.len() != expected {
                return Err(IntegrityError::PyramidRowSize {
                    row,
                    expected,
                    actual: cards.len(),
                });
            }
            if let Some(card) = cards.iter().find(|card| card.drink_value != drink_value(row)) {
                return Err(IntegrityError::DrinkValue {
                    row,
                    expected: drink_value(row),
                    actual: card.drink_value,
                });
            }
        }

        if self.bus.cards.len() != BUS_LENGTH {
            return Err(IntegrityError::BusLength {
                expected: BUS_LENGTH,
                actual: self.bus.cards.len(),
            });
        }
        if let Some(index) = self.bus.current_index {
            if index >= BUS_LENGTH {
                return Err(IntegrityError::BusIndexOutOfRange { index });
            }
            if let Some(pos) = self
                .bus
                .cards
                .iter()
                .enumerate()
                .position(|(i, card)| card.revealed != (i <= index))
            {
                return Err(IntegrityError::BusRevealMismatch { index: pos });
            }
        } else if let Some(pos) = self.bus.cards.iter().position(|card| card.revealed) {
            return Err(IntegrityError::BusRevealMismatch { index: pos });
        }

        let hand_cards = self.hand_cards();
        if hand_cards.as_slice() != self.deck.deal(config.hand_range()) {
            return Err(IntegrityError::DealMismatch { zone: Zone::Hand });
        }
        let pyramid_cards: Vec<Card> = self.pyramid.positions().map(|(_, pc)| pc.card).collect();
        if pyramid_cards.as_slice() != self.deck.deal(config.pyramid_range()) {
            return Err(IntegrityError::DealMismatch {
                zone: Zone::Pyramid,
            });
        }
        let bus_cards: Vec<Card> = self.bus.cards.iter().map(|bc| bc.card).collect();
        if bus_cards.as_slice() != self.deck.deal(config.bus_range()) {
            return Err(IntegrityError::DealMismatch { zone: Zone::Bus });
        }

        self.check_phase_progress()
    }

    /// 各张牌的状态必须是当前阶段通过正常操作能够到达的。
    fn check_phase_progress(&self) -> Result<(), IntegrityError> {
        let phase = self.phase;

        if phase == Phase::Prediction {
            if let Some((index, hand_card)) = self
                .hand
                .iter()
                .enumerate()
                .find(|(_, hc)| matches!(hc.status, HandStatus::Played | HandStatus::Matched))
            {
                return Err(IntegrityError::HandStatusOutOfPhase {
                    index,
                    status: hand_card.status,
                    phase,
                });
            }
            if let Some((pos, card)) = self
                .pyramid
                .positions()
                .find(|(_, card)| card.status != PyramidStatus::Hidden)
            {
                return Err(IntegrityError::PyramidStatusOutOfPhase {
                    pos,
                    status: card.status,
                    phase,
                });
            }
        }

        if matches!(phase, Phase::Bus | Phase::Finished) {
            let hidden = self.pyramid.hidden_count();
            if hidden > 0 {
                return Err(IntegrityError::PyramidNotRevealed { hidden, phase });
            }
        } else if self.bus.is_started() || self.bus.revealed_count() > 0 {
            return Err(IntegrityError::BusOutOfPhase { phase });
        }

        if phase == Phase::Finished && !self.bus.is_complete() {
            return Err(IntegrityError::RideNotComplete);
        }

        Ok(())
    }
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new(Variant::default())
    }
}
