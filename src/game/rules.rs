use serde::{Deserialize, Serialize};

use super::bus::{BusEngine, BusOutcome, Direction};
use super::cards::Deck;
use super::prediction::{Prediction, PredictionEngine, PredictionKind};
use super::pyramid::PyramidEngine;
use super::state::{
    GameEvent, GameSession, HandStatus, IntegrityError, Phase, PredictionRecord, Variant,
};
use crate::console_log;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RuleError {
    GameFinished,
    InvalidPhase {
        expected: Phase,
        actual: Phase,
    },
    NoPendingCard,
    CardUnresolved {
        index: usize,
    },
    HandExhausted,
    HandIncomplete {
        unresolved: usize,
    },
    PyramidIncomplete {
        hidden: usize,
    },
    NoNextPhase,
    AtFirstPhase,
    HandCardNotFound {
        index: usize,
    },
    HandCardHidden {
        index: usize,
    },
    HandCardAlreadyMatched {
        index: usize,
    },
    PredictionMismatch {
        index: usize,
        expected: PredictionKind,
        actual: Prediction,
    },
    RideNotStarted,
    RideAlreadyStarted,
    RideCompleted,
    UnknownValue {
        value: String,
    },
    IntegrityViolation {
        error: IntegrityError,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: GameSession,
    pub events: Vec<GameEvent>,
    pub match_found: bool,
}

impl RuleResolution {
    pub fn new(state: GameSession, events: Vec<GameEvent>) -> Self {
        let match_found = state.match_notice.active;
        Self {
            state,
            events,
            match_found,
        }
    }
}

/// 处理界面转发的操作。所有校验都在修改状态之前完成，被拒绝的操作不改动会话。
pub struct RuleEngine;

impl RuleEngine {
    fn ensure_phase(state: &GameSession, expected: Phase) -> Result<(), RuleError> {
        if state.is_finished() && expected != Phase::Finished {
            return Err(RuleError::GameFinished);
        }
        if state.phase != expected {
            return Err(RuleError::InvalidPhase {
                expected,
                actual: state.phase,
            });
        }
        Ok(())
    }

    fn ensure_integrity(state: &GameSession) -> Result<(), RuleError> {
        state
            .integrity_check()
            .map_err(|error| RuleError::IntegrityViolation { error })
    }

    fn emit(state: &mut GameSession, events: &mut Vec<GameEvent>, event: GameEvent) {
        state.record_event(event.clone());
        events.push(event);
    }

    pub fn start_session(variant: Variant) -> GameSession {
        Self::start_session_with_deck(variant, Deck::shuffled())
    }

    pub fn start_session_with_deck(variant: Variant, deck: Deck) -> GameSession {
        let mut state = GameSession::with_deck(variant, deck);
        state.record_event(GameEvent::SessionStarted { variant });
        state.record_event(GameEvent::PhaseEntered {
            phase: Phase::Prediction,
        });
        console_log!("{} started", variant.title());
        state
    }

    pub fn submit_prediction(
        state: &mut GameSession,
        prediction: Prediction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_phase(state, Phase::Prediction)?;
        Self::ensure_integrity(state)?;
        let index = state.pending_card().ok_or(RuleError::NoPendingCard)?;

        let correct = PredictionEngine::evaluate(index, prediction, &state.hand_cards())?;
        let hand_card = &mut state.hand[index];
        hand_card.status = HandStatus::Revealed;
        hand_card.prediction = Some(PredictionRecord {
            prediction,
            correct,
        });
        let card = hand_card.card;

        let mut events = Vec::new();
        Self::emit(
            state,
            &mut events,
            GameEvent::CardPredicted {
                index,
                card,
                prediction,
                correct,
            },
        );
        Ok(events)
    }

    pub fn advance_card(state: &mut GameSession) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_phase(state, Phase::Prediction)?;
        Self::ensure_integrity(state)?;
        let index = state.current_card;
        if !state.hand[index].is_resolved() {
            return Err(RuleError::CardUnresolved { index });
        }
        if index + 1 >= state.hand.len() {
            return Err(RuleError::HandExhausted);
        }

        state.current_card = index + 1;
        let mut events = Vec::new();
        Self::emit(
            state,
            &mut events,
            GameEvent::CardAdvanced { index: index + 1 },
        );
        Ok(events)
    }

    pub fn advance_phase(state: &mut GameSession) -> Result<Vec<GameEvent>, RuleError> {
        if state.is_finished() {
            return Err(RuleError::GameFinished);
        }
        Self::ensure_integrity(state)?;

        match state.phase {
            Phase::Prediction => {
                if !state.hand_resolved() {
                    return Err(RuleError::HandIncomplete {
                        unresolved: state.unresolved_count(),
                    });
                }
                state.enter_pyramid();
            }
            Phase::Pyramid => {
                if !PyramidEngine::is_complete(&state.pyramid) {
                    return Err(RuleError::PyramidIncomplete {
                        hidden: state.pyramid.hidden_count(),
                    });
                }
                state.enter_bus();
            }
            Phase::Bus | Phase::Finished => return Err(RuleError::NoNextPhase),
        }

        let mut events = Vec::new();
        let phase = state.phase;
        Self::emit(state, &mut events, GameEvent::PhaseEntered { phase });
        console_log!("{}", state.variant.phase_label(phase));
        Ok(events)
    }

    pub fn play_hand_card(
        state: &mut GameSession,
        hand_index: usize,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_phase(state, Phase::Pyramid)?;
        Self::ensure_integrity(state)?;

        let report = PyramidEngine::play_hand_card(hand_index, state)?;
        if report.matched() {
            state.match_notice.raise();
            console_log!(
                "hand card {} matched {} pyramid card(s) for {} drinks",
                hand_index,
                report.matches.len(),
                report.drinks
            );
        }

        let mut events = Vec::new();
        Self::emit(
            state,
            &mut events,
            GameEvent::HandCardPlayed {
                index: report.hand_index,
                matches: report.matches,
                drinks: report.drinks,
            },
        );
        Ok(events)
    }

    /// 全部翻开后再调用不报错，也不产生事件。
    pub fn reveal_next_pyramid_card(state: &mut GameSession) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_phase(state, Phase::Pyramid)?;
        Self::ensure_integrity(state)?;

        let mut events = Vec::new();
        if let Some(pos) = PyramidEngine::reveal_next(&mut state.pyramid) {
            if let Some(revealed) = state.pyramid.get(pos).cloned() {
                Self::emit(
                    state,
                    &mut events,
                    GameEvent::PyramidCardRevealed {
                        row: pos.row,
                        col: pos.col,
                        card: revealed.card,
                        drink_value: revealed.drink_value,
                    },
                );
            }
        }
        Ok(events)
    }

    pub fn start_bus_ride(state: &mut GameSession) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_phase(state, Phase::Bus)?;
        Self::ensure_integrity(state)?;

        let card = BusEngine::start_ride(&mut state.bus)?;
        let mut events = Vec::new();
        Self::emit(state, &mut events, GameEvent::BusRideStarted { card });
        Ok(events)
    }

    pub fn submit_bus_prediction(
        state: &mut GameSession,
        direction: Direction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        if state.is_finished() {
            return Err(RuleError::RideCompleted);
        }
        Self::ensure_phase(state, Phase::Bus)?;
        Self::ensure_integrity(state)?;

        let mut events = Vec::new();
        match BusEngine::predict(&mut state.bus, direction)? {
            BusOutcome::Advanced { index, card } => {
                Self::emit(state, &mut events, GameEvent::BusCardRevealed { index, card });
            }
            BusOutcome::Completed { card } => {
                let index = state.bus.cards.len() - 1;
                Self::emit(state, &mut events, GameEvent::BusCardRevealed { index, card });
                state.phase = Phase::Finished;
                Self::emit(state, &mut events, GameEvent::BusRideCompleted);
                console_log!("bus ride completed");
            }
            BusOutcome::Reset { missed_at, card } => {
                Self::emit(state, &mut events, GameEvent::BusRideReset { missed_at, card });
                console_log!("bus ride reset at card {}", missed_at);
            }
        }
        Ok(events)
    }

    /// 用一副新洗的牌整体替换会话，未过期的配对提示随之作废。
    pub fn restart(state: &mut GameSession) -> Vec<GameEvent> {
        Self::restart_with_deck(state, Deck::shuffled())
    }

    pub fn restart_with_deck(state: &mut GameSession, deck: Deck) -> Vec<GameEvent> {
        let variant = state.variant;
        let mut notice = state.match_notice;
        notice.supersede();

        *state = GameSession::with_deck(variant, deck);
        state.match_notice = notice;

        let mut events = Vec::new();
        Self::emit(state, &mut events, GameEvent::SessionRestarted { variant });
        Self::emit(
            state,
            &mut events,
            GameEvent::PhaseEntered {
                phase: Phase::Prediction,
            },
        );
        console_log!("{} restarted", variant.title());
        events
    }

    /// 返回上一阶段：按相同下标重新发该阶段的牌，离开阶段的进度丢弃，不是撤销。
    pub fn navigate_back(state: &mut GameSession) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_integrity(state)?;
        match state.phase {
            Phase::Prediction => return Err(RuleError::AtFirstPhase),
            Phase::Pyramid => state.enter_prediction(),
            Phase::Bus | Phase::Finished => state.enter_pyramid(),
        }

        let mut events = Vec::new();
        let phase = state.phase;
        Self::emit(state, &mut events, GameEvent::PhaseEntered { phase });
        console_log!("back to {}", state.variant.phase_label(phase));
        Ok(events)
    }

    /// 提示到期。令牌过时（已被新配对或重开取代）时什么都不做。
    pub fn expire_match_notice(state: &mut GameSession, token: u64) -> bool {
        state.match_notice.expire(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::cards::Card;
    use crate::game::state::{PyramidStatus, BUS_LENGTH, PYRAMID_SIZE};

    fn card(label: &str) -> Card {
        label.parse().expect("test card label should parse")
    }

    fn session(variant: Variant, leading: &[&str]) -> GameSession {
        let cards: Vec<Card> = leading.iter().map(|label| card(label)).collect();
        let deck = Deck::stacked(&cards).expect("stacked deck should be valid");
        RuleEngine::start_session_with_deck(variant, deck)
    }

    fn play_predictions(state: &mut GameSession, predictions: &[Prediction]) -> Vec<bool> {
        let mut results = Vec::new();
        for (i, &prediction) in predictions.iter().enumerate() {
            if i > 0 {
                RuleEngine::advance_card(state).expect("advance should succeed");
            }
            let events =
                RuleEngine::submit_prediction(state, prediction).expect("prediction accepted");
            match events.as_slice() {
                [GameEvent::CardPredicted { correct, .. }] => results.push(*correct),
                other => panic!("unexpected events {other:?}"),
            }
        }
        results
    }

    fn finish_prediction(state: &mut GameSession) {
        let predictions = [
            Prediction::Red,
            Prediction::Higher,
            Prediction::Inside,
            Prediction::Hearts,
            Prediction::Hearts,
            Prediction::Hearts,
        ];
        let hand_size = state.hand.len();
        play_predictions(state, &predictions[..hand_size]);
        RuleEngine::advance_phase(state).expect("hand resolved");
    }

    fn finish_pyramid(state: &mut GameSession) {
        for _ in 0..PYRAMID_SIZE {
            RuleEngine::reveal_next_pyramid_card(state).expect("pyramid reveal");
        }
        RuleEngine::advance_phase(state).expect("pyramid revealed");
    }

    #[test]
    fn normal_scenario_records_prediction_results() {
        let mut state = session(Variant::Normal, &["2♣", "9♥", "5♠", "K♦"]);
        let results = play_predictions(
            &mut state,
            &[
                Prediction::Black,
                Prediction::Higher,
                Prediction::Inside,
                Prediction::Spades,
            ],
        );
        assert_eq!(results, vec![true, true, true, false]);
        assert!(state.hand.iter().all(|card| card.status == HandStatus::Revealed));
        assert_eq!(
            state.hand[3].prediction,
            Some(PredictionRecord {
                prediction: Prediction::Spades,
                correct: false
            })
        );
    }

    #[test]
    fn only_one_hand_card_is_in_flight() {
        let mut state = session(Variant::Normal, &["2♣", "9♥", "5♠", "K♦"]);
        assert_eq!(
            RuleEngine::advance_card(&mut state),
            Err(RuleError::CardUnresolved { index: 0 })
        );
        RuleEngine::submit_prediction(&mut state, Prediction::Red).expect("prediction accepted");

        let before = state.clone();
        assert_eq!(
            RuleEngine::submit_prediction(&mut state, Prediction::Black),
            Err(RuleError::NoPendingCard)
        );
        assert_eq!(state, before, "rejected prediction must not mutate");

        RuleEngine::advance_card(&mut state).expect("advance should succeed");
        assert_eq!(
            RuleEngine::submit_prediction(&mut state, Prediction::Red),
            Err(RuleError::PredictionMismatch {
                index: 1,
                expected: PredictionKind::HigherLower,
                actual: Prediction::Red,
            })
        );
        assert_eq!(state.pending_card(), Some(1));
    }

    #[test]
    fn phase_gates_hold_until_complete() {
        let mut state = session(Variant::Normal, &[]);
        assert_eq!(
            RuleEngine::advance_phase(&mut state),
            Err(RuleError::HandIncomplete { unresolved: 4 })
        );
        assert!(matches!(
            RuleEngine::reveal_next_pyramid_card(&mut state),
            Err(RuleError::InvalidPhase {
                expected: Phase::Pyramid,
                actual: Phase::Prediction
            })
        ));

        finish_prediction(&mut state);
        assert_eq!(state.phase, Phase::Pyramid);
        assert_eq!(
            RuleEngine::advance_card(&mut state),
            Err(RuleError::InvalidPhase {
                expected: Phase::Prediction,
                actual: Phase::Pyramid
            })
        );
        RuleEngine::reveal_next_pyramid_card(&mut state).expect("pyramid reveal");
        assert_eq!(
            RuleEngine::advance_phase(&mut state),
            Err(RuleError::PyramidIncomplete { hidden: 10 })
        );

        for _ in 1..PYRAMID_SIZE {
            RuleEngine::reveal_next_pyramid_card(&mut state).expect("pyramid reveal");
        }
        let extra = RuleEngine::reveal_next_pyramid_card(&mut state).expect("no-op reveal");
        assert!(extra.is_empty());
        RuleEngine::advance_phase(&mut state).expect("pyramid revealed");
        assert_eq!(state.phase, Phase::Bus);
        assert_eq!(RuleEngine::advance_phase(&mut state), Err(RuleError::NoNextPhase));
    }

    #[test]
    fn hand_exhausted_after_last_card() {
        let mut state = session(Variant::Extreme, &[]);
        play_predictions(
            &mut state,
            &[
                Prediction::Red,
                Prediction::Lower,
                Prediction::Outside,
                Prediction::Clubs,
                Prediction::Diamonds,
                Prediction::Spades,
            ],
        );
        assert_eq!(
            RuleEngine::advance_card(&mut state),
            Err(RuleError::HandExhausted)
        );
        assert_eq!(state.hand.len(), 6);
        RuleEngine::advance_phase(&mut state).expect("hand resolved");
    }

    #[test]
    fn matching_raises_notice_until_expired() {
        // 金字塔最后一行是 9♣，与手牌 2♣ 同花色
        let mut state = session(
            Variant::Normal,
            &[
                "2♣", "9♥", "5♠", "K♦", "3♥", "4♥", "6♥", "7♥", "8♥", "10♥", "J♥", "Q♥", "A♥",
                "3♦", "9♣",
            ],
        );
        finish_prediction(&mut state);
        RuleEngine::reveal_next_pyramid_card(&mut state).expect("pyramid reveal");

        let events = RuleEngine::play_hand_card(&mut state, 0).expect("hand card playable");
        assert!(matches!(
            events.as_slice(),
            [GameEvent::HandCardPlayed { index: 0, drinks: 2, .. }]
        ));
        assert!(state.match_notice.active);
        assert_eq!(state.pyramid.rows[4][0].status, PyramidStatus::Matched);

        let token = state.match_notice.token;
        assert!(RuleEngine::expire_match_notice(&mut state, token));
        assert!(!state.match_notice.active);

        assert_eq!(
            RuleEngine::play_hand_card(&mut state, 0),
            Err(RuleError::HandCardAlreadyMatched { index: 0 })
        );
    }

    #[test]
    fn restart_supersedes_pending_notice() {
        let mut state = session(
            Variant::Normal,
            &[
                "2♣", "9♥", "5♠", "K♦", "3♥", "4♥", "6♥", "7♥", "8♥", "10♥", "J♥", "Q♥", "A♥",
                "3♦", "9♣",
            ],
        );
        finish_prediction(&mut state);
        RuleEngine::reveal_next_pyramid_card(&mut state).expect("pyramid reveal");
        RuleEngine::play_hand_card(&mut state, 0).expect("hand card playable");
        let stale = state.match_notice.token;

        let events = RuleEngine::restart_with_deck(&mut state, Deck::with_seed(1));
        assert!(matches!(
            events.first(),
            Some(GameEvent::SessionRestarted {
                variant: Variant::Normal
            })
        ));
        assert_eq!(state.phase, Phase::Prediction);
        assert!(!state.match_notice.active);
        assert!(!RuleEngine::expire_match_notice(&mut state, stale));

        let token = state.match_notice.raise();
        assert_ne!(token, stale);
    }

    #[test]
    fn navigating_back_redeals_instead_of_undoing() {
        let mut state = session(Variant::Normal, &[]);
        assert_eq!(
            RuleEngine::navigate_back(&mut state),
            Err(RuleError::AtFirstPhase)
        );

        finish_prediction(&mut state);
        RuleEngine::reveal_next_pyramid_card(&mut state).expect("pyramid reveal");
        RuleEngine::play_hand_card(&mut state, 1).expect("hand card playable");

        RuleEngine::navigate_back(&mut state).expect("back to prediction");
        assert_eq!(state.phase, Phase::Prediction);
        assert_eq!(state.current_card, 0);
        assert!(state.hand.iter().all(|card| card.status == HandStatus::Hidden));
        assert!(state.hand.iter().all(|card| card.prediction.is_none()));
        assert_eq!(state.pyramid.hidden_count(), PYRAMID_SIZE);
        assert_eq!(state.hand_cards(), state.deck.cards()[0..4].to_vec());

        finish_prediction(&mut state);
        finish_pyramid(&mut state);
        RuleEngine::start_bus_ride(&mut state).expect("ride should start");
        RuleEngine::navigate_back(&mut state).expect("back to pyramid");
        assert_eq!(state.phase, Phase::Pyramid);
        assert_eq!(state.pyramid.hidden_count(), PYRAMID_SIZE);
        assert!(state.hand.iter().all(|card| card.status == HandStatus::Revealed));
        assert!(state.hand.iter().all(|card| card.prediction.is_some()));
        assert_eq!(state.bus.current_index, None);
        state
            .integrity_check()
            .expect("re-entered session should be consistent");
    }

    #[test]
    fn navigating_back_refuses_inconsistent_session() {
        let mut state = session(Variant::Normal, &[]);
        finish_prediction(&mut state);
        state.bus.cards[0].revealed = true;
        state.bus.current_index = Some(0);

        let before = state.clone();
        assert_eq!(
            RuleEngine::navigate_back(&mut state),
            Err(RuleError::IntegrityViolation {
                error: IntegrityError::BusOutOfPhase {
                    phase: Phase::Pyramid
                }
            })
        );
        assert_eq!(state, before, "rejected navigation must not mutate");
    }

    #[test]
    fn bus_ride_runs_to_terminal_phase() {
        // 普通模式巴士取 25..35，按升序排好
        let mut leading: Vec<Card> = crate::game::cards::Deck::ordered().cards()[..25]
            .iter()
            .copied()
            .filter(|c| c.suit != crate::game::cards::Suit::Clubs)
            .take(25)
            .collect();
        let bus: Vec<Card> = ["2♣", "3♣", "4♣", "5♣", "6♣", "7♣", "8♣", "9♣", "10♣", "J♣"]
            .iter()
            .map(|label| card(label))
            .collect();
        leading.extend(bus.iter().copied());
        assert_eq!(leading.len(), 25 + BUS_LENGTH);
        let deck = Deck::stacked(&leading).expect("stacked deck should be valid");
        let mut state = RuleEngine::start_session_with_deck(Variant::Normal, deck);

        finish_prediction(&mut state);
        finish_pyramid(&mut state);
        assert_eq!(
            RuleEngine::submit_bus_prediction(&mut state, Direction::Higher),
            Err(RuleError::RideNotStarted)
        );
        RuleEngine::start_bus_ride(&mut state).expect("ride should start");
        assert_eq!(state.bus.cards[0].card, bus[0]);

        let events = RuleEngine::submit_bus_prediction(&mut state, Direction::Lower)
            .expect("guess accepted");
        assert!(matches!(
            events.as_slice(),
            [GameEvent::BusRideReset { missed_at: 1, .. }]
        ));

        for _ in 0..8 {
            RuleEngine::submit_bus_prediction(&mut state, Direction::Higher)
                .expect("guess accepted");
        }
        assert_eq!(state.phase, Phase::Bus);
        let events = RuleEngine::submit_bus_prediction(&mut state, Direction::Higher)
            .expect("guess accepted");
        assert!(matches!(events.last(), Some(GameEvent::BusRideCompleted)));
        assert_eq!(state.phase, Phase::Finished);
        assert_eq!(
            RuleEngine::submit_bus_prediction(&mut state, Direction::Higher),
            Err(RuleError::RideCompleted)
        );
        assert_eq!(RuleEngine::advance_phase(&mut state), Err(RuleError::GameFinished));
    }

    #[test]
    fn extreme_bus_uses_fixed_offset() {
        let mut state = session(Variant::Extreme, &[]);
        finish_prediction(&mut state);
        finish_pyramid(&mut state);
        let expected: Vec<Card> = state.deck.cards()[31..41].to_vec();
        let dealt: Vec<Card> = state.bus.cards.iter().map(|bc| bc.card).collect();
        assert_eq!(dealt, expected);
    }
}
