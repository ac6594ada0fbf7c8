use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::cards::Card;
use super::rules::RuleError;
use super::state::BusRide;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Higher,
    Lower,
}

impl FromStr for Direction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "higher" => Ok(Direction::Higher),
            "lower" => Ok(Direction::Lower),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum BusOutcome {
    Advanced { index: usize, card: Card },
    Completed { card: Card },
    /// 猜错，只保留第一张翻开，从头再来。
    Reset { missed_at: usize, card: Card },
}

pub struct BusEngine;

impl BusEngine {
    pub fn start_ride(bus: &mut BusRide) -> Result<Card, RuleError> {
        if bus.is_started() {
            return Err(RuleError::RideAlreadyStarted);
        }
        let first = bus.cards.first_mut().ok_or(RuleError::RideNotStarted)?;
        first.revealed = true;
        let card = first.card;
        bus.current_index = Some(0);
        Ok(card)
    }

    /// 高：下一张严格大于当前；低：下一张小于或等于当前（平局算低）。
    pub fn is_correct(direction: Direction, current: &Card, next: &Card) -> bool {
        match direction {
            Direction::Higher => next.numeric_rank() > current.numeric_rank(),
            Direction::Lower => next.numeric_rank() <= current.numeric_rank(),
        }
    }

    pub fn predict(bus: &mut BusRide, direction: Direction) -> Result<BusOutcome, RuleError> {
        let current_index = bus.current_index.ok_or(RuleError::RideNotStarted)?;
        if bus.is_complete() {
            return Err(RuleError::RideCompleted);
        }
        let next_index = current_index + 1;
        let current = bus.cards[current_index].card;
        let next = bus.cards[next_index].card;

        if Self::is_correct(direction, &current, &next) {
            bus.cards[next_index].revealed = true;
            bus.current_index = Some(next_index);
            if bus.is_complete() {
                return Ok(BusOutcome::Completed { card: next });
            }
            return Ok(BusOutcome::Advanced {
                index: next_index,
                card: next,
            });
        }

        for (index, bus_card) in bus.cards.iter_mut().enumerate() {
            bus_card.revealed = index == 0;
        }
        bus.current_index = Some(0);
        Ok(BusOutcome::Reset {
            missed_at: next_index,
            card: next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::cards::{Rank, Suit};

    fn ride(ranks: &[Rank]) -> BusRide {
        let cards: Vec<Card> = ranks
            .iter()
            .enumerate()
            .map(|(i, &rank)| Card::new(rank, Suit::ALL[i % 4]))
            .collect();
        BusRide::deal(&cards)
    }

    fn ascending() -> BusRide {
        ride(&[
            Rank::Two,
            Rank::Three,
            Rank::Four,
            Rank::Five,
            Rank::Six,
            Rank::Seven,
            Rank::Eight,
            Rank::Nine,
            Rank::Ten,
            Rank::Jack,
        ])
    }

    #[test]
    fn predictions_require_a_started_ride() {
        let mut bus = ascending();
        assert_eq!(
            BusEngine::predict(&mut bus, Direction::Higher),
            Err(RuleError::RideNotStarted)
        );
        let first = BusEngine::start_ride(&mut bus).expect("ride should start");
        assert_eq!(first.rank, Rank::Two);
        assert_eq!(bus.current_index, Some(0));
        assert_eq!(bus.revealed_count(), 1);
        assert_eq!(BusEngine::start_ride(&mut bus), Err(RuleError::RideAlreadyStarted));
    }

    #[test]
    fn increasing_ride_completes_on_ninth_guess() {
        let mut bus = ascending();
        BusEngine::start_ride(&mut bus).expect("ride should start");
        for guess in 1..=8 {
            let outcome = BusEngine::predict(&mut bus, Direction::Higher).expect("guess accepted");
            assert!(matches!(outcome, BusOutcome::Advanced { index, .. } if index == guess));
        }
        let last = BusEngine::predict(&mut bus, Direction::Higher).expect("guess accepted");
        assert!(matches!(last, BusOutcome::Completed { .. }));
        assert!(bus.is_complete());
        assert_eq!(bus.revealed_count(), 10);
        assert_eq!(
            BusEngine::predict(&mut bus, Direction::Lower),
            Err(RuleError::RideCompleted)
        );
    }

    #[test]
    fn miss_resets_to_first_card() {
        let mut bus = ascending();
        BusEngine::start_ride(&mut bus).expect("ride should start");
        for _ in 0..5 {
            BusEngine::predict(&mut bus, Direction::Higher).expect("guess accepted");
        }
        let outcome = BusEngine::predict(&mut bus, Direction::Lower).expect("guess accepted");
        assert!(matches!(outcome, BusOutcome::Reset { missed_at: 6, .. }));
        assert_eq!(bus.current_index, Some(0));
        assert!(bus.cards[0].revealed);
        assert!(bus.cards[1..].iter().all(|card| !card.revealed));
    }

    #[test]
    fn ties_only_count_for_lower() {
        let mut bus = ride(&[Rank::Five; 10]);
        BusEngine::start_ride(&mut bus).expect("ride should start");
        let outcome = BusEngine::predict(&mut bus, Direction::Higher).expect("guess accepted");
        assert!(matches!(outcome, BusOutcome::Reset { missed_at: 1, .. }));

        let outcome = BusEngine::predict(&mut bus, Direction::Lower).expect("guess accepted");
        assert!(matches!(outcome, BusOutcome::Advanced { index: 1, .. }));
    }

    #[test]
    fn direction_parses_from_button_values() {
        assert_eq!("Higher".parse::<Direction>(), Ok(Direction::Higher));
        assert_eq!("lower".parse::<Direction>(), Ok(Direction::Lower));
        assert!("inside".parse::<Direction>().is_err());
    }
}
