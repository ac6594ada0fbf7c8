//! 预测阶段的判定规则。

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::cards::{Card, CardColor, Suit};
use super::rules::RuleError;

/// 玩家的一次预测，取值与界面按钮一致。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Prediction {
    Red,
    Black,
    Higher,
    Lower,
    Inside,
    Outside,
    Spades,
    Hearts,
    Diamonds,
    Clubs,
}

impl Prediction {
    pub fn kind(self) -> PredictionKind {
        match self {
            Prediction::Red | Prediction::Black => PredictionKind::Color,
            Prediction::Higher | Prediction::Lower => PredictionKind::HigherLower,
            Prediction::Inside | Prediction::Outside => PredictionKind::InsideOutside,
            Prediction::Spades | Prediction::Hearts | Prediction::Diamonds | Prediction::Clubs => {
                PredictionKind::Suit
            }
        }
    }

    pub fn suit(suit: Suit) -> Self {
        match suit {
            Suit::Spades => Prediction::Spades,
            Suit::Hearts => Prediction::Hearts,
            Suit::Diamonds => Prediction::Diamonds,
            Suit::Clubs => Prediction::Clubs,
        }
    }
}

impl FromStr for Prediction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "red" => Ok(Prediction::Red),
            "black" => Ok(Prediction::Black),
            "higher" => Ok(Prediction::Higher),
            "lower" => Ok(Prediction::Lower),
            "inside" => Ok(Prediction::Inside),
            "outside" => Ok(Prediction::Outside),
            "spades" => Ok(Prediction::Spades),
            "hearts" => Ok(Prediction::Hearts),
            "diamonds" => Ok(Prediction::Diamonds),
            "clubs" => Ok(Prediction::Clubs),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PredictionKind {
    Color,
    HigherLower,
    InsideOutside,
    Suit,
}

impl PredictionKind {
    /// 第 0 张猜颜色，第 1 张猜高低，第 2 张猜内外，其余猜花色。
    pub fn for_position(index: usize) -> Self {
        match index {
            0 => PredictionKind::Color,
            1 => PredictionKind::HigherLower,
            2 => PredictionKind::InsideOutside,
            _ => PredictionKind::Suit,
        }
    }

    pub fn choices(self) -> &'static [Prediction] {
        match self {
            PredictionKind::Color => &[Prediction::Red, Prediction::Black],
            PredictionKind::HigherLower => &[Prediction::Higher, Prediction::Lower],
            PredictionKind::InsideOutside => &[Prediction::Inside, Prediction::Outside],
            PredictionKind::Suit => &[
                Prediction::Hearts,
                Prediction::Diamonds,
                Prediction::Clubs,
                Prediction::Spades,
            ],
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            PredictionKind::Color => {
                "Red or black? Guess whether the card is hearts/diamonds (red) or clubs/spades (black)."
            }
            PredictionKind::HigherLower => {
                "Higher or lower? Is the second card higher or lower than the first?"
            }
            PredictionKind::InsideOutside => {
                "Inside or outside? Does the third card fall between the first two values or outside them?"
            }
            PredictionKind::Suit => "Which suit? Guess the exact suit: hearts, spades, clubs or diamonds.",
        }
    }
}

/// 无状态的判定器，只读手牌，记录结果和翻牌由会话负责。
pub struct PredictionEngine;

impl PredictionEngine {
    pub fn evaluate(
        card_index: usize,
        prediction: Prediction,
        hand: &[Card],
    ) -> Result<bool, RuleError> {
        let expected = PredictionKind::for_position(card_index);
        if prediction.kind() != expected {
            return Err(RuleError::PredictionMismatch {
                index: card_index,
                expected,
                actual: prediction,
            });
        }

        let card = hand
            .get(card_index)
            .ok_or(RuleError::HandCardNotFound { index: card_index })?;
        let anchor = |index: usize| {
            hand.get(index)
                .map(Card::numeric_rank)
                .ok_or(RuleError::HandCardNotFound { index })
        };
        let value = card.numeric_rank();

        let correct = match prediction {
            Prediction::Red => card.color() == CardColor::Red,
            Prediction::Black => card.color() == CardColor::Black,
            // 点数相同时，高低都算错。
            Prediction::Higher => value > anchor(0)?,
            Prediction::Lower => value < anchor(0)?,
            Prediction::Inside | Prediction::Outside => {
                let (first, second) = (anchor(0)?, anchor(1)?);
                let (min, max) = (first.min(second), first.max(second));
                let inside = (min..=max).contains(&value);
                if prediction == Prediction::Inside {
                    inside
                } else {
                    !inside
                }
            }
            Prediction::Spades | Prediction::Hearts | Prediction::Diamonds | Prediction::Clubs => {
                Prediction::suit(card.suit) == prediction
            }
        };
        Ok(correct)
    }
}
