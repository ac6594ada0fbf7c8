use serde::{Deserialize, Serialize};

use super::rules::RuleError;
use super::state::{GameSession, HandStatus, Pyramid, PyramidPos, PyramidStatus};

/// 一次打出手牌的配对结果。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchReport {
    pub hand_index: usize,
    pub matches: Vec<PyramidPos>,
    /// 配中的金字塔牌口数之和，可分给其他玩家。
    pub drinks: u32,
}

impl MatchReport {
    pub fn matched(&self) -> bool {
        !self.matches.is_empty()
    }
}

pub struct PyramidEngine;

impl PyramidEngine {
    /// 从最后一行往上、行内从左到右翻开第一张背面朝上的牌。
    pub fn reveal_next(pyramid: &mut Pyramid) -> Option<PyramidPos> {
        for (row, cards) in pyramid.rows.iter_mut().enumerate().rev() {
            if let Some((col, card)) = cards
                .iter_mut()
                .enumerate()
                .find(|(_, card)| card.status == PyramidStatus::Hidden)
            {
                card.status = PyramidStatus::Revealed;
                return Some(PyramidPos { row, col });
            }
        }
        None
    }

    pub fn is_complete(pyramid: &Pyramid) -> bool {
        pyramid.all_revealed()
    }

    /// 打出一张手牌：所有已翻开、未配对且花色或点数相同的金字塔牌一次性配对。
    pub fn play_hand_card(
        hand_index: usize,
        session: &mut GameSession,
    ) -> Result<MatchReport, RuleError> {
        let hand_card = session
            .hand
            .get(hand_index)
            .ok_or(RuleError::HandCardNotFound { index: hand_index })?;
        match hand_card.status {
            HandStatus::Matched => {
                return Err(RuleError::HandCardAlreadyMatched { index: hand_index })
            }
            HandStatus::Hidden => return Err(RuleError::HandCardHidden { index: hand_index }),
            HandStatus::Revealed | HandStatus::Played => {}
        }
        let played = hand_card.card;

        let mut matches = Vec::new();
        let mut drinks = 0;
        for (row, cards) in session.pyramid.rows.iter_mut().enumerate() {
            for (col, pyramid_card) in cards.iter_mut().enumerate() {
                if pyramid_card.status == PyramidStatus::Revealed
                    && pyramid_card.card.shares_suit_or_rank(&played)
                {
                    pyramid_card.status = PyramidStatus::Matched;
                    drinks += pyramid_card.drink_value;
                    matches.push(PyramidPos { row, col });
                }
            }
        }

        session.hand[hand_index].status = if matches.is_empty() {
            HandStatus::Played
        } else {
            HandStatus::Matched
        };

        Ok(MatchReport {
            hand_index,
            matches,
            drinks,
        })
    }
}
