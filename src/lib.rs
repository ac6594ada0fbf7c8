pub mod game;
pub mod utils;

use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;

use gloo_timers::future::TimeoutFuture;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};
use web_sys::js_sys::Promise;

pub use game::{
    create_deck, BusEngine, BusOutcome, Card, CardColor, Deck, DeckError, Direction, GameEvent,
    GameSession, HandStatus, IntegrityError, MatchNotice, MatchReport, Phase, Prediction,
    PredictionEngine, PredictionKind, PyramidEngine, PyramidStatus, Rank, RuleEngine, RuleError,
    RuleResolution, Suit, Variant, VariantConfig, MATCH_NOTICE_MS,
};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    utils::set_panic_hook();
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn parse_value<T: FromStr>(value: &str) -> Result<T, JsValue> {
    T::from_str(value).map_err(|_| {
        to_js_error(RuleError::UnknownValue {
            value: value.to_string(),
        })
    })
}

fn make_resolution_json(resolution: RuleResolution) -> Result<String, JsValue> {
    serde_json::to_string(&resolution).map_err(serde_to_js_error)
}

/// 供前端持有的一局游戏。会话放在 `Rc<RefCell<_>>` 里，
/// 以便配对提示的定时任务在到期时清除标记。
#[wasm_bindgen]
pub struct BussenEngine {
    session: Rc<RefCell<GameSession>>,
    notice_ms: u32,
}

impl BussenEngine {
    fn resolve<F>(&self, action: F) -> Result<RuleResolution, JsValue>
    where
        F: FnOnce(&mut GameSession) -> Result<Vec<GameEvent>, RuleError>,
    {
        let mut session = self.session.borrow_mut();
        let events = action(&mut *session).map_err(to_js_error)?;
        Ok(RuleResolution::new(session.clone(), events))
    }

    fn apply<F>(&self, action: F) -> Result<String, JsValue>
    where
        F: FnOnce(&mut GameSession) -> Result<Vec<GameEvent>, RuleError>,
    {
        make_resolution_json(self.resolve(action)?)
    }

    /// 到期后按令牌清除提示；期间若有新配对或重开，令牌已过时，不做任何事。
    fn schedule_notice_expiry(&self, token: u64) {
        let session = Rc::clone(&self.session);
        let delay = self.notice_ms;
        spawn_local(async move {
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            if RuleEngine::expire_match_notice(&mut *session.borrow_mut(), token) {
                crate::console_log!("match notice {} expired", token);
            }
        });
    }
}

#[wasm_bindgen]
impl BussenEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(variant: Option<String>, notice_ms: Option<u32>) -> Result<BussenEngine, JsValue> {
        let variant = match variant.as_deref() {
            Some(value) => parse_value::<Variant>(value)?,
            None => Variant::Normal,
        };
        Ok(BussenEngine {
            session: Rc::new(RefCell::new(RuleEngine::start_session(variant))),
            notice_ms: notice_ms.unwrap_or(MATCH_NOTICE_MS),
        })
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&*self.session.borrow()).map_err(serde_to_js_error)
    }

    /// 导入外部保存的状态。导入时旧提示作废，令牌只增不减，已安排的清除任务不会误伤新提示。
    pub fn set_state_json(&mut self, json: &str) -> Result<(), JsValue> {
        let mut state: GameSession = serde_json::from_str(json).map_err(serde_to_js_error)?;
        state
            .integrity_check()
            .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;

        let mut session = self.session.borrow_mut();
        let mut notice = session.match_notice;
        notice.token = notice.token.max(state.match_notice.token);
        notice.supersede();
        state.match_notice = notice;
        *session = state;
        Ok(())
    }

    pub fn title(&self) -> String {
        self.session.borrow().variant.title().to_string()
    }

    pub fn phase_label(&self) -> String {
        let session = self.session.borrow();
        session.variant.phase_label(session.phase)
    }

    /// 当前待预测手牌的提示文字，没有待预测的牌时为空。
    pub fn prediction_prompt(&self) -> Option<String> {
        self.session
            .borrow()
            .pending_card()
            .map(|index| PredictionKind::for_position(index).prompt().to_string())
    }

    pub fn match_found(&self) -> bool {
        self.session.borrow().match_notice.active
    }

    pub fn submit_prediction(&mut self, value: &str) -> Result<String, JsValue> {
        let prediction: Prediction = parse_value(value)?;
        self.apply(|state| RuleEngine::submit_prediction(state, prediction))
    }

    pub fn advance_card(&mut self) -> Result<String, JsValue> {
        self.apply(RuleEngine::advance_card)
    }

    pub fn advance_phase(&mut self) -> Result<String, JsValue> {
        self.apply(RuleEngine::advance_phase)
    }

    /// 打出手牌；有配对时提示在 `notice_ms` 后自动消失。
    pub fn play_hand_card(&mut self, index: usize) -> Result<String, JsValue> {
        let previous = self.session.borrow().match_notice.token;
        let resolution = self.resolve(|state| RuleEngine::play_hand_card(state, index))?;
        let notice = resolution.state.match_notice;
        if notice.active && notice.token != previous {
            self.schedule_notice_expiry(notice.token);
        }
        make_resolution_json(resolution)
    }

    pub fn reveal_next_pyramid_card(&mut self) -> Result<String, JsValue> {
        self.apply(RuleEngine::reveal_next_pyramid_card)
    }

    pub fn start_bus_ride(&mut self) -> Result<String, JsValue> {
        self.apply(RuleEngine::start_bus_ride)
    }

    pub fn submit_bus_prediction(&mut self, direction: &str) -> Result<String, JsValue> {
        let direction: Direction = parse_value(direction)?;
        self.apply(|state| RuleEngine::submit_bus_prediction(state, direction))
    }

    pub fn restart(&mut self) -> Result<String, JsValue> {
        self.apply(|state| Ok(RuleEngine::restart(state)))
    }

    pub fn navigate_back(&mut self) -> Result<String, JsValue> {
        self.apply(RuleEngine::navigate_back)
    }

    /// 等待当前配对提示到期，结果为此刻提示是否已消失；没有提示时直接为 `false`。
    /// 打出手牌时已安排了自动清除，这里只供外壳等待同一时刻。
    pub fn expire_match_notice(&self) -> Promise {
        let session = Rc::clone(&self.session);
        let notice = session.borrow().match_notice;
        let delay = self.notice_ms;

        future_to_promise(async move {
            if !notice.active {
                return Ok(JsValue::FALSE);
            }
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            let mut session = session.borrow_mut();
            RuleEngine::expire_match_notice(&mut *session, notice.token);
            Ok(JsValue::from_bool(!session.match_notice.active))
        })
    }
}

/// 返回一副洗好的新牌。
#[wasm_bindgen(js_name = "createDeck")]
pub fn create_deck_js() -> Result<JsValue, JsValue> {
    to_value(&create_deck()).map_err(JsValue::from)
}

/// 开一局新游戏并返回初始状态。
#[wasm_bindgen(js_name = "startSession")]
pub fn start_session(variant: Option<String>) -> Result<JsValue, JsValue> {
    let variant = match variant.as_deref() {
        Some(value) => parse_value::<Variant>(value)?,
        None => Variant::Normal,
    };
    to_value(&RuleEngine::start_session(variant)).map_err(JsValue::from)
}

/// 单独判定一次预测，不涉及会话。
#[wasm_bindgen(js_name = "evaluatePrediction")]
pub fn evaluate_prediction(
    card_index: usize,
    prediction: &str,
    hand: JsValue,
) -> Result<bool, JsValue> {
    let prediction: Prediction = parse_value(prediction)?;
    let hand: Vec<Card> = from_value(hand).map_err(JsValue::from)?;
    PredictionEngine::evaluate(card_index, prediction, &hand).map_err(to_js_error)
}

#[wasm_bindgen(js_name = "validateSession")]
pub fn validate_session(state: JsValue) -> Result<(), JsValue> {
    let state: GameSession = from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
    Ok(())
}
