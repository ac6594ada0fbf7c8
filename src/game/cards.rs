//! 扑克牌与牌堆（DeckFactory）。

use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use once_cell::sync::Lazy;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// 一副牌的张数。
pub const DECK_SIZE: usize = 52;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Spades,
    Hearts,
    Diamonds,
    Clubs,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Spades, Suit::Hearts, Suit::Diamonds, Suit::Clubs];

    pub fn symbol(self) -> char {
        match self {
            Suit::Spades => '♠',
            Suit::Hearts => '♥',
            Suit::Diamonds => '♦',
            Suit::Clubs => '♣',
        }
    }

    pub fn color(self) -> CardColor {
        match self {
            Suit::Hearts | Suit::Diamonds => CardColor::Red,
            Suit::Spades | Suit::Clubs => CardColor::Black,
        }
    }
}

impl FromStr for Suit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spades" | "♠" => Ok(Suit::Spades),
            "hearts" | "♥" => Ok(Suit::Hearts),
            "diamonds" | "♦" => Ok(Suit::Diamonds),
            "clubs" | "♣" => Ok(Suit::Clubs),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CardColor {
    Red,
    Black,
}

/// 牌面点数，A 最大。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rank {
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "J")]
    Jack,
    #[serde(rename = "Q")]
    Queen,
    #[serde(rename = "K")]
    King,
    #[serde(rename = "A")]
    Ace,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Ace,
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
        Rank::Queen,
        Rank::King,
    ];

    /// 比较用的数值：2..10 为面值，J=11，Q=12，K=13，A=14。
    pub fn numeric(self) -> u8 {
        match self {
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten => 10,
            Rank::Jack => 11,
            Rank::Queen => 12,
            Rank::King => 13,
            Rank::Ace => 14,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
        }
    }
}

impl FromStr for Rank {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rank::ALL
            .iter()
            .copied()
            .find(|rank| rank.label().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Card {
    pub suit: Suit,
    pub rank: Rank,
}

impl Card {
    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self { suit, rank }
    }

    pub fn numeric_rank(&self) -> u8 {
        self.rank.numeric()
    }

    pub fn color(&self) -> CardColor {
        self.suit.color()
    }

    /// 花色或点数相同即视为配对。
    pub fn shares_suit_or_rank(&self, other: &Card) -> bool {
        self.suit == other.suit || self.rank == other.rank
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank.label(), self.suit.symbol())
    }
}

impl FromStr for Card {
    type Err = ();

    /// 解析形如 `10♥`、`K♦` 的写法。
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let suit_char = s.chars().last().ok_or(())?;
        let rank_part = &s[..s.len() - suit_char.len_utf8()];
        let suit = Suit::from_str(&suit_char.to_string())?;
        let rank = Rank::from_str(rank_part)?;
        Ok(Card::new(rank, suit))
    }
}

static ORDERED_DECK: Lazy<Vec<Card>> = Lazy::new(|| {
    Suit::ALL
        .iter()
        .flat_map(|&suit| Rank::ALL.iter().map(move |&rank| Card::new(rank, suit)))
        .collect()
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum DeckError {
    WrongSize { expected: usize, actual: usize },
    DuplicateCard { card: Card },
}

impl fmt::Display for DeckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeckError::WrongSize { expected, actual } => {
                write!(f, "deck must hold {expected} cards, got {actual}")
            }
            DeckError::DuplicateCard { card } => write!(f, "duplicate card {card} in deck"),
        }
    }
}

impl std::error::Error for DeckError {}

/// 洗好的一副牌。各阶段只按固定下标区间引用，不会真正抽走。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "Vec<Card>", into = "Vec<Card>")]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    /// 未洗的标准顺序（♠ ♥ ♦ ♣，每种 A..K）。
    pub fn ordered() -> Self {
        Self {
            cards: ORDERED_DECK.clone(),
        }
    }

    pub fn shuffled() -> Self {
        let mut rng = SmallRng::from_entropy();
        Self::shuffled_with(&mut rng)
    }

    pub fn with_seed(seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        Self::shuffled_with(&mut rng)
    }

    pub fn shuffled_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut deck = Self::ordered();
        deck.cards.shuffle(rng);
        deck
    }

    /// 按给定顺序建牌堆，必须恰好是 52 张互不相同的牌。
    pub fn from_cards(cards: Vec<Card>) -> Result<Self, DeckError> {
        if cards.len() != DECK_SIZE {
            return Err(DeckError::WrongSize {
                expected: DECK_SIZE,
                actual: cards.len(),
            });
        }
        let mut seen = HashSet::with_capacity(DECK_SIZE);
        for card in &cards {
            if !seen.insert(*card) {
                return Err(DeckError::DuplicateCard { card: *card });
            }
        }
        Ok(Self { cards })
    }

    /// 以 `leading` 开头、其余按标准顺序补足的牌堆，便于构造固定局面。
    pub fn stacked(leading: &[Card]) -> Result<Self, DeckError> {
        let mut cards = leading.to_vec();
        cards.extend(ORDERED_DECK.iter().filter(|card| !leading.contains(*card)));
        Self::from_cards(cards)
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// 取固定区间。越界属于配置错误，直接断言失败。
    pub fn deal(&self, range: Range<usize>) -> &[Card] {
        assert!(
            range.start <= range.end && range.end <= self.cards.len(),
            "deck range {range:?} exceeds {} cards",
            self.cards.len()
        );
        &self.cards[range]
    }
}

impl TryFrom<Vec<Card>> for Deck {
    type Error = DeckError;

    fn try_from(cards: Vec<Card>) -> Result<Self, Self::Error> {
        Deck::from_cards(cards)
    }
}

impl From<Deck> for Vec<Card> {
    fn from(deck: Deck) -> Self {
        deck.cards
    }
}

/// 生成一副均匀洗过的新牌。
pub fn create_deck() -> Deck {
    Deck::shuffled()
}
