//! LZMA symbol model: literals, matches and repeated matches.

use super::super::buffer::try_filled;
use super::super::{DecompressError, Result};
use super::dict::Dictionary;
use super::range_coder::{RangeReader, PROB_INIT};

const STATES: usize = 12;
/// States below this follow a literal.
const LIT_STATES: u8 = 7;

const POS_STATES_MAX: usize = 1 << 4;

const LITERAL_CODER_SIZE: usize = 0x300;
/// `lc + lp <= 4`, so at most 16 literal coders.
const LITERAL_CODERS_MAX: usize = 1 << 4;

const MATCH_LEN_MIN: u32 = 2;
const LEN_LOW_SYMBOLS: usize = 1 << 3;
const LEN_MID_SYMBOLS: usize = 1 << 3;
const LEN_HIGH_SYMBOLS: usize = 1 << 8;

const DIST_STATES: usize = 4;
const DIST_SLOTS: u32 = 1 << 6;
const DIST_MODEL_START: u32 = 4;
const DIST_MODEL_END: u32 = 14;
const FULL_DISTANCES: usize = 1 << (DIST_MODEL_END / 2);
const ALIGN_BITS: u32 = 4;
const ALIGN_SIZE: usize = 1 << ALIGN_BITS;

/// Largest valid properties byte: (pb * 5 + lp) * 9 + lc with pb = 4,
/// lp = 4, lc = 8.
const PROPS_MAX: u8 = (4 * 5 + 4) * 9 + 8;

/// Which kinds of symbols were decoded most recently, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LzmaState {
    LitLit = 0,
    MatchLitLit,
    RepLitLit,
    ShortRepLitLit,
    MatchLit,
    RepLit,
    ShortRepLit,
    LitMatch,
    LitLongRep,
    LitShortRep,
    NonLitMatch,
    NonLitRep,
}

impl LzmaState {
    #[inline]
    fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn is_literal(self) -> bool {
        (self as u8) < LIT_STATES
    }

    #[inline]
    fn after_literal(self) -> Self {
        use LzmaState::*;
        match self {
            LitLit | MatchLitLit | RepLitLit | ShortRepLitLit => LitLit,
            MatchLit => MatchLitLit,
            RepLit => RepLitLit,
            ShortRepLit => ShortRepLitLit,
            LitMatch => MatchLit,
            LitLongRep => RepLit,
            LitShortRep => ShortRepLit,
            NonLitMatch => MatchLit,
            NonLitRep => RepLit,
        }
    }

    #[inline]
    fn after_match(self) -> Self {
        if self.is_literal() {
            Self::LitMatch
        } else {
            Self::NonLitMatch
        }
    }

    #[inline]
    fn after_long_rep(self) -> Self {
        if self.is_literal() {
            Self::LitLongRep
        } else {
            Self::NonLitRep
        }
    }

    #[inline]
    fn after_short_rep(self) -> Self {
        if self.is_literal() {
            Self::LitShortRep
        } else {
            Self::NonLitRep
        }
    }
}

/// Literal context and position-state parameters from a properties byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaProperties {
    pub lc: u32,
    pub lp: u32,
    pub pb: u32,
}

impl LzmaProperties {
    /// Decode `(pb * 5 + lp) * 9 + lc`, requiring `lc + lp <= 4`.
    pub fn from_byte(props: u8) -> Result<Self> {
        if props > PROPS_MAX {
            return Err(DecompressError::InvalidLzmaProperties(props));
        }
        let mut rest = u32::from(props);
        let pb = rest / (9 * 5);
        rest %= 9 * 5;
        let lp = rest / 9;
        let lc = rest % 9;
        if lc + lp > 4 {
            return Err(DecompressError::InvalidLzmaProperties(props));
        }
        Ok(Self { lc, lp, pb })
    }
}

/// Probabilities for one length decoder (lengths 2-273).
#[derive(Debug, Clone)]
struct LengthDecoder {
    /// Length is at least 10.
    choice: u16,
    /// Length is at least 18.
    choice2: u16,
    low: [[u16; LEN_LOW_SYMBOLS]; POS_STATES_MAX],
    mid: [[u16; LEN_MID_SYMBOLS]; POS_STATES_MAX],
    high: [u16; LEN_HIGH_SYMBOLS],
}

impl Default for LengthDecoder {
    fn default() -> Self {
        Self {
            choice: PROB_INIT,
            choice2: PROB_INIT,
            low: [[PROB_INIT; LEN_LOW_SYMBOLS]; POS_STATES_MAX],
            mid: [[PROB_INIT; LEN_MID_SYMBOLS]; POS_STATES_MAX],
            high: [PROB_INIT; LEN_HIGH_SYMBOLS],
        }
    }
}

impl LengthDecoder {
    fn decode(&mut self, rc: &mut RangeReader, pos_state: usize) -> u32 {
        let (probs, limit, base): (&mut [u16], usize, u32) = if !rc.bit(&mut self.choice) {
            (&mut self.low[pos_state][..], LEN_LOW_SYMBOLS, MATCH_LEN_MIN)
        } else if !rc.bit(&mut self.choice2) {
            (
                &mut self.mid[pos_state][..],
                LEN_MID_SYMBOLS,
                MATCH_LEN_MIN + LEN_LOW_SYMBOLS as u32,
            )
        } else {
            (
                &mut self.high[..],
                LEN_HIGH_SYMBOLS,
                MATCH_LEN_MIN + (LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS) as u32,
            )
        };
        base + rc.bittree(probs, limit as u32) - limit as u32
    }
}

/// LZMA decoder state: recent distances, symbol history and all adaptive
/// probabilities.
#[derive(Debug, Clone)]
pub struct LzmaDecoder {
    rep0: u32,
    rep1: u32,
    rep2: u32,
    rep3: u32,
    state: LzmaState,
    /// Bytes of the current match still to be copied.
    len: u32,

    lc: u32,
    literal_pos_mask: usize,
    pos_mask: usize,

    is_match: [[u16; POS_STATES_MAX]; STATES],
    is_rep: [u16; STATES],
    is_rep0: [u16; STATES],
    is_rep1: [u16; STATES],
    is_rep2: [u16; STATES],
    is_rep0_long: [[u16; POS_STATES_MAX]; STATES],
    dist_slot: [[u16; DIST_SLOTS as usize]; DIST_STATES],
    /// Reverse bit trees for distance slots 4..14. One spare leading
    /// entry keeps every tree's base index non-negative.
    dist_special: [u16; FULL_DISTANCES - DIST_MODEL_END as usize + 1],
    dist_align: [u16; ALIGN_SIZE],
    match_len: LengthDecoder,
    rep_len: LengthDecoder,
    literal: Vec<[u16; LITERAL_CODER_SIZE]>,
}

impl LzmaDecoder {
    pub fn new() -> Result<Self> {
        Ok(Self {
            rep0: 0,
            rep1: 0,
            rep2: 0,
            rep3: 0,
            state: LzmaState::LitLit,
            len: 0,
            lc: 0,
            literal_pos_mask: 0,
            pos_mask: 0,
            is_match: [[PROB_INIT; POS_STATES_MAX]; STATES],
            is_rep: [PROB_INIT; STATES],
            is_rep0: [PROB_INIT; STATES],
            is_rep1: [PROB_INIT; STATES],
            is_rep2: [PROB_INIT; STATES],
            is_rep0_long: [[PROB_INIT; POS_STATES_MAX]; STATES],
            dist_slot: [[PROB_INIT; DIST_SLOTS as usize]; DIST_STATES],
            dist_special: [PROB_INIT; FULL_DISTANCES - DIST_MODEL_END as usize + 1],
            dist_align: [PROB_INIT; ALIGN_SIZE],
            match_len: LengthDecoder::default(),
            rep_len: LengthDecoder::default(),
            literal: try_filled(LITERAL_CODERS_MAX, [PROB_INIT; LITERAL_CODER_SIZE])?,
        })
    }

    /// Reset history and every probability. The dictionary is untouched;
    /// LZMA2 can reset state without resetting the dictionary.
    pub fn reset(&mut self) {
        self.state = LzmaState::LitLit;
        self.rep0 = 0;
        self.rep1 = 0;
        self.rep2 = 0;
        self.rep3 = 0;
        self.len = 0;

        for row in &mut self.is_match {
            row.fill(PROB_INIT);
        }
        self.is_rep.fill(PROB_INIT);
        self.is_rep0.fill(PROB_INIT);
        self.is_rep1.fill(PROB_INIT);
        self.is_rep2.fill(PROB_INIT);
        for row in &mut self.is_rep0_long {
            row.fill(PROB_INIT);
        }
        for row in &mut self.dist_slot {
            row.fill(PROB_INIT);
        }
        self.dist_special.fill(PROB_INIT);
        self.dist_align.fill(PROB_INIT);
        self.match_len = LengthDecoder::default();
        self.rep_len = LengthDecoder::default();
        for coder in &mut self.literal {
            coder.fill(PROB_INIT);
        }
    }

    /// Apply new lc/lp/pb and reset the model.
    pub fn set_properties(&mut self, props: u8) -> Result<()> {
        let props = LzmaProperties::from_byte(props)?;
        self.lc = props.lc;
        self.literal_pos_mask = (1 << props.lp) - 1;
        self.pos_mask = (1 << props.pb) - 1;
        self.reset();
        Ok(())
    }

    /// Length of a match that could not be finished before the output
    /// limit.
    pub fn pending_len(&self) -> u32 {
        self.len
    }

    /// Decode symbols until the dictionary limit is reached or the input
    /// window may not hold another full symbol.
    pub fn decode(&mut self, rc: &mut RangeReader, dict: &mut Dictionary) -> Result<()> {
        if dict.has_space() && self.len > 0 {
            dict.repeat(&mut self.len, self.rep0)?;
        }

        while dict.has_space() && !rc.limit_exceeded() {
            let pos_state = dict.pos() & self.pos_mask;
            let state = self.state.index();

            if !rc.bit(&mut self.is_match[state][pos_state]) {
                self.decode_literal(rc, dict);
            } else {
                if rc.bit(&mut self.is_rep[state]) {
                    self.decode_rep_match(rc, pos_state);
                } else {
                    self.decode_match(rc, pos_state);
                }
                dict.repeat(&mut self.len, self.rep0)?;
            }
        }

        // Leave the decoder normalized so chunk ends are detected exactly.
        rc.normalize();
        Ok(())
    }

    fn decode_literal(&mut self, rc: &mut RangeReader, dict: &mut Dictionary) {
        let prev_byte = u32::from(dict.get(0));
        let low = (prev_byte >> (8 - self.lc)) as usize;
        let high = (dict.pos() & self.literal_pos_mask) << self.lc;
        let probs = &mut self.literal[low + high];

        let symbol = if self.state.is_literal() {
            rc.bittree(probs, 0x100)
        } else {
            // After a match, the byte at rep0 predicts this one bit by bit
            // until the first mismatch.
            let mut symbol = 1u32;
            let mut match_byte = u32::from(dict.get(self.rep0)) << 1;
            let mut offset = 0x100u32;
            while symbol < 0x100 {
                let match_bit = match_byte & offset;
                match_byte <<= 1;
                let i = (offset + match_bit + symbol) as usize;
                if rc.bit(&mut probs[i]) {
                    symbol = (symbol << 1) + 1;
                    offset &= match_bit;
                } else {
                    symbol <<= 1;
                    offset &= !match_bit;
                }
            }
            symbol
        };

        dict.put(symbol as u8);
        self.state = self.state.after_literal();
    }

    fn decode_match(&mut self, rc: &mut RangeReader, pos_state: usize) {
        self.state = self.state.after_match();
        self.rep3 = self.rep2;
        self.rep2 = self.rep1;
        self.rep1 = self.rep0;
        self.len = self.match_len.decode(rc, pos_state);

        let dist_state = (self.len - MATCH_LEN_MIN).min(DIST_STATES as u32 - 1) as usize;
        let dist_slot = rc.bittree(&mut self.dist_slot[dist_state], DIST_SLOTS) - DIST_SLOTS;

        if dist_slot < DIST_MODEL_START {
            self.rep0 = dist_slot;
            return;
        }

        let limit = (dist_slot >> 1) - 1;
        self.rep0 = 2 + (dist_slot & 1);
        if dist_slot < DIST_MODEL_END {
            self.rep0 <<= limit;
            let base = (self.rep0 - dist_slot) as usize;
            rc.bittree_reverse(&mut self.dist_special[base..], &mut self.rep0, limit);
        } else {
            rc.direct(&mut self.rep0, limit - ALIGN_BITS);
            self.rep0 <<= ALIGN_BITS;
            rc.bittree_reverse(&mut self.dist_align, &mut self.rep0, ALIGN_BITS);
        }
    }

    fn decode_rep_match(&mut self, rc: &mut RangeReader, pos_state: usize) {
        let state = self.state.index();

        if !rc.bit(&mut self.is_rep0[state]) {
            if !rc.bit(&mut self.is_rep0_long[state][pos_state]) {
                self.state = self.state.after_short_rep();
                self.len = 1;
                return;
            }
        } else {
            let distance = if !rc.bit(&mut self.is_rep1[state]) {
                self.rep1
            } else {
                let distance = if !rc.bit(&mut self.is_rep2[state]) {
                    self.rep2
                } else {
                    let d = self.rep3;
                    self.rep3 = self.rep2;
                    d
                };
                self.rep2 = self.rep1;
                distance
            };
            self.rep1 = self.rep0;
            self.rep0 = distance;
        }

        self.state = self.state.after_long_rep();
        self.len = self.rep_len.decode(rc, pos_state);
    }
}
