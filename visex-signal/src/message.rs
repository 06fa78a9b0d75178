//! Byte protocol sent by the optical imaging acquisition system.
//!
//! Bit 7 is the GO bit, set while the imager is acquiring. Bits 0-6 carry a
//! stimulus id. Id 0 is the blank stimulus, so the imager can announce a real
//! stimulus (ids 1-127, mapping to condition indices 0-126) before raising GO.

use serde::{Deserialize, Serialize};
use visex_core::DigitalSample;

use crate::io::DigitalInput;

/// One byte of the imaging protocol with named fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImagingMessage(u8);

impl ImagingMessage {
    pub const GO_BIT: u8 = 0x80;
    pub const ID_MASK: u8 = 0x7F;

    /// Builds a message; `None` if `stimulus_id` does not fit in 7 bits.
    pub fn new(go: bool, stimulus_id: u8) -> Option<Self> {
        if stimulus_id > Self::ID_MASK {
            return None;
        }
        let go = if go { Self::GO_BIT } else { 0 };
        Some(Self(go | stimulus_id))
    }

    /// Message announcing condition `index` (zero-based).
    pub fn for_condition(go: bool, index: usize) -> Option<Self> {
        u8::try_from(index + 1).ok().and_then(|id| Self::new(go, id))
    }

    pub fn go(self) -> bool {
        self.0 & Self::GO_BIT != 0
    }

    pub fn stimulus_id(self) -> u8 {
        self.0 & Self::ID_MASK
    }

    pub fn is_blank(self) -> bool {
        self.stimulus_id() == 0
    }

    /// Zero-based condition index, `None` for the blank stimulus.
    pub fn condition(self) -> Option<usize> {
        self.stimulus_id().checked_sub(1).map(usize::from)
    }

    pub fn byte(self) -> u8 {
        self.0
    }
}

impl From<u8> for ImagingMessage {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<ImagingMessage> for u8 {
    fn from(msg: ImagingMessage) -> Self {
        msg.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecodedMessage {
    pub start: bool,
    pub go: bool,
    /// `None` means blank / no valid condition
    pub condition: Option<usize>,
}

impl DecodedMessage {
    pub const BLANK: DecodedMessage = DecodedMessage {
        start: false,
        go: false,
        condition: None,
    };

    /// Condition index with `-1` standing in for blank.
    pub fn condition_index(&self) -> i64 {
        self.condition.map_or(-1, |c| c as i64)
    }
}

/// Decodes one input byte. Ids beyond the defined conditions decode to
/// [`DecodedMessage::BLANK`], clearing GO as well.
pub fn decode(value: u8, n_conditions: usize) -> DecodedMessage {
    let msg = ImagingMessage::from(value);
    match msg.condition() {
        Some(c) if c >= n_conditions => DecodedMessage::BLANK,
        condition => DecodedMessage {
            start: !msg.is_blank(),
            go: msg.go(),
            condition,
        },
    }
}

/// Tracks the decoded state of one input channel across ticks
#[derive(Debug, Clone)]
pub struct MessageDecoder {
    pub channel: usize,
    pub n_conditions: usize,
    current: DecodedMessage,
    last_sample: Option<DigitalSample>,
}

impl MessageDecoder {
    pub fn new(channel: usize, n_conditions: usize) -> Self {
        Self {
            channel,
            n_conditions,
            current: DecodedMessage::default(),
            last_sample: None,
        }
    }

    /// Applies the newest sample, if any. Without a new sample the previous
    /// decoded state is kept.
    pub fn apply(&mut self, sample: Option<DigitalSample>) -> DecodedMessage {
        if let Some(s) = sample {
            self.current = decode(s.value, self.n_conditions);
            self.last_sample = Some(s);
        }
        self.current
    }

    pub fn poll<I: DigitalInput + ?Sized>(&mut self, input: &mut I) -> DecodedMessage {
        let sample = input.latest(self.channel);
        self.apply(sample)
    }

    pub fn current(&self) -> DecodedMessage {
        self.current
    }

    pub fn last_sample(&self) -> Option<DigitalSample> {
        self.last_sample
    }

    pub fn reset(&mut self) {
        self.current = DecodedMessage::default();
        self.last_sample = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ScriptedInput;

    fn msg(start: bool, go: bool, condition: Option<usize>) -> DecodedMessage {
        DecodedMessage {
            start,
            go,
            condition,
        }
    }

    #[test]
    fn documented_bytes() {
        assert_eq!(decode(128, 10), msg(false, true, None));
        assert_eq!(decode(1, 10), msg(true, false, Some(0)));
        assert_eq!(decode(129, 10), msg(true, true, Some(0)));
        assert_eq!(decode(0, 10), DecodedMessage::BLANK);
        assert_eq!(decode(128, 10).condition_index(), -1);
    }

    #[test]
    fn decode_is_total_and_matches_bitfield() {
        let n = 20;
        for b in 0..=255u8 {
            let d = decode(b, n);
            assert_eq!(d, decode(b, n));
            let id = (b & 0x7F) as i64;
            if id - 1 >= n as i64 {
                assert_eq!(d, DecodedMessage::BLANK, "byte {b}");
            } else {
                assert_eq!(d.go, b > 127);
                assert_eq!(d.start, id > 0);
                assert_eq!(d.condition_index(), id - 1);
            }
        }
    }

    #[test]
    fn out_of_design_condition_is_blank() {
        // id 4 -> condition 3, only 3 conditions defined
        assert_eq!(decode(128 | 4, 3), DecodedMessage::BLANK);
        assert_eq!(decode(4, 3), DecodedMessage::BLANK);
        assert_eq!(decode(3, 3), msg(true, false, Some(2)));
        assert_eq!(decode(255, 0), DecodedMessage::BLANK);
    }

    #[test]
    fn message_fields() {
        let m = ImagingMessage::for_condition(true, 4).unwrap();
        assert_eq!(m.byte(), 0x80 | 5);
        assert!(m.go());
        assert_eq!(m.condition(), Some(4));
        assert_eq!(ImagingMessage::new(false, 128), None);
        assert_eq!(ImagingMessage::for_condition(false, 127), None);
        assert!(ImagingMessage::from(0x80).is_blank());
    }

    #[test]
    fn decoder_keeps_state_without_new_samples() {
        let src = ScriptedInput::new();
        let mut input = src.clone();
        let mut decoder = MessageDecoder::new(2, 8);

        assert_eq!(decoder.poll(&mut input), DecodedMessage::default());

        src.push(2, DigitalSample::new(10.0, 3));
        src.push(2, DigitalSample::new(11.0, 128 | 3));
        assert_eq!(decoder.poll(&mut input), msg(true, true, Some(2)));

        // nothing new: no forced blank
        assert_eq!(decoder.poll(&mut input), msg(true, true, Some(2)));
        assert_eq!(decoder.last_sample().map(|s| s.timestamp_ms), Some(11.0));

        src.push(2, DigitalSample::new(20.0, 0));
        assert_eq!(decoder.poll(&mut input), DecodedMessage::BLANK);
    }
}
