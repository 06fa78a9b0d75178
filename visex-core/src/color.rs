use serde::{Deserialize, Serialize};

/// Primary display channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    R,
    G,
    B,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::R, Channel::G, Channel::B];

    pub fn name(&self) -> &'static str {
        match self {
            Channel::R => "R",
            Channel::G => "G",
            Channel::B => "B",
        }
    }
}

/// Stimulus color with components in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    #[serde(default = "opaque")]
    pub a: f64,
}

fn opaque() -> f64 {
    1.0
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn component(&self, channel: Channel) -> f64 {
        match channel {
            Channel::R => self.r,
            Channel::G => self.g,
            Channel::B => self.b,
        }
    }

    /// The drive level on `channel` if this color isolates it, i.e. the other two
    /// primaries are zero. Black isolates every channel.
    pub fn isolated(&self, channel: Channel) -> Option<f64> {
        let others_dark = Channel::ALL
            .iter()
            .filter(|c| **c != channel)
            .all(|c| self.component(*c) == 0.0);
        others_dark.then(|| self.component(channel))
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primaries_isolate_their_channel_only() {
        let red = Color::rgb(0.5, 0.0, 0.0);
        assert_eq!(red.isolated(Channel::R), Some(0.5));
        assert_eq!(red.isolated(Channel::G), None);
        assert_eq!(red.isolated(Channel::B), None);
    }

    #[test]
    fn black_belongs_to_every_channel() {
        for c in Channel::ALL {
            assert_eq!(Color::BLACK.isolated(c), Some(0.0));
        }
    }

    #[test]
    fn mixed_colors_isolate_nothing() {
        let white = Color::rgb(1.0, 1.0, 1.0);
        assert!(Channel::ALL.iter().all(|c| white.isolated(*c).is_none()));
    }
}
