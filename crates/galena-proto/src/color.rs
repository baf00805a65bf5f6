//! The 16-color console text palette.

/// Palette index of a text fragment, matching the server console colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    Grey = 7,
    DarkGrey = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    LightMagenta = 13,
    Yellow = 14,
    White = 15,
}

impl Color {
    /// Converts a raw palette index, if it is in [0, 15].
    pub fn from_i32(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Black),
            1 => Some(Self::Blue),
            2 => Some(Self::Green),
            3 => Some(Self::Cyan),
            4 => Some(Self::Red),
            5 => Some(Self::Magenta),
            6 => Some(Self::Brown),
            7 => Some(Self::Grey),
            8 => Some(Self::DarkGrey),
            9 => Some(Self::LightBlue),
            10 => Some(Self::LightGreen),
            11 => Some(Self::LightCyan),
            12 => Some(Self::LightRed),
            13 => Some(Self::LightMagenta),
            14 => Some(Self::Yellow),
            15 => Some(Self::White),
            _ => None,
        }
    }

    /// Returns the raw palette index.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl Default for Color {
    /// The console default foreground color.
    fn default() -> Self {
        Self::Grey
    }
}
