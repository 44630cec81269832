// Emoticon display state and the fixed 8x8x3 bitmaps shown by the firmware

/// Icons known to the display firmware
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emoticon {
    Idle = 0,
    Connected = 1,
    Happy = 2,
    Angry = 3,
}

impl Emoticon {
    /// Map a raw id back to an icon
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Emoticon::Idle),
            1 => Some(Emoticon::Connected),
            2 => Some(Emoticon::Happy),
            3 => Some(Emoticon::Angry),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Baseline icons follow the connection; the others time out
    pub fn is_baseline(self) -> bool {
        matches!(self, Emoticon::Idle | Emoticon::Connected)
    }

    /// 24 bytes of bitmap: 8 rows, 3 colour planes per row
    pub fn bitmap(self) -> &'static [u8; BITMAP_LEN] {
        &BITMAPS[self as usize]
    }
}

pub const BITMAP_LEN: usize = 24;

static BITMAPS: [[u8; BITMAP_LEN]; 4] = [
    // Idle: small dot
    [
        0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, //
        0x00, 0x18, 0x00, //
        0x00, 0x18, 0x00, //
        0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, //
    ],
    // Connected: white square
    [
        0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, //
        0x3c, 0x3c, 0x3c, //
        0x24, 0x24, 0x24, //
        0x24, 0x24, 0x24, //
        0x3c, 0x3c, 0x3c, //
        0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, //
    ],
    // Happy: smile
    [
        0x00, 0x00, 0x00, //
        0x00, 0xe7, 0x00, //
        0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, //
        0x00, 0x81, 0x00, //
        0x00, 0x42, 0x00, //
        0x00, 0x3c, 0x00, //
        0x00, 0x00, 0x00, //
    ],
    // Angry: frown with slanted brows
    [
        0x00, 0x00, 0x00, //
        0x42, 0x00, 0x00, //
        0x24, 0x00, 0x00, //
        0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, //
        0x3c, 0x00, 0x00, //
        0x42, 0x00, 0x00, //
        0x00, 0x00, 0x00, //
    ],
];

/// Active icon plus countdown before a temporary icon reverts
#[derive(Debug, Clone)]
pub struct EmoticonState {
    icon: Emoticon,
    countdown: u32,
    timeout: u32,
}

impl EmoticonState {
    pub fn new(timeout: u32) -> Self {
        Self {
            icon: Emoticon::Idle,
            countdown: 0,
            timeout,
        }
    }

    pub fn icon(&self) -> Emoticon {
        self.icon
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    /// Follow the connection status; the countdown is left alone
    pub fn set_connected(&mut self, connected: bool) {
        self.icon = if connected {
            Emoticon::Connected
        } else {
            Emoticon::Idle
        };
    }

    /// Show an icon, arming the countdown for temporary ones
    pub fn show(&mut self, icon: Emoticon) {
        self.icon = icon;
        if !icon.is_baseline() {
            self.countdown = self.timeout;
        }
    }

    /// Scan text for `:)` / `:(`, show the last one found and blank the markers
    pub fn apply_text(&mut self, text: &str) -> String {
        let (found, stripped) = strip_markers(text);
        if let Some(icon) = found {
            self.show(icon);
        }
        stripped
    }

    /// Count down one tick
    pub fn tick(&mut self) {
        if self.countdown == 0 {
            return;
        }
        self.countdown -= 1;
        if self.countdown == 0 && !self.icon.is_baseline() {
            self.icon = Emoticon::Connected;
        }
    }
}

/// Replace every emoticon marker with two spaces, returning the last icon seen
pub fn strip_markers(text: &str) -> (Option<Emoticon>, String) {
    let mut found = None;
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == ':' {
            let icon = match chars.peek() {
                Some(')') => Some(Emoticon::Happy),
                Some('(') => Some(Emoticon::Angry),
                _ => None,
            };
            if let Some(icon) = icon {
                chars.next();
                found = Some(icon);
                out.push_str("  ");
                continue;
            }
        }
        out.push(c);
    }

    (found, out)
}
