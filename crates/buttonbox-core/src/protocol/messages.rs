//! All ButtonBox wire message types.
//!
//! A [`Command`] is one discrete user-triggered control action: a key tap,
//! the start or end of a press-and-hold, an analog axis value, or the
//! invocation of a named macro on the receiver.  Commands are immutable,
//! constructed fresh per interaction, and have no identity beyond their
//! content.
//!
//! [`WireMessage`] is the full set of payloads that can appear in a
//! datagram: every `Command` kind, the `Ping`/`Pong` pair used by the
//! connection monitor, and the `Discover`/`Announce` pair used for LAN
//! peer discovery.  Each kind has its own message type byte so a
//! receiver can skip datagrams whose kind it does not recognise, which is
//! how new Command kinds are added without breaking older receivers.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Total size of the common message header in bytes.
pub const HEADER_SIZE: usize = 24;

// ── Message type codes ────────────────────────────────────────────────────────

/// All message type codes on the wire.
///
/// Link-health and discovery messages live in the low range; command kinds
/// start at 0x40. Type bytes are never reused once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Link health and discovery (0x00–0x3F)
    Ping = 0x07,
    Pong = 0x08,
    Discover = 0x09,
    Announce = 0x0A,
    // Commands (0x40–0x7F)
    KeyEvent = 0x40,
    HoldStart = 0x41,
    HoldStop = 0x42,
    Axis = 0x43,
    MacroInvoke = 0x44,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x07 => Ok(MessageType::Ping),
            0x08 => Ok(MessageType::Pong),
            0x09 => Ok(MessageType::Discover),
            0x0A => Ok(MessageType::Announce),
            0x40 => Ok(MessageType::KeyEvent),
            0x41 => Ok(MessageType::HoldStart),
            0x42 => Ok(MessageType::HoldStop),
            0x43 => Ok(MessageType::Axis),
            0x44 => Ok(MessageType::MacroInvoke),
            _ => Err(()),
        }
    }
}

// ── Modifier flags ────────────────────────────────────────────────────────────

/// Modifier key bitmask attached to key events.
///
/// Bit layout:
/// - Bit 0: Left Ctrl
/// - Bit 1: Right Ctrl
/// - Bit 2: Left Shift
/// - Bit 3: Right Shift
/// - Bit 4: Left Alt
/// - Bit 5: Right Alt
/// - Bit 6: Left Meta (Windows/Command/Super)
/// - Bit 7: Right Meta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModifierFlags(pub u8);

impl ModifierFlags {
    pub const LEFT_CTRL: u8 = 1 << 0;
    pub const RIGHT_CTRL: u8 = 1 << 1;
    pub const LEFT_SHIFT: u8 = 1 << 2;
    pub const RIGHT_SHIFT: u8 = 1 << 3;
    pub const LEFT_ALT: u8 = 1 << 4;
    pub const RIGHT_ALT: u8 = 1 << 5;
    pub const LEFT_META: u8 = 1 << 6;
    pub const RIGHT_META: u8 = 1 << 7;

    /// Returns `true` if either Ctrl modifier is active.
    pub fn ctrl(&self) -> bool {
        self.0 & (Self::LEFT_CTRL | Self::RIGHT_CTRL) != 0
    }

    /// Returns `true` if either Shift modifier is active.
    pub fn shift(&self) -> bool {
        self.0 & (Self::LEFT_SHIFT | Self::RIGHT_SHIFT) != 0
    }

    /// Returns `true` if either Alt modifier is active.
    pub fn alt(&self) -> bool {
        self.0 & (Self::LEFT_ALT | Self::RIGHT_ALT) != 0
    }

    /// Returns `true` if either Meta (Win/Cmd/Super) modifier is active.
    pub fn meta(&self) -> bool {
        self.0 & (Self::LEFT_META | Self::RIGHT_META) != 0
    }
}

// ── Press kind ────────────────────────────────────────────────────────────────

/// How a key event is performed: a single tap, or a press held for a fixed
/// duration driven by the receiver.
///
/// Open-ended holds (button pressed until released) use the separate
/// [`Command::HoldStart`] / [`Command::HoldStop`] bracket instead, because a
/// momentary button does not know its duration up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PressKind {
    /// Press and release immediately.
    Tap,
    /// Press, wait `duration_ms`, then release.
    Hold { duration_ms: u32 },
}

// ── Command model ─────────────────────────────────────────────────────────────

/// One discrete user-triggered control action to be sent to the paired
/// machine.
///
/// Key names are the lower-case identifiers the receiver's input simulator
/// understands (e.g. `"w"`, `"space"`, `"f5"`).  Commands carry no
/// per-packet identity; deduplication and ordering across the network are
/// explicitly not provided (UDP semantics, accepted by design).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// A keyboard action: tap, or hold for a fixed duration.
    KeyEvent {
        key: String,
        modifiers: ModifierFlags,
        press: PressKind,
    },
    /// Begin an open-ended press (momentary button went down).
    HoldStart { key: String, modifiers: ModifierFlags },
    /// End an open-ended press (momentary button released).
    HoldStop { key: String },
    /// An analog axis value, full-scale signed.
    Axis { axis: u8, value: i16 },
    /// Invoke a macro stored on the receiver by its identifier
    /// (e.g. `"Flight.Boost"`).
    MacroInvoke { macro_id: String },
}

impl Command {
    /// A short stable label for logging and outcome reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::KeyEvent { .. } => "key_event",
            Command::HoldStart { .. } => "hold_start",
            Command::HoldStop { .. } => "hold_stop",
            Command::Axis { .. } => "axis",
            Command::MacroInvoke { .. } => "macro_invoke",
        }
    }
}

// ── Top-level wire enum ───────────────────────────────────────────────────────

/// Everything that can appear as a datagram payload, discriminated by type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireMessage {
    /// A user control action.
    Command(Command),
    /// Health-check probe carrying an opaque token the receiver echoes back.
    Ping(u64),
    /// Health-check reply echoing the probe's token.
    Pong(u64),
    /// Broadcast probe asking receivers on the LAN to announce themselves.
    /// The token is opaque; receivers do not echo it.
    Discover(u64),
    /// A receiver's reply to `Discover`: its human-readable name and the
    /// UDP port commands should be sent to.  The host is taken from the
    /// datagram's source address, so it is never carried in the payload.
    Announce { name: String, command_port: u16 },
}

impl WireMessage {
    /// Returns the [`MessageType`] discriminant for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            WireMessage::Ping(_) => MessageType::Ping,
            WireMessage::Pong(_) => MessageType::Pong,
            WireMessage::Discover(_) => MessageType::Discover,
            WireMessage::Announce { .. } => MessageType::Announce,
            WireMessage::Command(Command::KeyEvent { .. }) => MessageType::KeyEvent,
            WireMessage::Command(Command::HoldStart { .. }) => MessageType::HoldStart,
            WireMessage::Command(Command::HoldStop { .. }) => MessageType::HoldStop,
            WireMessage::Command(Command::Axis { .. }) => MessageType::Axis,
            WireMessage::Command(Command::MacroInvoke { .. }) => MessageType::MacroInvoke,
        }
    }
}

impl From<Command> for WireMessage {
    fn from(cmd: Command) -> Self {
        WireMessage::Command(cmd)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
