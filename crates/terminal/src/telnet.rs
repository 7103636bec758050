//! Minimal telnet command filtering.
//!
//! Clients speak telnet, so the raw byte stream interleaves user input with
//! `IAC` command sequences. The filter strips those sequences, answers nothing
//! on its own, and surfaces window-size reports (NAWS) so prompts can size
//! screen clears to the client's terminal.

/// Interpret-as-command escape byte.
pub const IAC: u8 = 255;
/// Refuse to perform an option.
pub const DONT: u8 = 254;
/// Request the peer to perform an option.
pub const DO: u8 = 253;
/// Refuse to perform an option locally.
pub const WONT: u8 = 252;
/// Offer to perform an option locally.
pub const WILL: u8 = 251;
/// Subnegotiation begin.
pub const SB: u8 = 250;
/// Subnegotiation end.
pub const SE: u8 = 240;

/// Echo option.
pub const OPT_ECHO: u8 = 1;
/// Suppress go-ahead option (character-at-a-time mode).
pub const OPT_SGA: u8 = 3;
/// Negotiate about window size.
pub const OPT_NAWS: u8 = 31;

/// Longest subnegotiation payload kept; anything beyond is discarded.
const MAX_SUBNEGOTIATION: usize = 64;

/// Bytes the server sends on connect: it echoes input itself, runs in
/// character mode, and asks for window size reports.
pub fn server_greeting() -> [u8; 9] {
    [
        IAC, WILL, OPT_ECHO, //
        IAC, WILL, OPT_SGA, //
        IAC, DO, OPT_NAWS,
    ]
}

/// Output of the filter for a single input byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelnetEvent {
    /// A byte of user data.
    Data(u8),
    /// The client reported its terminal size.
    WindowSize {
        /// Terminal width in columns.
        columns: u16,
        /// Terminal height in rows.
        rows: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Data,
    Command,
    Option,
    Subnegotiation,
    SubnegotiationCommand,
}

/// Byte-at-a-time telnet command filter.
#[derive(Debug)]
pub struct TelnetFilter {
    state: State,
    subnegotiation: Vec<u8>,
}

impl TelnetFilter {
    /// Creates a filter in the plain data state.
    pub fn new() -> Self {
        Self {
            state: State::Data,
            subnegotiation: Vec::with_capacity(MAX_SUBNEGOTIATION),
        }
    }

    /// Feeds one byte, returning an event when the byte completes one.
    pub fn feed(&mut self, byte: u8) -> Option<TelnetEvent> {
        match self.state {
            State::Data => {
                if byte == IAC {
                    self.state = State::Command;
                    None
                } else {
                    Some(TelnetEvent::Data(byte))
                }
            }
            State::Command => match byte {
                IAC => {
                    self.state = State::Data;
                    Some(TelnetEvent::Data(IAC))
                }
                WILL | WONT | DO | DONT => {
                    self.state = State::Option;
                    None
                }
                SB => {
                    self.subnegotiation.clear();
                    self.state = State::Subnegotiation;
                    None
                }
                _ => {
                    self.state = State::Data;
                    None
                }
            },
            State::Option => {
                self.state = State::Data;
                None
            }
            State::Subnegotiation => {
                if byte == IAC {
                    self.state = State::SubnegotiationCommand;
                } else {
                    self.push_subnegotiation(byte);
                }
                None
            }
            State::SubnegotiationCommand => match byte {
                SE => {
                    self.state = State::Data;
                    self.finish_subnegotiation()
                }
                IAC => {
                    self.push_subnegotiation(IAC);
                    self.state = State::Subnegotiation;
                    None
                }
                _ => {
                    self.state = State::Subnegotiation;
                    None
                }
            },
        }
    }

    fn push_subnegotiation(&mut self, byte: u8) {
        if self.subnegotiation.len() < MAX_SUBNEGOTIATION {
            self.subnegotiation.push(byte);
        }
    }

    fn finish_subnegotiation(&mut self) -> Option<TelnetEvent> {
        match self.subnegotiation.as_slice() {
            [OPT_NAWS, w_hi, w_lo, h_hi, h_lo, ..] => {
                let columns = u16::from_be_bytes([*w_hi, *w_lo]);
                let rows = u16::from_be_bytes([*h_hi, *h_lo]);
                if columns == 0 || rows == 0 {
                    tracing::debug!(columns, rows, "Ignoring empty window size report");
                    return None;
                }
                Some(TelnetEvent::WindowSize { columns, rows })
            }
            _ => None,
        }
    }
}

impl Default for TelnetFilter {
    fn default() -> Self {
        Self::new()
    }
}
