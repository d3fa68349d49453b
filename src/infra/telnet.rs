//! Minimal telnet option handling: character mode, window size (NAWS), key input.

use crate::infra::KeyDecoder;
use crossterm::event::KeyEvent;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

const OPT_ECHO: u8 = 1;
const OPT_SUPPRESS_GO_AHEAD: u8 = 3;
const OPT_NAWS: u8 = 31;

const MAX_SUBNEGOTIATION_LEN: usize = 64;

/// Window size reports are clamped to this many columns and rows.
pub const MAX_TERMINAL_WIDTH: u16 = 500;
pub const MAX_TERMINAL_HEIGHT: u16 = 200;

/// Sent once on accept: the server echoes, suppresses go-ahead, and asks for window size.
pub const NEGOTIATION_PREAMBLE: [u8; 9] = [
    IAC,
    WILL,
    OPT_ECHO,
    IAC,
    WILL,
    OPT_SUPPRESS_GO_AHEAD,
    IAC,
    DO,
    OPT_NAWS,
];

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransportEvent {
    Key(KeyEvent),
    Resize { width: u16, height: u16 },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Data,
    Command,
    Option,
    Subnegotiation,
    SubnegotiationCommand,
}

#[derive(Debug)]
pub struct TelnetDecoder {
    state: State,
    subnegotiation: Vec<u8>,
    keys: KeyDecoder,
}

impl Default for TelnetDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelnetDecoder {
    pub fn new() -> Self {
        Self {
            state: State::Data,
            subnegotiation: Vec::new(),
            keys: KeyDecoder::new(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        let mut data = Vec::with_capacity(bytes.len());

        for &byte in bytes {
            match self.state {
                State::Data => {
                    if byte == IAC {
                        self.state = State::Command;
                    } else {
                        data.push(byte);
                    }
                }
                State::Command => {
                    self.state = match byte {
                        IAC => {
                            data.push(IAC);
                            State::Data
                        }
                        WILL | WONT | DO | DONT => State::Option,
                        SB => {
                            self.subnegotiation.clear();
                            State::Subnegotiation
                        }
                        _ => State::Data,
                    };
                }
                State::Option => {
                    self.state = State::Data;
                }
                State::Subnegotiation => {
                    if byte == IAC {
                        self.state = State::SubnegotiationCommand;
                    } else if self.subnegotiation.len() < MAX_SUBNEGOTIATION_LEN {
                        self.subnegotiation.push(byte);
                    }
                }
                State::SubnegotiationCommand => match byte {
                    SE => {
                        // Key bytes seen before the window-size report keep their order.
                        self.flush_keys(&mut data, &mut events);
                        if let Some(event) = parse_subnegotiation(&self.subnegotiation) {
                            events.push(event);
                        }
                        self.subnegotiation.clear();
                        self.state = State::Data;
                    }
                    IAC => {
                        if self.subnegotiation.len() < MAX_SUBNEGOTIATION_LEN {
                            self.subnegotiation.push(IAC);
                        }
                        self.state = State::Subnegotiation;
                    }
                    _ => {
                        self.subnegotiation.clear();
                        self.state = State::Data;
                    }
                },
            }
        }

        self.flush_keys(&mut data, &mut events);
        events
    }

    fn flush_keys(&mut self, data: &mut Vec<u8>, events: &mut Vec<TransportEvent>) {
        if data.is_empty() {
            return;
        }
        events.extend(self.keys.feed(data).into_iter().map(TransportEvent::Key));
        data.clear();
    }
}

fn parse_subnegotiation(payload: &[u8]) -> Option<TransportEvent> {
    let (&option, rest) = payload.split_first()?;
    if option != OPT_NAWS || rest.len() < 4 {
        return None;
    }
    let width = u16::from_be_bytes([rest[0], rest[1]]);
    let height = u16::from_be_bytes([rest[2], rest[3]]);
    if width == 0 || height == 0 {
        return None;
    }
    Some(TransportEvent::Resize {
        width: width.min(MAX_TERMINAL_WIDTH),
        height: height.min(MAX_TERMINAL_HEIGHT),
    })
}
