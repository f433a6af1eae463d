use crate::wire::codec::{DecodeError, Decoder, Encoder};
use crate::PROTOCOL_MAGIC;

/// Entity kind byte carried in snapshot frames.
pub const KIND_PLAYER: u8 = 1;
pub const KIND_ENEMY: u8 = 2;
pub const KIND_PROJECTILE: u8 = 3;
pub const KIND_POWERUP: u8 = 4;
pub const KIND_BOSS: u8 = 5;
pub const KIND_EXPLOSION: u8 = 6;

/// Snapshot flag bits.
pub const FLAG_DAMAGE_FLASH: u8 = 0x01;
pub const FLAG_ENEMY_OWNED: u8 = 0x02;

/// Wire opcodes. The values are the protocol; they never change meaning.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Login = 0x01,
    LoginAck = 0x02,
    Disconnect = 0x03,
    Ready = 0x04,
    LobbyStatus = 0x05,
    StartGame = 0x06,
    GameOver = 0x07,
    Input = 0x10,
    PowerUpSelection = 0x11,
    PowerUpChoice = 0x12,
    EntityPositions = 0x13,
    LevelProgress = 0x14,
    LevelStart = 0x15,
    LevelComplete = 0x16,
    PowerUpStatus = 0x17,
    PowerUpActivate = 0x18,
    AdminLogin = 0x20,
    AdminLoginAck = 0x21,
    AdminCommand = 0x22,
    AdminResponse = 0x23,
    Ack = 0xF0,
}

impl OpCode {
    pub fn from_u8(value: u8) -> Result<OpCode, DecodeError> {
        Ok(match value {
            0x01 => OpCode::Login,
            0x02 => OpCode::LoginAck,
            0x03 => OpCode::Disconnect,
            0x04 => OpCode::Ready,
            0x05 => OpCode::LobbyStatus,
            0x06 => OpCode::StartGame,
            0x07 => OpCode::GameOver,
            0x10 => OpCode::Input,
            0x11 => OpCode::PowerUpSelection,
            0x12 => OpCode::PowerUpChoice,
            0x13 => OpCode::EntityPositions,
            0x14 => OpCode::LevelProgress,
            0x15 => OpCode::LevelStart,
            0x16 => OpCode::LevelComplete,
            0x17 => OpCode::PowerUpStatus,
            0x18 => OpCode::PowerUpActivate,
            0x20 => OpCode::AdminLogin,
            0x21 => OpCode::AdminLoginAck,
            0x22 => OpCode::AdminCommand,
            0x23 => OpCode::AdminResponse,
            0xF0 => OpCode::Ack,
            other => return Err(DecodeError::UnknownOpcode(other)),
        })
    }

    /// Reliable frames carry a sequence id and are retransmitted until
    /// acknowledged. High-frequency traffic (inputs, snapshots), the admin
    /// request/response flow, and ACKs themselves bypass sequencing.
    pub fn is_reliable(self) -> bool {
        match self {
            OpCode::Input
            | OpCode::EntityPositions
            | OpCode::AdminLogin
            | OpCode::AdminLoginAck
            | OpCode::AdminCommand
            | OpCode::AdminResponse
            | OpCode::Ack => false,
            _ => true,
        }
    }
}

/// Input bits as sent by clients. Stable wire values.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
#[repr(transparent)]
pub struct InputMask(pub u8);

impl InputMask {
    pub const UP: u8 = 0x01;
    pub const DOWN: u8 = 0x02;
    pub const LEFT: u8 = 0x04;
    pub const RIGHT: u8 = 0x08;
    pub const SHOOT: u8 = 0x10;
    pub const ACTIVATE: u8 = 0x20;

    #[inline]
    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    #[inline]
    pub fn up(self) -> bool {
        self.contains(Self::UP)
    }

    #[inline]
    pub fn down(self) -> bool {
        self.contains(Self::DOWN)
    }

    #[inline]
    pub fn left(self) -> bool {
        self.contains(Self::LEFT)
    }

    #[inline]
    pub fn right(self) -> bool {
        self.contains(Self::RIGHT)
    }

    #[inline]
    pub fn shoot(self) -> bool {
        self.contains(Self::SHOOT)
    }

    #[inline]
    pub fn activate(self) -> bool {
        self.contains(Self::ACTIVATE)
    }
}

/// One entity record inside an `EntityPositions` snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityState {
    pub id: u32,
    pub kind: u8,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub hp: i32,
    pub max_hp: i32,
    pub flags: u8,
}

/// Header of a decoded frame: the opcode plus the sequence id when the
/// opcode is reliable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub opcode: OpCode,
    pub seq: Option<u32>,
}

/// Typed view of every frame the protocol knows about.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Login { player_name: String },
    LoginAck { network_id: u32 },
    Disconnect,
    Ready { flag: bool },
    LobbyStatus { total: u8, ready: u8 },
    StartGame,
    GameOver,
    Input { mask: InputMask, client_timestamp: u32 },
    PowerUpSelection,
    PowerUpChoice { choice: u8 },
    EntityPositions { entities: Vec<EntityState> },
    LevelProgress { level: u32, kills: u32, kills_needed: u32 },
    LevelStart { level: u32 },
    LevelComplete { completed: u32, next: u32 },
    PowerUpStatus { player_id: u32, kind: u8, time_remaining: f32 },
    PowerUpActivate,
    AdminLogin { password: String },
    AdminLoginAck { result: String },
    AdminCommand { command: String },
    AdminResponse { body: String },
    Ack { acked_seq: u32 },
}

impl Message {
    pub fn opcode(&self) -> OpCode {
        match self {
            Message::Login { .. } => OpCode::Login,
            Message::LoginAck { .. } => OpCode::LoginAck,
            Message::Disconnect => OpCode::Disconnect,
            Message::Ready { .. } => OpCode::Ready,
            Message::LobbyStatus { .. } => OpCode::LobbyStatus,
            Message::StartGame => OpCode::StartGame,
            Message::GameOver => OpCode::GameOver,
            Message::Input { .. } => OpCode::Input,
            Message::PowerUpSelection => OpCode::PowerUpSelection,
            Message::PowerUpChoice { .. } => OpCode::PowerUpChoice,
            Message::EntityPositions { .. } => OpCode::EntityPositions,
            Message::LevelProgress { .. } => OpCode::LevelProgress,
            Message::LevelStart { .. } => OpCode::LevelStart,
            Message::LevelComplete { .. } => OpCode::LevelComplete,
            Message::PowerUpStatus { .. } => OpCode::PowerUpStatus,
            Message::PowerUpActivate => OpCode::PowerUpActivate,
            Message::AdminLogin { .. } => OpCode::AdminLogin,
            Message::AdminLoginAck { .. } => OpCode::AdminLoginAck,
            Message::AdminCommand { .. } => OpCode::AdminCommand,
            Message::AdminResponse { .. } => OpCode::AdminResponse,
            Message::Ack { .. } => OpCode::Ack,
        }
    }

    /// Frames an unreliable message. Must not be called for sequenced opcodes.
    pub fn encode_unreliable(&self) -> Vec<u8> {
        debug_assert!(!self.opcode().is_reliable());
        self.encode_frame(None)
    }

    /// Frames a reliable message with its sequence id.
    pub fn encode_reliable(&self, seq: u32) -> Vec<u8> {
        debug_assert!(self.opcode().is_reliable());
        self.encode_frame(Some(seq))
    }

    fn encode_frame(&self, seq: Option<u32>) -> Vec<u8> {
        let mut enc = Encoder::with_capacity(16);
        enc.write_u16(PROTOCOL_MAGIC);
        enc.write_u8(self.opcode() as u8);
        if let Some(seq) = seq {
            enc.write_u32(seq);
        }
        self.write_payload(&mut enc);
        enc.into_bytes()
    }

    fn write_payload(&self, enc: &mut Encoder) {
        match self {
            Message::Login { player_name } => enc.write_string(player_name),
            Message::LoginAck { network_id } => enc.write_u32(*network_id),
            Message::Disconnect => {}
            Message::Ready { flag } => enc.write_bool(*flag),
            Message::LobbyStatus { total, ready } => {
                enc.write_u8(*total);
                enc.write_u8(*ready);
            }
            Message::StartGame => {}
            Message::GameOver => {}
            Message::Input {
                mask,
                client_timestamp,
            } => {
                enc.write_u8(mask.0);
                enc.write_u32(*client_timestamp);
            }
            Message::PowerUpSelection => {}
            Message::PowerUpChoice { choice } => enc.write_u8(*choice),
            Message::EntityPositions { entities } => {
                enc.write_u8(entities.len() as u8);
                for ent in entities {
                    enc.write_u32(ent.id);
                    enc.write_u8(ent.kind);
                    enc.write_f32(ent.x);
                    enc.write_f32(ent.y);
                    enc.write_f32(ent.vx);
                    enc.write_f32(ent.vy);
                    enc.write_i32(ent.hp);
                    enc.write_i32(ent.max_hp);
                    enc.write_u8(ent.flags);
                }
            }
            Message::LevelProgress {
                level,
                kills,
                kills_needed,
            } => {
                enc.write_u32(*level);
                enc.write_u32(*kills);
                enc.write_u32(*kills_needed);
            }
            Message::LevelStart { level } => enc.write_u32(*level),
            Message::LevelComplete { completed, next } => {
                enc.write_u32(*completed);
                enc.write_u32(*next);
            }
            Message::PowerUpStatus {
                player_id,
                kind,
                time_remaining,
            } => {
                enc.write_u32(*player_id);
                enc.write_u8(*kind);
                enc.write_f32(*time_remaining);
            }
            Message::PowerUpActivate => {}
            Message::AdminLogin { password } => enc.write_string(password),
            Message::AdminLoginAck { result } => enc.write_string(result),
            Message::AdminCommand { command } => enc.write_string(command),
            Message::AdminResponse { body } => enc.write_string(body),
            Message::Ack { acked_seq } => enc.write_u32(*acked_seq),
        }
    }

    /// Parses a whole datagram. Magic is validated before anything else;
    /// any failure leaves no partial effect.
    pub fn decode(buf: &[u8]) -> Result<(FrameHeader, Message), DecodeError> {
        let mut dec = Decoder::new(buf);

        let magic = dec.read_u16()?;
        if magic != PROTOCOL_MAGIC {
            return Err(DecodeError::BadMagic(magic));
        }

        let opcode = OpCode::from_u8(dec.read_u8()?)?;
        let seq = if opcode.is_reliable() {
            Some(dec.read_u32()?)
        } else {
            None
        };

        let message = Self::read_payload(opcode, &mut dec)?;

        Ok((FrameHeader { opcode, seq }, message))
    }

    fn read_payload(opcode: OpCode, dec: &mut Decoder) -> Result<Message, DecodeError> {
        Ok(match opcode {
            OpCode::Login => Message::Login {
                player_name: dec.read_string()?,
            },
            OpCode::LoginAck => Message::LoginAck {
                network_id: dec.read_u32()?,
            },
            OpCode::Disconnect => Message::Disconnect,
            OpCode::Ready => Message::Ready {
                flag: dec.read_bool()?,
            },
            OpCode::LobbyStatus => Message::LobbyStatus {
                total: dec.read_u8()?,
                ready: dec.read_u8()?,
            },
            OpCode::StartGame => Message::StartGame,
            OpCode::GameOver => Message::GameOver,
            OpCode::Input => Message::Input {
                mask: InputMask(dec.read_u8()?),
                client_timestamp: dec.read_u32()?,
            },
            OpCode::PowerUpSelection => Message::PowerUpSelection,
            OpCode::PowerUpChoice => Message::PowerUpChoice {
                choice: dec.read_u8()?,
            },
            OpCode::EntityPositions => {
                let count = dec.read_u8()?;
                let mut entities = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    entities.push(EntityState {
                        id: dec.read_u32()?,
                        kind: dec.read_u8()?,
                        x: dec.read_f32()?,
                        y: dec.read_f32()?,
                        vx: dec.read_f32()?,
                        vy: dec.read_f32()?,
                        hp: dec.read_i32()?,
                        max_hp: dec.read_i32()?,
                        flags: dec.read_u8()?,
                    });
                }
                Message::EntityPositions { entities }
            }
            OpCode::LevelProgress => Message::LevelProgress {
                level: dec.read_u32()?,
                kills: dec.read_u32()?,
                kills_needed: dec.read_u32()?,
            },
            OpCode::LevelStart => Message::LevelStart {
                level: dec.read_u32()?,
            },
            OpCode::LevelComplete => Message::LevelComplete {
                completed: dec.read_u32()?,
                next: dec.read_u32()?,
            },
            OpCode::PowerUpStatus => Message::PowerUpStatus {
                player_id: dec.read_u32()?,
                kind: dec.read_u8()?,
                time_remaining: dec.read_f32()?,
            },
            OpCode::PowerUpActivate => Message::PowerUpActivate,
            OpCode::AdminLogin => Message::AdminLogin {
                password: dec.read_string()?,
            },
            OpCode::AdminLoginAck => Message::AdminLoginAck {
                result: dec.read_string()?,
            },
            OpCode::AdminCommand => Message::AdminCommand {
                command: dec.read_string()?,
            },
            OpCode::AdminResponse => Message::AdminResponse {
                body: dec.read_string()?,
            },
            OpCode::Ack => Message::Ack {
                acked_seq: dec.read_u32()?,
            },
        })
    }
}
