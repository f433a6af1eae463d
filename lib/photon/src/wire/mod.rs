//! Binary wire protocol shared by every endpoint: little-endian primitive
//! codec, frame header with magic validation, and the typed message set.

pub mod codec;
pub mod message;

pub use self::codec::{DecodeError, Decoder, Encoder, MAX_STRING_LEN};
pub use self::message::{
    EntityState, FrameHeader, InputMask, Message, OpCode, FLAG_DAMAGE_FLASH, FLAG_ENEMY_OWNED,
    KIND_BOSS, KIND_ENEMY, KIND_EXPLOSION, KIND_PLAYER, KIND_POWERUP, KIND_PROJECTILE,
};
