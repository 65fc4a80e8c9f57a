//! Messages the group core pushes at player sessions, plus a minimal
//! in-proc delivery channel. Wire encoding is a transport concern and
//! lives elsewhere; everything here is plain data.

pub mod channel;
pub mod message;

pub use message::{EquipFail, GroupMessage, MemberLine, RollVote};
