pub mod decode;
pub mod extract;
pub mod hash;
pub mod matches;
pub mod resolve;
pub mod stats;
pub mod verify;
