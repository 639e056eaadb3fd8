pub mod events;
pub mod mutate;
pub mod replay;
pub mod verify;
