//! Keeper wire protocol - types shared between the engine and the client.
//!
//! Pure data types and serialization only; no business logic. The dice
//! WebSocket frames and the REST bodies both live here so the client and
//! the engine cannot drift apart.

pub mod messages;
pub mod requests;
pub mod responses;

pub use messages::ServerMessage;
pub use requests::{CharacterEnteredRequest, ChatRequest};
pub use responses::{
    CharacterDataResponse, CharacterEnteredResponse, CharacterStatusView, ChatResponse,
    HealthResponse, StoreHealth,
};
