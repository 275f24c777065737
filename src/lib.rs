//! Client SDK for the Dr Pilot medical-education assistant.
//!
//! The backend does the real work. This crate keeps the client side of it:
//! the persisted session, route protection, the chat request cycle and the
//! profile calls.
//!
//! ```no_run
//! use std::sync::Arc;
//! use drpilot_client::{ChatSession, Capability, SessionManager, Settings};
//!
//! # async fn run() -> Result<(), drpilot_client::DrPilotError> {
//! let settings = Settings::new()?;
//! let session = Arc::new(SessionManager::from_settings(&settings)?);
//! session.initialize().await;
//!
//! let landing = session.login("doc@example.com", "secret123").await?;
//! println!("go to {}", landing);
//!
//! let chat = ChatSession::new(session.clone());
//! chat.send_message("Quais os sinais de apendicite?", Capability::Query, None).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod structs;

pub use config::Settings;
pub use errors::DrPilotError;
pub use structs::chat::{Capability, ChatSession, Message, QuickAction, Sender, QUICK_ACTIONS};
pub use structs::client::{Client, ClientOptions};
pub use structs::guard::{Decision, GuardState, Render, Route, RouteGuard};
pub use structs::profile::{ProfileController, ProfileState};
pub use structs::session::{Session, SessionManager};
pub use structs::store::{FileStore, MemoryStore, SessionStore};
pub use structs::universities::UniversityDirectory;
pub use structs::user::{ProfileUpdate, RegistrationForm, Role, Subscription, User};

pub type Result<T> = std::result::Result<T, DrPilotError>;
