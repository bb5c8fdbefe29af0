pub mod assistants;
pub mod error;
pub mod identity;
pub mod journal;
pub mod jwt;
pub mod metrics;
pub mod orchestrator;
pub mod storage;
pub mod supabase;

pub use assistants::{AssistantClient, AssistantError};
pub use error::StoreError;
pub use identity::{IdentityProvider, ProfileStore};
pub use journal::{JournalEntry, MessageJournal, Role};
pub use jwt::{JwtService, SessionClaims};
pub use orchestrator::{ConversationOrchestrator, SkillRegistry, TurnReply, TurnRequest};
pub use storage::{LocalPhotoStorage, PhotoStorage};
pub use supabase::SupabaseClient;
