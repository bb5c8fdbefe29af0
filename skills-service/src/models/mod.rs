pub mod content;
pub mod profile;
pub mod run;
pub mod skill;

pub use content::{ContentError, ContentKind, ImageFormat, InlineImage, MessageContent};
pub use profile::{AccessStatus, ProfileUpdate, UserProfile};
pub use run::RunStatus;
pub use skill::Skill;
