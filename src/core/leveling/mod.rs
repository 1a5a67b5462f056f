// The leveling module holds the business logic for XP and levels.
// There is no Discord code in here: everything works on plain ids and
// integers so the same rules could sit behind any frontend.

pub mod leveling_models;
pub mod leveling_service;
pub mod leveling_store;
pub mod progression;

pub use leveling_models::{
    AdjustmentInputError, AdjustmentKind, AdminAdjustment, LevelUpEvent, UserProgress,
};
pub use leveling_service::{LevelingConfig, LevelingService};
pub use leveling_store::{LevelingError, XpStore};
