// Discord commands module.
// Each feature gets its own command file.

pub mod leveling;

pub mod member_count;

pub mod presence;
