pub mod collaborators;
pub mod economy;
pub mod engine;
pub mod escalation;
pub mod events;
pub mod ledger;
pub mod memory;
pub mod patterns;
pub mod time;
pub mod track;
