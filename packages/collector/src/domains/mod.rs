pub mod collection;
pub mod schedules;
