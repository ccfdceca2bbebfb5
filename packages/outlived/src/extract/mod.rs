//! HTML and date extraction.
//!
//! - [`deaths`] - death lists on calendar-day pages
//! - [`person`] - born/died dates, name and portrait from person pages
//! - [`dates`] - free-text date parsing
//! - [`html`] - DOM search helpers

pub mod dates;
pub mod deaths;
pub mod html;
pub mod person;

pub use dates::{month_from_name, parse_date, parse_date_parts};
pub use deaths::{extract_deaths, DeathEntries, DeathEntry};
pub use person::{extract_person, PersonFacts};
